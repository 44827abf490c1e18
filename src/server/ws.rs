use crate::core::TransferSession;
use crate::server::auth;
use crate::server::protocol::{ClientCommand, ServerEvent};
use crate::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 鉴权失败时的自定义关闭码
const CLOSE_UNAUTHORIZED: u16 = 4001;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data-transfer", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let token = auth::extract_token(uri.query(), &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// 单条连接的完整生命周期：鉴权、事件写出、命令分发。
/// 连接断开时取消仍在执行的命令，不留孤儿任务继续写目标主机。
async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let auth_ctx = match &token {
        Some(token) => match auth::validate_request(&state.db, token).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("会话校验查询失败: {}", e);
                None
            }
        },
        None => None,
    };

    let Some(auth_ctx) = auth_ctx else {
        // 升级已经完成，只能在应用层用关闭帧拒绝
        info!("连接鉴权失败，以 {} 关闭", CLOSE_UNAUTHORIZED);
        let mut socket = socket;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_UNAUTHORIZED,
                reason: "Unauthorized".into(),
            })))
            .await;
        return;
    };

    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // 独立写出任务：命令处理只向通道投递事件，不直接持有 socket
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let envelope = event.into_envelope();
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!("事件序列化失败: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let session = Arc::new(TransferSession::new(
        Arc::clone(&state.db),
        auth_ctx,
        state.config.sync.clone(),
        event_tx,
    ));
    info!("迁移会话建立: {}", session.session_id);

    let controls = session.controls();
    let _cancel_on_close = scopeguard::guard((), |_| {
        controls.cancel();
    });

    // 串行执行的长命令句柄；pause/resume/cancel 不占用它
    let mut running: Option<JoinHandle<()>> = None;

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("客户端关闭连接: {}", session.session_id);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("连接读取失败: {}", e);
                break;
            }
        };

        let command = match ClientCommand::parse(&text) {
            Ok(command) => command,
            Err(message) => {
                // 协议错误只上报，不触碰会话状态
                session_emit(&session, ServerEvent::error(message));
                continue;
            }
        };

        match command {
            ClientCommand::Pause => session.handle_pause(),
            ClientCommand::Resume => session.handle_resume(),
            ClientCommand::Cancel => session.handle_cancel(),
            long_command => {
                if running.as_ref().is_some_and(|h| !h.is_finished()) {
                    session_emit(
                        &session,
                        ServerEvent::error("A command is already running"),
                    );
                    continue;
                }
                let session = Arc::clone(&session);
                running = Some(tokio::spawn(async move {
                    match long_command {
                        ClientCommand::Scan(cmd) => session.handle_scan(cmd).await,
                        ClientCommand::Compare => session.handle_compare().await,
                        ClientCommand::Sync(cmd) => session.handle_sync(cmd).await,
                        _ => unreachable!(),
                    }
                }));
            }
        }
    }

    info!("迁移会话结束: {}", session.session_id);
    drop(_cancel_on_close);
    if let Some(handle) = running {
        // 取消信号已发出，等命令在文件边界自行退出
        let _ = handle.await;
    }
    drop(session);
    let _ = writer.await;
}

fn session_emit(session: &Arc<TransferSession>, event: ServerEvent) {
    session.emit_event(event);
}
