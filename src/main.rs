use anyhow::Result;
use mountsync::config::AppConfig;
use mountsync::{app_data_dir, logging, server, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let data_dir = app_data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let config = AppConfig::load(&data_dir);
    logging::init(&config.log, &data_dir.join("logs"))?;

    info!("数据目录: {}", data_dir.display());
    let state = AppState::new(&data_dir, config).await?;

    let listen = state.config.listen.clone();
    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("数据迁移服务已启动: ws://{}/data-transfer", listen);
    axum::serve(listener, app).await?;

    Ok(())
}
