use crate::config::SyncSettings;
use crate::core::comparator::{self, FileCompareResult};
use crate::core::controls::SyncControls;
use crate::core::error::TransferError;
use crate::core::history::{self, TransferRecord};
use crate::core::preflight;
use crate::core::resolver;
use crate::core::scanner::MountScanner;
use crate::core::syncer::MountSyncer;
use crate::db::{AuthContext, MountTransferConfig, MountType, ServerRow, SqlitePool, TransferConfig};
use crate::host::{self, volume, FileInfo, HostFs};
use crate::server::protocol::{
    CompareCompletePayload, CompareProgressPayload, MountScanSummary, ScanCommand,
    ScanCompletePayload, ScanProgressPayload, ServerEvent, SyncCommand, SyncCompletePayload,
    SyncProgressPayload,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// 单条连接的迁移会话。
/// 长命令（scan/compare/sync）由连接层保证串行执行，
/// pause/resume/cancel 走独立的 controls，随时生效。
pub struct TransferSession {
    pub session_id: String,
    pool: Arc<SqlitePool>,
    auth: AuthContext,
    settings: SyncSettings,
    controls: Arc<SyncControls>,
    events: mpsc::UnboundedSender<ServerEvent>,
    state: Mutex<SessionState>,
}

/// 扫描与比较阶段积累的会话状态
#[derive(Default)]
struct SessionState {
    config: Option<TransferConfig>,
    source_host: Option<Arc<dyn HostFs>>,
    target_host: Option<Arc<dyn HostFs>>,
    /// mount_id -> (源端根路径, 目标端根路径)，命名卷在扫描时解析
    mount_roots: HashMap<String, (String, String)>,
    source_files: HashMap<String, Vec<FileInfo>>,
    target_files: HashMap<String, Vec<FileInfo>>,
    comparison_results: HashMap<String, Vec<FileCompareResult>>,
    /// 扫描失败的挂载与原因，后续 compare/sync 跳过
    failed_mounts: HashMap<String, String>,
}

impl TransferSession {
    pub fn new(
        pool: Arc<SqlitePool>,
        auth: AuthContext,
        settings: SyncSettings,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            pool,
            auth,
            settings,
            controls: Arc::new(SyncControls::new()),
            events,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn controls(&self) -> Arc<SyncControls> {
        Arc::clone(&self.controls)
    }

    fn emit(&self, event: ServerEvent) {
        // 连接已断开时发送失败，事件直接丢弃
        let _ = self.events.send(event);
    }

    /// 连接层直接上报事件（协议错误等）
    pub fn emit_event(&self, event: ServerEvent) {
        self.emit(event);
    }

    fn emit_error(&self, err: &TransferError) {
        self.emit(ServerEvent::error(err.to_string()));
    }

    /// scan 命令：解析配置、连接两端主机、预检、逐挂载扫描两侧文件。
    /// 任何阶段的鉴权/配置错误只发 error 事件，不改变已有状态。
    pub async fn handle_scan(&self, cmd: ScanCommand) {
        let config = match resolver::resolve_transfer_config(&self.pool, &self.auth, &cmd.config).await
        {
            Ok(config) => config,
            Err(e) => {
                warn!("scan 配置解析失败: {}", e);
                self.emit_error(&e);
                return;
            }
        };

        self.controls.reset_cancelled();
        self.emit(ServerEvent::ScanStart);

        let (source_host, target_host) = match self.connect_hosts(&config).await {
            Ok(hosts) => hosts,
            Err(e) => {
                // 主机级失败波及全部挂载，但 scan_complete 合约不变：
                // 每个挂载记为失败并照常发终止事件
                error!("主机连接失败: {}", e);
                self.fail_all_mounts(config, format!("Host connection failed: {}", e))
                    .await;
                return;
            }
        };

        // 目标端预检只上报，不阻断扫描
        let min_free = self.settings.min_free_space_mb * 1024 * 1024;
        preflight::run_preflight_checks(target_host.as_ref(), &config.mounts, min_free, |id, r| {
            self.emit(ServerEvent::ScanProgress(ScanProgressPayload {
                mount_id: id.to_string(),
                phase: "preflight".to_string(),
                message: if r.passed {
                    "预检通过".to_string()
                } else {
                    r.reason.clone().unwrap_or_else(|| "预检未通过".to_string())
                },
                files_found: None,
            }));
        })
        .await;

        let scanner =
            MountScanner::with_controls(self.settings.exclude_patterns.clone(), self.controls());

        let mut state = self.state.lock().await;
        // 新一轮扫描清空之前的比较与扫描结果
        *state = SessionState::default();

        let mut summaries = Vec::new();
        for mount in &config.mounts {
            match self
                .scan_one_mount(&scanner, &source_host, &target_host, mount)
                .await
            {
                Ok((roots, src_files, dst_files)) => {
                    summaries.push(MountScanSummary {
                        mount_id: mount.mount_id.clone(),
                        source_file_count: src_files.len(),
                        target_file_count: dst_files.len(),
                        error: None,
                    });
                    state.mount_roots.insert(mount.mount_id.clone(), roots);
                    state.source_files.insert(mount.mount_id.clone(), src_files);
                    state.target_files.insert(mount.mount_id.clone(), dst_files);
                }
                Err(e) => {
                    // 单个挂载失败不影响其余挂载
                    warn!("挂载扫描失败: {} ({})", mount.mount_id, e);
                    summaries.push(MountScanSummary {
                        mount_id: mount.mount_id.clone(),
                        source_file_count: 0,
                        target_file_count: 0,
                        error: Some(e.to_string()),
                    });
                    state
                        .failed_mounts
                        .insert(mount.mount_id.clone(), e.to_string());
                }
            }
        }

        let mut failed_mounts: Vec<String> = state.failed_mounts.keys().cloned().collect();
        failed_mounts.sort();
        info!(
            "扫描完成: 会话 {}, {} 个挂载, {} 个失败",
            self.session_id,
            config.mounts.len(),
            failed_mounts.len()
        );

        state.config = Some(config);
        state.source_host = Some(source_host);
        state.target_host = Some(target_host);
        drop(state);

        self.emit(ServerEvent::ScanComplete(ScanCompletePayload {
            mounts: summaries,
            failed_mounts,
        }));
    }

    /// 连接失败时把全部挂载记为失败，并以 scan_complete 收尾
    async fn fail_all_mounts(&self, config: TransferConfig, reason: String) {
        let mut state = self.state.lock().await;
        *state = SessionState::default();

        let mut summaries = Vec::new();
        for mount in &config.mounts {
            summaries.push(MountScanSummary {
                mount_id: mount.mount_id.clone(),
                source_file_count: 0,
                target_file_count: 0,
                error: Some(reason.clone()),
            });
            state
                .failed_mounts
                .insert(mount.mount_id.clone(), reason.clone());
        }

        let mut failed_mounts: Vec<String> = state.failed_mounts.keys().cloned().collect();
        failed_mounts.sort();
        state.config = Some(config);
        drop(state);

        self.emit(ServerEvent::ScanComplete(ScanCompletePayload {
            mounts: summaries,
            failed_mounts,
        }));
    }

    async fn connect_hosts(
        &self,
        config: &TransferConfig,
    ) -> anyhow::Result<(Arc<dyn HostFs>, Arc<dyn HostFs>)> {
        let source_row = match &config.source_server_id {
            Some(id) => Some(
                ServerRow::find_by_id(&self.pool, id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("源服务器不存在: {}", id))?,
            ),
            None => None,
        };
        let target_row = ServerRow::find_by_id(&self.pool, &config.target_server_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("目标服务器不存在: {}", config.target_server_id))?;

        let source = host::connect_host(source_row.as_ref()).await?;
        let target = host::connect_host(Some(&target_row)).await?;
        Ok((source, target))
    }

    /// 解析单个挂载两端的根路径并扫描两侧文件列表
    async fn scan_one_mount(
        &self,
        scanner: &MountScanner,
        source_host: &Arc<dyn HostFs>,
        target_host: &Arc<dyn HostFs>,
        mount: &MountTransferConfig,
    ) -> anyhow::Result<((String, String), Vec<FileInfo>, Vec<FileInfo>)> {
        let source_root = match mount.mount_type {
            // 源端卷必须已经存在
            MountType::Volume => {
                volume::resolve_volume_path(source_host.as_ref(), &mount.source_path, false).await?
            }
            MountType::Bind => mount.source_path.clone(),
        };
        let target_root = match mount.mount_type {
            MountType::Volume => {
                volume::resolve_volume_path(
                    target_host.as_ref(),
                    &mount.target_path,
                    mount.create_if_missing,
                )
                .await?
            }
            MountType::Bind => mount.target_path.clone(),
        };

        let source_files = self
            .scan_side(scanner, source_host.as_ref(), &mount.mount_id, &source_root, "source")
            .await?;

        // 目标端不存在按空目录处理，首次迁移属正常情况
        let target_files = if target_host.stat(&target_root).await?.is_none() {
            if mount.create_if_missing {
                target_host.create_dir_all(&target_root).await?;
            }
            Vec::new()
        } else {
            self.scan_side(scanner, target_host.as_ref(), &mount.mount_id, &target_root, "target")
                .await?
        };

        Ok(((source_root, target_root), source_files, target_files))
    }

    async fn scan_side(
        &self,
        scanner: &MountScanner,
        host: &dyn HostFs,
        mount_id: &str,
        root: &str,
        phase: &str,
    ) -> anyhow::Result<Vec<FileInfo>> {
        let mut count = 0usize;
        let files = scanner
            .scan_mount(host, root, |file| {
                count += 1;
                self.emit(ServerEvent::ScanProgress(ScanProgressPayload {
                    mount_id: mount_id.to_string(),
                    phase: phase.to_string(),
                    message: file.path.clone(),
                    files_found: Some(count),
                }));
            })
            .await?;
        Ok(files)
    }

    /// compare 命令：对每个扫描成功的挂载做纯比较
    pub async fn handle_compare(&self) {
        let mut state = self.state.lock().await;
        if state.config.is_none() {
            self.emit(ServerEvent::error("No scan has been performed"));
            return;
        }
        // 扫描跑过但全部挂载失败时，比较没有可用输入，单独报错
        if state.source_files.is_empty() {
            self.emit(ServerEvent::error("No mounts were scanned successfully"));
            return;
        }

        self.emit(ServerEvent::CompareStart);

        let mount_ids: Vec<String> = state.source_files.keys().cloned().collect();
        let mut all_results = HashMap::new();
        for mount_id in mount_ids {
            let source = &state.source_files[&mount_id];
            let target = state
                .target_files
                .get(&mount_id)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            let results = comparator::compare_file_lists(source, target);
            let summary = comparator::summarize(&results);

            self.emit(ServerEvent::CompareProgress(CompareProgressPayload {
                mount_id: mount_id.clone(),
                summary,
            }));
            all_results.insert(mount_id, results);
        }

        state.comparison_results = all_results.clone();
        drop(state);

        info!("比较完成: 会话 {}", self.session_id);
        self.emit(ServerEvent::CompareComplete(CompareCompletePayload {
            results: all_results,
        }));
    }

    /// sync 命令：按合并策略逐挂载顺序执行传输。
    /// 挂载之间不并行，避免同时压垮两端主机。
    pub async fn handle_sync(&self, cmd: SyncCommand) {
        let state = self.state.lock().await;
        let (Some(config), Some(source_host), Some(target_host)) = (
            state.config.clone(),
            state.source_host.clone(),
            state.target_host.clone(),
        ) else {
            self.emit(ServerEvent::error("No scan has been performed"));
            return;
        };
        if state.comparison_results.is_empty() {
            self.emit(ServerEvent::error("No scan has been performed"));
            return;
        }
        let mount_roots = state.mount_roots.clone();
        let comparison_results = state.comparison_results.clone();
        drop(state);

        // 相当于换一个新的中止令牌，上一轮的 cancel 不波及本轮
        self.controls.reset_cancelled();
        self.emit(ServerEvent::SyncStart);

        let started_at = Utc::now();
        let syncer = MountSyncer::new(
            config.merge_strategy,
            cmd.manual_decisions,
            self.controls(),
        );

        let mut errors: HashMap<String, Vec<String>> = HashMap::new();
        let mut files_copied = 0u64;
        let mut files_skipped = 0u64;
        let mut bytes_transferred = 0u64;
        let mut cancelled = false;

        for mount in &config.mounts {
            let Some(results) = comparison_results.get(&mount.mount_id) else {
                continue;
            };
            let Some((source_root, target_root)) = mount_roots.get(&mount.mount_id) else {
                continue;
            };

            info!("开始同步挂载: {} ({} 个比对条目)", mount.mount_id, results.len());
            let outcome = syncer
                .sync_mount(
                    &source_host,
                    &target_host,
                    source_root,
                    target_root,
                    results,
                    |p| {
                        self.emit(ServerEvent::SyncProgress(SyncProgressPayload {
                            mount_id: mount.mount_id.clone(),
                            path: p.path,
                            bytes: p.bytes,
                            checksum: p.checksum,
                            files_done: p.files_done,
                            files_total: p.files_total,
                        }));
                    },
                )
                .await;

            files_copied += outcome.files_copied;
            files_skipped += outcome.files_skipped;
            bytes_transferred += outcome.bytes_transferred;
            if !outcome.errors.is_empty() {
                errors.insert(mount.mount_id.clone(), outcome.errors);
            }
            if outcome.cancelled {
                cancelled = true;
                break;
            }
        }

        let success = errors.is_empty() && !cancelled;
        info!(
            "同步完成: 会话 {}, 复制 {} 个文件 ({} 字节), 成功 = {}",
            self.session_id, files_copied, bytes_transferred, success
        );

        let record = TransferRecord {
            session_id: self.session_id.clone(),
            service_id: config.service_id.clone(),
            started_at,
            finished_at: Utc::now(),
            status: if cancelled {
                "cancelled"
            } else if success {
                "completed"
            } else {
                "failed"
            }
            .to_string(),
            files_copied,
            files_skipped,
            files_failed: errors.values().map(|v| v.len() as u64).sum(),
            bytes_transferred,
            error_message: flatten_errors(&errors),
        };
        history::record_transfer(&self.pool, &record).await;

        self.emit(ServerEvent::SyncComplete(SyncCompletePayload {
            success,
            errors,
            files_copied,
            files_skipped,
            bytes_transferred,
            cancelled,
        }));
    }

    pub fn handle_pause(&self) {
        self.controls.pause();
        self.emit(ServerEvent::Paused);
    }

    pub fn handle_resume(&self) {
        self.controls.resume();
        self.emit(ServerEvent::Resumed);
    }

    pub fn handle_cancel(&self) {
        self.controls.cancel();
        self.emit(ServerEvent::Cancelled);
    }
}

fn flatten_errors(errors: &HashMap<String, Vec<String>>) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    let mut parts: Vec<String> = errors
        .iter()
        .map(|(mount, errs)| format!("{}: {}", mount, errs.join("; ")))
        .collect();
    parts.sort();
    Some(parts.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MergeStrategy, ServiceType};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::fs;
    use tempfile::TempDir;

    async fn setup_pool() -> Arc<SqlitePool> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Arc::new(pool)
    }

    fn auth() -> AuthContext {
        AuthContext {
            user_id: "user-1".to_string(),
            organization_id: "org-1".to_string(),
            is_member: false,
        }
    }

    fn session(
        pool: Arc<SqlitePool>,
    ) -> (TransferSession, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = TransferSession::new(pool, auth(), SyncSettings::default(), tx);
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<&'static str> {
        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        types
    }

    /// 造一个绑定挂载的完整服务，源/目标都指向主控本地
    async fn seed_local_service(pool: &SqlitePool, source_dir: &TempDir) {
        sqlx::query(
            "INSERT INTO servers (id, name, organization_id, address, ssh_user, created_at)
             VALUES ('srv-t', 'target', 'org-1', 'local', 'root', 0)",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO services (id, name, service_type, server_id, organization_id, created_at)
             VALUES ('app-1', 'web', 'application', NULL, 'org-1', 0)",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO mounts (id, service_id, mount_type, volume_name, host_path, mount_path, created_at)
             VALUES ('m-1', 'app-1', 'bind', NULL, ?, '/data', 0)",
        )
        .bind(source_dir.path().to_str().unwrap())
        .execute(pool)
        .await
        .unwrap();
    }

    fn scan_cmd() -> ScanCommand {
        ScanCommand {
            config: resolver::ScanRequest {
                service_id: "app-1".to_string(),
                service_type: ServiceType::Application,
                target_server_id: Some("srv-t".to_string()),
                merge_strategy: MergeStrategy::Newer,
            },
        }
    }

    #[tokio::test]
    async fn test_compare_before_scan_emits_error() {
        let pool = setup_pool().await;
        let (session, mut rx) = session(pool);

        session.handle_compare().await;
        session.handle_sync(SyncCommand::default()).await;

        let events = drain(&mut rx);
        assert_eq!(events, vec!["error", "error"]);
    }

    #[tokio::test]
    async fn test_scan_with_bad_config_keeps_state_clean() {
        let pool = setup_pool().await;
        let (session, mut rx) = session(pool);

        session.handle_scan(scan_cmd()).await;

        // 服务不存在，只应有一条 error，且后续 compare 仍提示未扫描
        let events = drain(&mut rx);
        assert_eq!(events, vec!["error"]);

        session.handle_compare().await;
        assert_eq!(drain(&mut rx), vec!["error"]);
    }

    #[tokio::test]
    async fn test_pause_resume_cancel_emit_events() {
        let pool = setup_pool().await;
        let (session, mut rx) = session(pool);

        session.handle_pause();
        assert!(session.controls().is_paused());
        session.handle_resume();
        assert!(!session.controls().is_paused());
        session.handle_cancel();
        assert!(session.controls().is_cancelled());

        assert_eq!(drain(&mut rx), vec!["paused", "resumed", "cancelled"]);
    }

    #[tokio::test]
    async fn test_scan_isolates_failed_mount() {
        let pool = setup_pool().await;
        let source_dir = TempDir::new().unwrap();
        fs::write(source_dir.path().join("a.txt"), b"alpha").unwrap();
        seed_local_service(&pool, &source_dir).await;

        // 第二个挂载的卷名非法，解析必然失败
        sqlx::query(
            "INSERT INTO mounts (id, service_id, mount_type, volume_name, host_path, mount_path, created_at)
             VALUES ('m-2', 'app-1', 'volume', 'bad name', NULL, '/broken', 1)",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();

        let (session, mut rx) = session(pool);
        session.handle_scan(scan_cmd()).await;

        let mut complete = None;
        while let Ok(event) = rx.try_recv() {
            if let ServerEvent::ScanComplete(p) = event {
                complete = Some(p);
            }
        }

        // 失败的挂载被标记，健康的挂载照常产出文件数
        let complete = complete.expect("scan_complete not emitted");
        assert_eq!(complete.failed_mounts, vec!["m-2".to_string()]);
        let m1 = complete.mounts.iter().find(|m| m.mount_id == "m-1").unwrap();
        assert_eq!(m1.source_file_count, 1);
        assert!(m1.error.is_none());
        let m2 = complete.mounts.iter().find(|m| m.mount_id == "m-2").unwrap();
        assert!(m2.error.is_some());
    }

    #[tokio::test]
    async fn test_connect_failure_fails_all_mounts_and_completes_scan() {
        let pool = setup_pool().await;
        let source_dir = TempDir::new().unwrap();
        seed_local_service(&pool, &source_dir).await;
        sqlx::query(
            "INSERT INTO mounts (id, service_id, mount_type, volume_name, host_path, mount_path, created_at)
             VALUES ('m-2', 'app-1', 'bind', NULL, '/opt/extra', '/extra', 1)",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();
        // 源服务器记录不存在，主机连接必然失败
        sqlx::query("UPDATE services SET server_id = 'srv-gone' WHERE id = 'app-1'")
            .execute(pool.as_ref())
            .await
            .unwrap();

        let (session, mut rx) = session(pool);
        session.handle_scan(scan_cmd()).await;

        // 主机级失败仍要以 scan_complete 收尾，且每个挂载都带失败原因
        let mut complete = None;
        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
            if let ServerEvent::ScanComplete(p) = event {
                complete = Some(p);
            }
        }
        assert_eq!(types.first(), Some(&"scan_start"));
        assert_eq!(types.last(), Some(&"scan_complete"));

        let complete = complete.unwrap();
        assert_eq!(
            complete.failed_mounts,
            vec!["m-1".to_string(), "m-2".to_string()]
        );
        for mount in &complete.mounts {
            let error = mount.error.as_deref().unwrap();
            assert!(error.starts_with("Host connection failed:"), "{}", error);
        }

        // 全部挂载失败后比较无事可做，给出与未扫描不同的提示
        session.handle_compare().await;
        match rx.try_recv().unwrap() {
            ServerEvent::Error(p) => {
                assert_eq!(p.message, "No mounts were scanned successfully")
            }
            other => panic!("unexpected event: {:?}", other.event_type()),
        }
    }

    #[tokio::test]
    async fn test_missing_bind_target_dir_is_created() {
        let pool = setup_pool().await;
        let (session, _rx) = session(pool);

        let source_dir = TempDir::new().unwrap();
        fs::write(source_dir.path().join("a.txt"), b"alpha").unwrap();
        let target_parent = TempDir::new().unwrap();
        let target_root = target_parent.path().join("nested").join("data");

        let scanner = MountScanner::with_controls(Vec::new(), session.controls());
        let host: Arc<dyn HostFs> = Arc::new(crate::host::LocalHost::new());
        let mount = MountTransferConfig {
            mount_id: "m-1".to_string(),
            mount_type: MountType::Bind,
            source_path: source_dir.path().to_str().unwrap().to_string(),
            target_path: target_root.to_str().unwrap().to_string(),
            create_if_missing: true,
            update_mount_config: false,
        };

        let (_, src_files, dst_files) = session
            .scan_one_mount(&scanner, &host, &host, &mount)
            .await
            .unwrap();

        // 目标目录按空目录处理并被提前建好
        assert_eq!(src_files.len(), 1);
        assert!(dst_files.is_empty());
        assert!(target_root.is_dir());
    }

    #[tokio::test]
    async fn test_full_scan_compare_sync_roundtrip() {
        let pool = setup_pool().await;
        let source_dir = TempDir::new().unwrap();
        fs::write(source_dir.path().join("a.txt"), b"alpha").unwrap();
        fs::write(source_dir.path().join("b.txt"), b"beta").unwrap();
        seed_local_service(&pool, &source_dir).await;

        // 目标绑定路径与源相同会导致原地覆写，这里改写挂载指向独立目录
        let target_dir = TempDir::new().unwrap();
        let (session, mut rx) = session(Arc::clone(&pool));
        session.handle_scan(scan_cmd()).await;

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&"scan_start"));
        assert_eq!(events.last(), Some(&"scan_complete"));

        {
            // 扫描解析出的目标根与源相同（同名路径策略）；
            // 为了验证复制行为，这里把目标根重定向到空目录
            let mut state = session.state.lock().await;
            let roots = state.mount_roots.get_mut("m-1").unwrap();
            roots.1 = target_dir.path().to_str().unwrap().to_string();
            state.target_files.insert("m-1".to_string(), Vec::new());
        }

        session.handle_compare().await;
        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&"compare_start"));
        assert_eq!(events.last(), Some(&"compare_complete"));

        session.handle_sync(SyncCommand::default()).await;
        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            if let ServerEvent::SyncComplete(p) = &event {
                assert!(p.success);
                assert_eq!(p.files_copied, 2);
                saw_complete = true;
            }
        }
        assert!(saw_complete);
        assert_eq!(fs::read(target_dir.path().join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(target_dir.path().join("b.txt")).unwrap(), b"beta");

        // 同步结果落入历史表
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transfer_logs WHERE status = 'completed'")
                .fetch_one(pool.as_ref())
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
