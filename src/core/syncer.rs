use crate::core::comparator::{FileCompareResult, FileStatus};
use crate::core::controls::SyncControls;
use crate::core::hash::calculate_quick_hash;
use crate::db::MergeStrategy;
use crate::host::HostFs;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// manual 策略下客户端对单个文件的裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualDecision {
    Skip,
    Overwrite,
}

/// 单个文件复制后的进度信息
#[derive(Debug, Clone)]
pub struct FileSyncProgress {
    pub path: String,
    pub bytes: u64,
    pub checksum: String,
    pub files_done: u64,
    pub files_total: u64,
}

/// 单个挂载的同步结果
#[derive(Debug, Clone, Default)]
pub struct MountSyncOutcome {
    pub files_copied: u64,
    pub files_skipped: u64,
    pub bytes_transferred: u64,
    pub errors: Vec<String>,
    pub cancelled: bool,
}

impl MountSyncOutcome {
    pub fn success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

pub struct MountSyncer {
    strategy: MergeStrategy,
    decisions: HashMap<String, ManualDecision>,
    controls: Arc<SyncControls>,
}

impl MountSyncer {
    pub fn new(
        strategy: MergeStrategy,
        decisions: HashMap<String, ManualDecision>,
        controls: Arc<SyncControls>,
    ) -> Self {
        Self {
            strategy,
            decisions,
            controls,
        }
    }

    /// 按比对结果执行单个挂载的同步。
    /// 文件按比对输出的确定性顺序处理；暂停在文件之间等待，
    /// 取消同样只在文件边界生效，进行中的文件总是完整落盘。
    pub async fn sync_mount(
        &self,
        source: &Arc<dyn HostFs>,
        target: &Arc<dyn HostFs>,
        source_root: &str,
        target_root: &str,
        results: &[FileCompareResult],
        mut on_progress: impl FnMut(FileSyncProgress),
    ) -> MountSyncOutcome {
        let mut outcome = MountSyncOutcome::default();
        let to_copy: Vec<&FileCompareResult> = results
            .iter()
            .filter(|r| self.should_copy(r))
            .collect();
        let files_total = to_copy.len() as u64;
        outcome.files_skipped = (results.len() - to_copy.len()) as u64;

        for result in to_copy {
            if !self.controls.wait_if_paused().await {
                outcome.cancelled = true;
                break;
            }

            match self
                .copy_file(source, target, source_root, target_root, &result.path)
                .await
            {
                Ok((bytes, checksum)) => {
                    outcome.files_copied += 1;
                    outcome.bytes_transferred += bytes;
                    on_progress(FileSyncProgress {
                        path: result.path.clone(),
                        bytes,
                        checksum,
                        files_done: outcome.files_copied,
                        files_total,
                    });
                }
                Err(e) => {
                    warn!("文件复制失败: {} ({})", result.path, e);
                    outcome.errors.push(format!("{}: {}", result.path, e));
                }
            }
        }

        outcome
    }

    /// 合并策略裁决表。missing_source 永远不触发目标端删除。
    fn should_copy(&self, result: &FileCompareResult) -> bool {
        match result.status {
            FileStatus::Match | FileStatus::MissingSource => false,
            FileStatus::MissingTarget => match self.strategy {
                // manual 下明确裁决为 skip 时尊重客户端，否则缺失文件默认复制
                MergeStrategy::Manual => {
                    self.decisions.get(&result.path) != Some(&ManualDecision::Skip)
                }
                _ => true,
            },
            FileStatus::NewerSource => match self.strategy {
                MergeStrategy::Overwrite | MergeStrategy::Newer => true,
                MergeStrategy::Skip => false,
                MergeStrategy::Manual => self.decided_overwrite(&result.path),
            },
            FileStatus::NewerTarget | FileStatus::Conflict => match self.strategy {
                MergeStrategy::Overwrite => true,
                MergeStrategy::Skip | MergeStrategy::Newer => false,
                MergeStrategy::Manual => self.decided_overwrite(&result.path),
            },
        }
    }

    fn decided_overwrite(&self, path: &str) -> bool {
        // 未裁决的文件默认跳过，不视为错误
        self.decisions.get(path) == Some(&ManualDecision::Overwrite)
    }

    /// 读源写目标。写入走 HostFs::write 的临时文件加重命名路径，
    /// 目标端不会出现半成品文件。
    async fn copy_file(
        &self,
        source: &Arc<dyn HostFs>,
        target: &Arc<dyn HostFs>,
        source_root: &str,
        target_root: &str,
        path: &str,
    ) -> Result<(u64, String)> {
        let src_path = join_root(source_root, path);
        let dst_path = join_root(target_root, path);

        debug!("复制 {} -> {}", src_path, dst_path);
        let data = source.read(&src_path).await?;
        let bytes = data.len() as u64;
        let checksum = calculate_quick_hash(&data);
        target.write(&dst_path, data).await?;

        Ok((bytes, checksum))
    }
}

pub fn join_root(root: &str, rel: &str) -> String {
    let root = root.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    format!("{}/{}", root, rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalHost;
    use std::fs;
    use tempfile::TempDir;

    fn host_pair() -> (TempDir, TempDir, Arc<dyn HostFs>, Arc<dyn HostFs>) {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src: Arc<dyn HostFs> = Arc::new(LocalHost::new());
        let dst: Arc<dyn HostFs> = Arc::new(LocalHost::new());
        (src_dir, dst_dir, src, dst)
    }

    fn result(path: &str, status: FileStatus) -> FileCompareResult {
        FileCompareResult {
            path: path.to_string(),
            status,
            source_meta: None,
            target_meta: None,
        }
    }

    fn syncer(strategy: MergeStrategy) -> MountSyncer {
        MountSyncer::new(strategy, HashMap::new(), Arc::new(SyncControls::new()))
    }

    #[test]
    fn test_decision_table_newer_strategy() {
        let s = syncer(MergeStrategy::Newer);
        assert!(s.should_copy(&result("a", FileStatus::MissingTarget)));
        assert!(s.should_copy(&result("b", FileStatus::NewerSource)));
        assert!(!s.should_copy(&result("c", FileStatus::NewerTarget)));
        assert!(!s.should_copy(&result("d", FileStatus::Conflict)));
        assert!(!s.should_copy(&result("e", FileStatus::Match)));
        assert!(!s.should_copy(&result("f", FileStatus::MissingSource)));
    }

    #[test]
    fn test_decision_table_overwrite_strategy() {
        let s = syncer(MergeStrategy::Overwrite);
        assert!(s.should_copy(&result("a", FileStatus::NewerTarget)));
        assert!(s.should_copy(&result("b", FileStatus::Conflict)));
        assert!(s.should_copy(&result("c", FileStatus::NewerSource)));
        // 目标端独有的文件任何策略下都不删除
        assert!(!s.should_copy(&result("d", FileStatus::MissingSource)));
    }

    #[test]
    fn test_decision_table_skip_strategy() {
        let s = syncer(MergeStrategy::Skip);
        // skip 仍然补齐目标端缺失的文件
        assert!(s.should_copy(&result("a", FileStatus::MissingTarget)));
        assert!(!s.should_copy(&result("b", FileStatus::NewerSource)));
        assert!(!s.should_copy(&result("c", FileStatus::Conflict)));
    }

    #[test]
    fn test_manual_strategy_defaults_to_skip_without_decision() {
        let mut decisions = HashMap::new();
        decisions.insert("keep.txt".to_string(), ManualDecision::Overwrite);
        decisions.insert("new.txt".to_string(), ManualDecision::Skip);
        let s = MountSyncer::new(
            MergeStrategy::Manual,
            decisions,
            Arc::new(SyncControls::new()),
        );

        assert!(s.should_copy(&result("keep.txt", FileStatus::Conflict)));
        assert!(!s.should_copy(&result("undecided.txt", FileStatus::Conflict)));
        // manual 下缺失文件默认复制，除非明确裁决跳过
        assert!(s.should_copy(&result("other.txt", FileStatus::MissingTarget)));
        assert!(!s.should_copy(&result("new.txt", FileStatus::MissingTarget)));
    }

    #[tokio::test]
    async fn test_sync_copies_files_and_reports_progress() {
        let (src_dir, dst_dir, src, dst) = host_pair();
        fs::write(src_dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir_all(src_dir.path().join("sub")).unwrap();
        fs::write(src_dir.path().join("sub/b.txt"), b"world!").unwrap();

        let results = vec![
            result("a.txt", FileStatus::MissingTarget),
            result("sub/b.txt", FileStatus::MissingTarget),
            result("same.txt", FileStatus::Match),
        ];

        let s = syncer(MergeStrategy::Newer);
        let mut seen = Vec::new();
        let outcome = s
            .sync_mount(
                &src,
                &dst,
                src_dir.path().to_str().unwrap(),
                dst_dir.path().to_str().unwrap(),
                &results,
                |p| seen.push(p.path.clone()),
            )
            .await;

        assert!(outcome.success());
        assert_eq!(outcome.files_copied, 2);
        assert_eq!(outcome.files_skipped, 1);
        assert_eq!(outcome.bytes_transferred, 11);
        assert_eq!(seen, vec!["a.txt", "sub/b.txt"]);
        assert_eq!(
            fs::read(dst_dir.path().join("sub/b.txt")).unwrap(),
            b"world!"
        );
    }

    #[tokio::test]
    async fn test_sync_collects_per_file_errors() {
        let (src_dir, dst_dir, src, dst) = host_pair();
        fs::write(src_dir.path().join("ok.txt"), b"fine").unwrap();

        let results = vec![
            result("gone.txt", FileStatus::MissingTarget),
            result("ok.txt", FileStatus::MissingTarget),
        ];

        let s = syncer(MergeStrategy::Overwrite);
        let outcome = s
            .sync_mount(
                &src,
                &dst,
                src_dir.path().to_str().unwrap(),
                dst_dir.path().to_str().unwrap(),
                &results,
                |_| {},
            )
            .await;

        // 单个文件失败不会中断其余文件
        assert!(!outcome.success());
        assert_eq!(outcome.files_copied, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("gone.txt:"));
        assert!(dst_dir.path().join("ok.txt").exists());
    }

    #[tokio::test]
    async fn test_pause_then_resume_completes_identically() {
        let (src_dir, dst_dir, src, dst) = host_pair();
        fs::write(src_dir.path().join("a.txt"), b"one").unwrap();
        fs::write(src_dir.path().join("b.txt"), b"two").unwrap();

        let controls = Arc::new(SyncControls::new());
        controls.pause();
        let s = MountSyncer::new(MergeStrategy::Newer, HashMap::new(), Arc::clone(&controls));

        let src_root = src_dir.path().to_str().unwrap().to_string();
        let dst_root = dst_dir.path().to_str().unwrap().to_string();
        let results = vec![
            result("a.txt", FileStatus::MissingTarget),
            result("b.txt", FileStatus::MissingTarget),
        ];

        let task = tokio::spawn(async move {
            s.sync_mount(&src, &dst, &src_root, &dst_root, &results, |_| {})
                .await
        });

        // 暂停期间不应开始任何文件
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(!task.is_finished());
        assert!(!dst_dir.path().join("a.txt").exists());

        controls.resume();
        let outcome = task.await.unwrap();

        // 恢复后的最终结果与不间断运行一致
        assert!(outcome.success());
        assert_eq!(outcome.files_copied, 2);
        assert_eq!(fs::read(dst_dir.path().join("a.txt")).unwrap(), b"one");
        assert_eq!(fs::read(dst_dir.path().join("b.txt")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_cancel_stops_at_file_boundary() {
        let (src_dir, dst_dir, src, dst) = host_pair();
        fs::write(src_dir.path().join("a.txt"), b"a").unwrap();

        let controls = Arc::new(SyncControls::new());
        controls.cancel();
        let s = MountSyncer::new(MergeStrategy::Newer, HashMap::new(), controls);

        let outcome = s
            .sync_mount(
                &src,
                &dst,
                src_dir.path().to_str().unwrap(),
                dst_dir.path().to_str().unwrap(),
                &[result("a.txt", FileStatus::MissingTarget)],
                |_| {},
            )
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.files_copied, 0);
        assert!(!dst_dir.path().join("a.txt").exists());
    }
}
