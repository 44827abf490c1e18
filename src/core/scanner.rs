use crate::core::controls::SyncControls;
use crate::host::{FileInfo, HostFs};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// 挂载扫描器：枚举一台主机上一个挂载根目录下的全部普通文件
pub struct MountScanner {
    exclude_patterns: Vec<String>,
    controls: Option<Arc<SyncControls>>,
}

impl MountScanner {
    pub fn new(exclude_patterns: Vec<String>) -> Self {
        Self {
            exclude_patterns,
            controls: None,
        }
    }

    /// 创建带取消信号的扫描器
    pub fn with_controls(exclude_patterns: Vec<String>, controls: Arc<SyncControls>) -> Self {
        Self {
            exclude_patterns,
            controls: Some(controls),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.controls
            .as_ref()
            .map(|c| c.is_cancelled())
            .unwrap_or(false)
    }

    /// 检查路径是否应该被排除
    fn should_exclude(&self, path: &str) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| matches_pattern(path, pattern))
    }

    /// 扫描挂载根目录，每发现一个文件回调一次，完成后返回按路径排序的完整列表。
    /// 连通性失败以 Err 返回，由调用方按挂载隔离处理。
    pub async fn scan_mount(
        &self,
        host: &dyn HostFs,
        root: &str,
        mut on_file: impl FnMut(&FileInfo) + Send,
    ) -> Result<Vec<FileInfo>> {
        if self.is_cancelled() {
            return Err(anyhow::anyhow!("操作已取消"));
        }

        info!("开始扫描: {} 于 {}", root, host.name());

        let mut files = Vec::new();
        let mut excluded_count = 0;

        // 回调在枚举过程中触发，客户端在远端遍历期间就能看到进度
        host.list_files(root, &mut |file| {
            if self.should_exclude(&file.path) {
                debug!("排除文件: {}", file.path);
                excluded_count += 1;
                return;
            }

            on_file(&file);
            files.push(file);
        })
        .await?;

        if self.is_cancelled() {
            return Err(anyhow::anyhow!("操作已取消"));
        }

        // 稳定的路径序，保证进度与错误报告可复现
        files.sort_by(|a, b| a.path.cmp(&b.path));

        info!(
            "扫描完成: {} 个文件, {} 个被排除 ({})",
            files.len(),
            excluded_count,
            root
        );

        Ok(files)
    }
}

/// 简单的 glob 模式匹配
fn matches_pattern(path: &str, pattern: &str) -> bool {
    let path = path.to_lowercase();
    let pattern = pattern.to_lowercase();

    // 处理 ** 通配符
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            if prefix.is_empty() && suffix.is_empty() {
                return true;
            }

            if !prefix.is_empty() && !path.starts_with(prefix) {
                return false;
            }

            if !suffix.is_empty() && !path.ends_with(suffix) {
                return false;
            }

            return true;
        }
    }

    // 处理 * 通配符
    if pattern.contains('*') {
        let regex_pattern = pattern.replace('.', "\\.").replace('*', ".*");

        if let Ok(re) = regex::Regex::new(&format!("^{}$", regex_pattern)) {
            return re.is_match(&path);
        }
    }

    // 精确匹配
    path == pattern || path.ends_with(&format!("/{}", pattern))
}
