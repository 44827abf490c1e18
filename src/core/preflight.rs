use crate::db::{MountTransferConfig, MountType};
use crate::host::HostFs;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// 单个挂载的预检结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightResult {
    pub passed: bool,
    pub reason: Option<String>,
}

impl PreflightResult {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
        }
    }
}

/// 对目标主机逐挂载做只读预检：可达性、可用空间、目标路径可创建。
/// 失败的挂载记录为 fail 而不抛出——包括 create_if_missing=false 且路径缺失的
/// 情况也只记录不硬失败，由会话上报后继续扫描，操作员自行决定。
/// 不修改任何配置或会话状态。
pub async fn run_preflight_checks(
    target: &dyn HostFs,
    mounts: &[MountTransferConfig],
    min_free_space: u64,
    mut on_progress: impl FnMut(&str, &PreflightResult),
) -> HashMap<String, PreflightResult> {
    let mut results = HashMap::new();

    for mount in mounts {
        let result = check_mount(target, mount, min_free_space).await;
        if !result.passed {
            warn!(
                "预检未通过: 挂载 {} - {}",
                mount.mount_id,
                result.reason.as_deref().unwrap_or("unknown")
            );
        }
        on_progress(&mount.mount_id, &result);
        results.insert(mount.mount_id.clone(), result);
    }

    results
}

async fn check_mount(
    target: &dyn HostFs,
    mount: &MountTransferConfig,
    min_free_space: u64,
) -> PreflightResult {
    // 可达性
    if let Err(e) = target.ping().await {
        return PreflightResult::fail(format!("目标主机不可达: {}", e));
    }

    // 卷挂载由 Docker 管理路径，只检查主机可用空间
    let probe_path = match mount.mount_type {
        MountType::Volume => "/".to_string(),
        MountType::Bind => match target.stat(&mount.target_path).await {
            Ok(Some(meta)) if !meta.is_dir => {
                return PreflightResult::fail(format!(
                    "目标路径已存在且不是目录: {}",
                    mount.target_path
                ));
            }
            Ok(Some(_)) => mount.target_path.clone(),
            Ok(None) => {
                if !mount.create_if_missing {
                    return PreflightResult::fail(format!(
                        "目标路径不存在且不允许创建: {}",
                        mount.target_path
                    ));
                }
                // 路径缺失但允许创建：确认最近的已存在祖先是目录
                match nearest_existing_ancestor(target, &mount.target_path).await {
                    Some(ancestor) => ancestor,
                    None => return PreflightResult::fail("目标路径的上级目录均不可达"),
                }
            }
            Err(e) => return PreflightResult::fail(format!("检查目标路径失败: {}", e)),
        },
    };

    // 可用空间
    match target.free_space(&probe_path).await {
        Ok(available) => {
            debug!(
                "挂载 {} 目标可用空间 {} 字节 (阈值 {})",
                mount.mount_id, available, min_free_space
            );
            if available < min_free_space {
                return PreflightResult::fail(format!(
                    "目标主机可用空间不足: {} 字节 (需要至少 {} 字节)",
                    available, min_free_space
                ));
            }
        }
        Err(e) => return PreflightResult::fail(format!("查询可用空间失败: {}", e)),
    }

    PreflightResult::pass()
}

/// 自下而上找到第一个已存在且为目录的祖先路径
async fn nearest_existing_ancestor(target: &dyn HostFs, path: &str) -> Option<String> {
    let mut current = std::path::Path::new(path);
    while let Some(parent) = current.parent() {
        let parent_str = parent.to_str()?;
        if parent_str.is_empty() {
            break;
        }
        if let Ok(Some(meta)) = target.stat(parent_str).await {
            if meta.is_dir {
                return Some(parent_str.to_string());
            }
            return None;
        }
        current = parent;
    }
    None
}
