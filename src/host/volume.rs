//! 命名卷解析 - 卷不是主机路径，需借助一次性容器挂载后才可寻址

use super::{shell_quote, HostFs};
use anyhow::{anyhow, Result};
use std::sync::LazyLock;
use tracing::debug;

/// 卷名合法性校验（与 Docker 的命名规则一致）
static VOLUME_NAME: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap());

/// 挂载卷的一次性辅助容器镜像
const HELPER_IMAGE: &str = "alpine:3";

/// 将命名卷解析为主机上的可寻址路径。
///
/// 先通过一次性辅助容器挂载卷（卷不存在且允许创建时由 Docker 隐式创建），
/// 再用 `docker volume inspect` 取得宿主机上的挂载点。
pub async fn resolve_volume_path(
    host: &dyn HostFs,
    volume_name: &str,
    create_if_missing: bool,
) -> Result<String> {
    if !VOLUME_NAME.is_match(volume_name) {
        return Err(anyhow!("非法的卷名: {}", volume_name));
    }

    if !create_if_missing {
        let check = host
            .exec(&format!(
                "docker volume inspect {} >/dev/null 2>&1",
                shell_quote(volume_name)
            ))
            .await?;
        if !check.success() {
            return Err(anyhow!("卷不存在: {}", volume_name));
        }
    }

    // 附加到一次性容器，确保卷存在且已初始化
    let attach = host
        .exec(&format!(
            "docker run --rm -v {}:/mnt {} true",
            shell_quote(volume_name),
            HELPER_IMAGE
        ))
        .await?;
    if !attach.success() {
        return Err(anyhow!(
            "挂载卷 {} 失败: {}",
            volume_name,
            attach.stderr.trim()
        ));
    }

    let inspect = host
        .exec(&format!(
            "docker volume inspect --format '{{{{ .Mountpoint }}}}' {}",
            shell_quote(volume_name)
        ))
        .await?;
    if !inspect.success() {
        return Err(anyhow!(
            "查询卷 {} 挂载点失败: {}",
            volume_name,
            inspect.stderr.trim()
        ));
    }

    let mountpoint = inspect.stdout.trim().to_string();
    if mountpoint.is_empty() {
        return Err(anyhow!("卷 {} 的挂载点为空", volume_name));
    }

    debug!("卷 {} 解析为 {}", volume_name, mountpoint);
    Ok(mountpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_name_validation() {
        assert!(VOLUME_NAME.is_match("pg-data"));
        assert!(VOLUME_NAME.is_match("app_data.v2"));
        assert!(!VOLUME_NAME.is_match("-leading-dash"));
        assert!(!VOLUME_NAME.is_match("bad name"));
        assert!(!VOLUME_NAME.is_match("a;rm -rf /"));
    }
}
