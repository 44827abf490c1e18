pub mod local;
pub mod ssh;
pub mod volume;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use local::LocalHost;
pub use ssh::SshHost;

/// 非 IO 操作超时（秒）- stat, exec 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 给远程操作加上限时，挂死的连接不会无限占用会话
pub(crate) async fn with_timeout<T>(
    duration: std::time::Duration,
    what: &str,
    fut: impl std::future::Future<Output = Result<T>> + Send,
) -> Result<T> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("操作超时: {}", what)),
    }
}

/// 文件信息（路径相对于扫描根目录，统一使用 / 分隔）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub modified_time: i64,
    pub checksum: Option<String>,
}

/// 文件元数据（用于快速检查）
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub size: u64,
    pub modified_time: i64,
    pub is_dir: bool,
}

/// 命令执行结果
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// 主机抽象接口：文件访问 + 命令执行
#[async_trait]
pub trait HostFs: Send + Sync {
    /// 递归枚举 root 下所有普通文件，每发现一个立即回调一次。
    /// 回调在枚举过程中调用，而不是枚举结束后批量重放。
    async fn list_files(
        &self,
        root: &str,
        on_file: &mut (dyn FnMut(FileInfo) + Send),
    ) -> Result<()>;

    /// 获取文件元数据，不存在时返回 None
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 读取整个文件
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 写入整个文件：先写临时路径再原子重命名，目标位置不会出现半写文件
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// 递归创建目录
    async fn create_dir_all(&self, path: &str) -> Result<()>;

    /// 在主机上执行 shell 命令
    async fn exec(&self, cmd: &str) -> Result<ExecOutput>;

    /// 连通性检查
    async fn ping(&self) -> Result<()>;

    /// 查询路径所在文件系统的可用字节数
    async fn free_space(&self, path: &str) -> Result<u64> {
        let out = self.exec(&format!("df -Pk {}", shell_quote(path))).await?;
        if !out.success() {
            anyhow::bail!("df 执行失败: {}", out.stderr.trim());
        }
        parse_df_available(&out.stdout)
    }

    /// 获取主机名称（用于日志）
    fn name(&self) -> &str;
}

/// 解析 `df -Pk` 输出的 Available 列（KB），返回字节数
fn parse_df_available(output: &str) -> Result<u64> {
    let line = output
        .lines()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("df 输出缺少数据行"))?;
    let avail_kb: u64 = line
        .split_whitespace()
        .nth(3)
        .ok_or_else(|| anyhow::anyhow!("df 输出格式异常: {}", line))?
        .parse()?;
    Ok(avail_kb * 1024)
}

/// 单引号包裹 shell 参数
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// 规范化路径分隔符（统一使用 /）
pub(crate) fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// 根据服务器记录创建主机实例。
/// None 或地址为 "local" 的记录表示主控主机本地，其余走 SSH。
pub async fn connect_host(
    server: Option<&crate::db::ServerRow>,
) -> Result<std::sync::Arc<dyn HostFs>> {
    match server {
        None => {
            tracing::info!("使用本地主机");
            Ok(std::sync::Arc::new(LocalHost::new()) as std::sync::Arc<dyn HostFs>)
        }
        Some(row) if row.address == "local" => {
            tracing::info!("服务器 {} 指向主控本地", row.name);
            Ok(std::sync::Arc::new(LocalHost::new()) as std::sync::Arc<dyn HostFs>)
        }
        Some(row) => {
            tracing::info!("连接远程主机: {} ({})", row.name, row.address);
            Ok(std::sync::Arc::new(
                SshHost::connect(
                    &row.address,
                    &row.ssh_user,
                    row.ssh_key_path.as_deref(),
                    row.ssh_password.as_deref(),
                )
                .await?,
            ) as std::sync::Arc<dyn HostFs>)
        }
    }
}
