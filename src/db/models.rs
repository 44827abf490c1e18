use serde::{Deserialize, Serialize};

/// 服务类型（与控制面的服务表一致）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Application,
    Postgres,
    Mysql,
    Mariadb,
    Mongo,
    Redis,
    Compose,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Application => "application",
            ServiceType::Postgres => "postgres",
            ServiceType::Mysql => "mysql",
            ServiceType::Mariadb => "mariadb",
            ServiceType::Mongo => "mongo",
            ServiceType::Redis => "redis",
            ServiceType::Compose => "compose",
        }
    }
}

/// 挂载类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Volume,
    Bind,
}

/// 合并策略：目标端文件何时允许被覆盖
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Skip,
    Overwrite,
    Newer,
    Manual,
}

/// 远程主机记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServerRow {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    /// host 或 host:port
    pub address: String,
    pub ssh_user: String,
    pub ssh_key_path: Option<String>,
    pub ssh_password: Option<String>,
    pub created_at: i64,
}

/// 服务记录（所有服务类型共用一张表，按 service_type 区分）
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub service_type: String,
    /// NULL 表示服务运行在本机（主控主机）
    pub server_id: Option<String>,
    pub organization_id: String,
    pub created_at: i64,
}

/// 挂载记录
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MountRow {
    pub id: String,
    pub service_id: String,
    /// volume | bind | file（file 类型不参与数据迁移）
    pub mount_type: String,
    pub volume_name: Option<String>,
    pub host_path: Option<String>,
    pub mount_path: String,
    pub created_at: i64,
}

/// 已认证的连接上下文（握手时由外部会话校验得出）
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub organization_id: String,
    pub is_member: bool,
}

/// 单个挂载的迁移配置
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountTransferConfig {
    pub mount_id: String,
    pub mount_type: MountType,
    /// volume 挂载时为卷名，bind 挂载时为主机路径
    pub source_path: String,
    pub target_path: String,
    pub create_if_missing: bool,
    pub update_mount_config: bool,
}

/// 一次扫描构建后不再变更的迁移配置
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub service_id: String,
    pub service_type: ServiceType,
    /// None 表示源在主控主机本地
    pub source_server_id: Option<String>,
    pub target_server_id: String,
    pub merge_strategy: MergeStrategy,
    pub mounts: Vec<MountTransferConfig>,
}
