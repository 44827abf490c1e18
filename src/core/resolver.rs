use crate::core::error::TransferError;
use crate::db::{
    self, AuthContext, MergeStrategy, MountRow, MountTransferConfig, MountType, ServerRow,
    ServiceRow, ServiceType, SqlitePool, TransferConfig,
};
use serde::Deserialize;
use tracing::{debug, info};

/// 客户端 scan 命令携带的原始配置
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ScanRequest {
    pub service_id: String,
    pub service_type: ServiceType,
    #[serde(default)]
    pub target_server_id: Option<String>,
    pub merge_strategy: MergeStrategy,
}

/// 将原始请求解析为经过完整鉴权校验的迁移配置。
/// 只做只读查询，不触碰会话状态；所有鉴权失败都发生在任何网络 IO 之前。
pub async fn resolve_transfer_config(
    pool: &SqlitePool,
    auth: &AuthContext,
    request: &ScanRequest,
) -> Result<TransferConfig, TransferError> {
    // 按类型查找归属服务
    let service = ServiceRow::find_by_id(pool, &request.service_id, request.service_type)
        .await?
        .ok_or_else(|| TransferError::BadRequest(format!("Service not found: {}", request.service_id)))?;

    // 跨组织访问直接拒绝
    if service.organization_id != auth.organization_id {
        return Err(TransferError::Unauthorized);
    }

    // 成员用户需要细粒度权限；数据迁移按破坏性操作对待，要求 delete 权限
    if auth.is_member {
        let allowed =
            db::check_service_access(pool, &auth.user_id, &service.id, "delete").await?;
        if !allowed {
            return Err(TransferError::Unauthorized);
        }
    }

    let target_server_id = request
        .target_server_id
        .clone()
        .ok_or_else(|| TransferError::BadRequest("Target server is required".to_string()))?;

    validate_target_server(pool, &target_server_id, service.server_id.as_deref(), auth).await?;

    let mounts = expand_mounts(pool, &service).await?;
    if mounts.is_empty() {
        return Err(TransferError::BadRequest(
            "Service has no transferable mounts".to_string(),
        ));
    }

    info!(
        "迁移配置已解析: 服务 {} ({} 个挂载), {:?} -> {}",
        service.id,
        mounts.len(),
        service.server_id,
        target_server_id
    );

    Ok(TransferConfig {
        service_id: service.id,
        service_type: request.service_type,
        source_server_id: service.server_id,
        target_server_id,
        merge_strategy: request.merge_strategy,
        mounts,
    })
}

/// 目标服务器必须存在、属于同一组织，且不能与源相同
async fn validate_target_server(
    pool: &SqlitePool,
    target_server_id: &str,
    source_server_id: Option<&str>,
    auth: &AuthContext,
) -> Result<(), TransferError> {
    let server = ServerRow::find_by_id(pool, target_server_id)
        .await?
        .ok_or_else(|| TransferError::BadRequest("Target server is required".to_string()))?;

    if server.organization_id != auth.organization_id {
        return Err(TransferError::Unauthorized);
    }

    if source_server_id == Some(target_server_id) {
        return Err(TransferError::BadRequest(
            "Target server must differ from source server".to_string(),
        ));
    }

    Ok(())
}

/// 展开服务的挂载记录，仅保留 volume/bind 类型
async fn expand_mounts(
    pool: &SqlitePool,
    service: &ServiceRow,
) -> Result<Vec<MountTransferConfig>, TransferError> {
    let rows = MountRow::find_by_service_id(pool, &service.id).await?;

    let mut mounts = Vec::new();
    for row in rows {
        let (mount_type, path) = match row.mount_type.as_str() {
            "volume" => (MountType::Volume, row.volume_name.clone()),
            "bind" => (MountType::Bind, row.host_path.clone()),
            other => {
                debug!("跳过不可迁移的挂载类型: {} ({})", other, row.id);
                continue;
            }
        };

        let source_path = path.ok_or_else(|| {
            TransferError::BadRequest(format!("Mount {} has no resolvable source path", row.id))
        })?;

        // 目标端沿用同名卷/同路径
        mounts.push(MountTransferConfig {
            mount_id: row.id,
            mount_type,
            target_path: source_path.clone(),
            source_path,
            create_if_missing: true,
            update_mount_config: true,
        });
    }

    Ok(mounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn seed(pool: &SqlitePool) {
        sqlx::query(
            "INSERT INTO servers (id, name, organization_id, address, ssh_user, created_at)
             VALUES ('srv-1', 'worker-1', 'org-1', '10.0.0.2:22', 'root', 0),
                    ('srv-2', 'worker-2', 'org-2', '10.0.0.3:22', 'root', 0)",
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
             VALUES ('m-1', 'app-1', 'volume', 'web-data', NULL, '/data', 0),
                    ('m-2', 'app-1', 'bind', NULL, '/opt/uploads', '/uploads', 1),
                    ('m-3', 'app-1', 'file', NULL, NULL, '/etc/conf', 2)",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    fn auth(org: &str, is_member: bool) -> AuthContext {
        AuthContext {
            user_id: "user-1".to_string(),
            organization_id: org.to_string(),
            is_member,
        }
    }

    fn request(target: Option<&str>) -> ScanRequest {
        ScanRequest {
            service_id: "app-1".to_string(),
            service_type: ServiceType::Application,
            target_server_id: target.map(|s| s.to_string()),
            merge_strategy: MergeStrategy::Newer,
        }
    }

    #[tokio::test]
    async fn test_resolves_mounts_and_filters_file_type() {
        let pool = setup_pool().await;
        seed(&pool).await;

        let config = resolve_transfer_config(&pool, &auth("org-1", false), &request(Some("srv-1")))
            .await
            .unwrap();

        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[0].mount_id, "m-1");
        assert_eq!(config.mounts[0].mount_type, MountType::Volume);
        assert_eq!(config.mounts[0].source_path, "web-data");
        assert_eq!(config.mounts[1].source_path, "/opt/uploads");
        assert!(config.source_server_id.is_none());
    }

    #[tokio::test]
    async fn test_cross_org_is_unauthorized() {
        let pool = setup_pool().await;
        seed(&pool).await;

        let err = resolve_transfer_config(&pool, &auth("org-2", false), &request(Some("srv-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Unauthorized));
    }

    #[tokio::test]
    async fn test_missing_target_server_is_bad_request() {
        let pool = setup_pool().await;
        seed(&pool).await;

        let err = resolve_transfer_config(&pool, &auth("org-1", false), &request(None))
            .await
            .unwrap_err();
        match err {
            TransferError::BadRequest(msg) => assert_eq!(msg, "Target server is required"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_member_without_permission_is_unauthorized() {
        let pool = setup_pool().await;
        seed(&pool).await;

        let err = resolve_transfer_config(&pool, &auth("org-1", true), &request(Some("srv-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Unauthorized));

        // 授予 delete 权限后放行
        sqlx::query(
            "INSERT INTO service_permissions (user_id, service_id, action)
             VALUES ('user-1', 'app-1', 'delete')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let config = resolve_transfer_config(&pool, &auth("org-1", true), &request(Some("srv-1")))
            .await
            .unwrap();
        assert_eq!(config.service_id, "app-1");
    }

    #[tokio::test]
    async fn test_target_in_other_org_is_unauthorized() {
        let pool = setup_pool().await;
        seed(&pool).await;

        let err = resolve_transfer_config(&pool, &auth("org-1", false), &request(Some("srv-2")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Unauthorized));
    }
}
