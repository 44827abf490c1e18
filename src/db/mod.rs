pub mod models;
pub use models::*;

use anyhow::Result;
pub use sqlx::SqlitePool;

impl ServiceRow {
    /// 按类型加载服务，类型不匹配视为不存在
    pub async fn find_by_id(
        pool: &SqlitePool,
        service_id: &str,
        service_type: ServiceType,
    ) -> Result<Option<ServiceRow>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT * FROM services WHERE id = ? AND service_type = ?",
        )
        .bind(service_id)
        .bind(service_type.as_str())
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }
}

impl ServerRow {
    pub async fn find_by_id(pool: &SqlitePool, server_id: &str) -> Result<Option<ServerRow>> {
        let row = sqlx::query_as::<_, ServerRow>("SELECT * FROM servers WHERE id = ?")
            .bind(server_id)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }
}

impl MountRow {
    /// 加载服务的全部挂载记录（含 file 类型，调用方负责过滤）
    pub async fn find_by_service_id(pool: &SqlitePool, service_id: &str) -> Result<Vec<MountRow>> {
        let rows = sqlx::query_as::<_, MountRow>(
            "SELECT * FROM mounts WHERE service_id = ? ORDER BY created_at ASC",
        )
        .bind(service_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}

/// 细粒度权限检查：成员用户对单个服务是否允许指定操作
pub async fn check_service_access(
    pool: &SqlitePool,
    user_id: &str,
    service_id: &str,
    action: &str,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM service_permissions WHERE user_id = ? AND service_id = ? AND action = ?",
    )
    .bind(user_id)
    .bind(service_id)
    .bind(action)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}
