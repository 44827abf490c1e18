use crate::db::{AuthContext, SqlitePool};
use anyhow::Result;
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::debug;

/// 从升级请求中提取会话令牌。
/// 浏览器 WebSocket 无法自定义请求头，优先 query 参数，其次 Authorization: Bearer。
pub fn extract_token(query: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("token=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// 校验令牌并返回鉴权上下文，无效或过期返回 None
pub async fn validate_request(pool: &SqlitePool, token: &str) -> Result<Option<AuthContext>> {
    let row: Option<(String, String, i64, i64)> = sqlx::query_as(
        "SELECT user_id, organization_id, is_member, expires_at
         FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some((user_id, organization_id, is_member, expires_at)) = row else {
        debug!("未知的会话令牌");
        return Ok(None);
    };

    if expires_at <= Utc::now().timestamp_millis() {
        debug!("会话令牌已过期: 用户 {}", user_id);
        return Ok(None);
    }

    Ok(Some(AuthContext {
        user_id,
        organization_id,
        is_member: is_member != 0,
    }))
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

    #[test]
    fn test_extract_token_prefers_query() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer head-token".parse().unwrap());

        assert_eq!(
            extract_token(Some("foo=1&token=query-token"), &headers).as_deref(),
            Some("query-token")
        );
        assert_eq!(
            extract_token(None, &headers).as_deref(),
            Some("head-token")
        );
        assert_eq!(extract_token(Some("foo=1"), &HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_validate_request_checks_expiry() {
        let pool = setup_pool().await;
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            "INSERT INTO user_sessions (token, user_id, organization_id, is_member, expires_at)
             VALUES ('live', 'u-1', 'org-1', 1, ?), ('dead', 'u-2', 'org-1', 0, ?)",
        )
        .bind(now + 60_000)
        .bind(now - 60_000)
        .execute(&pool)
        .await
        .unwrap();

        let ctx = validate_request(&pool, "live").await.unwrap().unwrap();
        assert_eq!(ctx.user_id, "u-1");
        assert!(ctx.is_member);

        assert!(validate_request(&pool, "dead").await.unwrap().is_none());
        assert!(validate_request(&pool, "missing").await.unwrap().is_none());
    }
}
