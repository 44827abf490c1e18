use crate::db::SqlitePool;
use chrono::{DateTime, Utc};
use tracing::warn;

/// 一次同步运行的历史记录
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub session_id: String,
    pub service_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: String,
    pub files_copied: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub bytes_transferred: u64,
    pub error_message: Option<String>,
}

/// 将同步结果写入历史表。写入失败只记日志，不影响同步结果上报。
pub async fn record_transfer(pool: &SqlitePool, record: &TransferRecord) {
    let result = sqlx::query(
        "INSERT INTO transfer_logs
         (session_id, service_id, start_time, end_time, status,
          files_copied, files_skipped, files_failed, bytes_transferred, error_message)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.session_id)
    .bind(&record.service_id)
    .bind(record.started_at.timestamp_millis())
    .bind(record.finished_at.timestamp_millis())
    .bind(&record.status)
    .bind(record.files_copied as i64)
    .bind(record.files_skipped as i64)
    .bind(record.files_failed as i64)
    .bind(record.bytes_transferred as i64)
    .bind(&record.error_message)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!("写入迁移历史失败: {}", e);
    }
}

/// 查询某个服务最近的迁移记录（仪表盘用）
pub async fn recent_transfers(
    pool: &SqlitePool,
    service_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<TransferRecord>> {
    let rows: Vec<(String, String, i64, i64, String, i64, i64, i64, i64, Option<String>)> =
        sqlx::query_as(
            "SELECT session_id, service_id, start_time, end_time, status,
                    files_copied, files_skipped, files_failed, bytes_transferred, error_message
             FROM transfer_logs WHERE service_id = ?
             ORDER BY start_time DESC LIMIT ?",
        )
        .bind(service_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| TransferRecord {
            session_id: r.0,
            service_id: r.1,
            started_at: DateTime::from_timestamp_millis(r.2).unwrap_or_default(),
            finished_at: DateTime::from_timestamp_millis(r.3).unwrap_or_default(),
            status: r.4,
            files_copied: r.5 as u64,
            files_skipped: r.6 as u64,
            files_failed: r.7 as u64,
            bytes_transferred: r.8 as u64,
            error_message: r.9,
        })
        .collect())
}
