pub mod config;
pub mod core;
pub mod db;
pub mod host;
pub mod logging;
pub mod server;

use anyhow::Result;
use config::AppConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 连接层共享状态
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub config: AppConfig,
}

impl AppState {
    pub async fn new(data_dir: &Path, config: AppConfig) -> Result<Self> {
        let db_path = data_dir.join("mountsync.db");
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            db: Arc::new(pool),
            config,
        })
    }
}

/// 数据目录：MOUNTSYNC_DATA_DIR 优先，否则使用用户主目录下的 .mountsync
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MOUNTSYNC_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".mountsync")
}
