//! 应用配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 同步相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 目标主机最小可用空间（MB），低于此值预检失败
    #[serde(default = "default_min_free_space_mb")]
    pub min_free_space_mb: u64,
    /// 扫描排除规则（glob patterns）
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_min_free_space_mb() -> u64 {
    100
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "lost+found/**".to_string(),
        ".DS_Store".to_string(),
        "*.tmp".to_string(),
        "*.temp".to_string(),
    ]
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_free_space_mb: default_min_free_space_mb(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// WebSocket 服务监听地址
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub log: crate::logging::LogConfig,
}

fn default_listen() -> String {
    "0.0.0.0:3456".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            sync: SyncSettings::default(),
            log: crate::logging::LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置目录加载，文件缺失或损坏时回退到默认值
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        if config_file.exists() {
            if let Ok(content) = fs::read_to_string(&config_file) {
                match serde_json::from_str::<AppConfig>(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("配置文件解析失败，使用默认配置: {}", e),
                }
            }
        }
        Self::default()
    }
}
