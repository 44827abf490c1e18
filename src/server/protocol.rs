use crate::core::comparator::{CompareSummary, FileCompareResult};
use crate::core::resolver::ScanRequest;
use crate::core::syncer::ManualDecision;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 双向消息信封：{ type, payload, timestamp(ms) }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(message_type: &str, payload: Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            payload,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// scan 命令载荷
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ScanCommand {
    pub config: ScanRequest,
}

/// sync 命令载荷，manual 策略下携带逐文件裁决
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SyncCommand {
    #[serde(default)]
    pub manual_decisions: HashMap<String, ManualDecision>,
}

/// 经过校验的客户端命令
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Scan(ScanCommand),
    Compare,
    Sync(SyncCommand),
    Pause,
    Resume,
    Cancel,
}

impl ClientCommand {
    /// 解析一帧文本消息。任何失败都返回带细节的错误串，
    /// 由调用方转为 error 事件，不改变会话状态。
    pub fn parse(text: &str) -> Result<ClientCommand, String> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| format!("Invalid message envelope: {}", e))?;

        match envelope.message_type.as_str() {
            "scan" => {
                let cmd: ScanCommand = serde_json::from_value(envelope.payload)
                    .map_err(|e| format!("Invalid scan payload: {}", e))?;
                Ok(ClientCommand::Scan(cmd))
            }
            "compare" => Ok(ClientCommand::Compare),
            "sync" => {
                let cmd: SyncCommand = serde_json::from_value(envelope.payload)
                    .map_err(|e| format!("Invalid sync payload: {}", e))?;
                Ok(ClientCommand::Sync(cmd))
            }
            "pause" => Ok(ClientCommand::Pause),
            "resume" => Ok(ClientCommand::Resume),
            "cancel" => Ok(ClientCommand::Cancel),
            other => Err(format!("Unknown command type: {}", other)),
        }
    }
}

/// 单个挂载在 scan_complete 中的汇总
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountScanSummary {
    pub mount_id: String,
    pub source_file_count: usize,
    pub target_file_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgressPayload {
    pub mount_id: String,
    pub phase: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_found: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanCompletePayload {
    pub mounts: Vec<MountScanSummary>,
    pub failed_mounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareProgressPayload {
    pub mount_id: String,
    pub summary: CompareSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareCompletePayload {
    pub results: HashMap<String, Vec<FileCompareResult>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressPayload {
    pub mount_id: String,
    pub path: String,
    pub bytes: u64,
    pub checksum: String,
    pub files_done: u64,
    pub files_total: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCompletePayload {
    pub success: bool,
    pub errors: HashMap<String, Vec<String>>,
    pub files_copied: u64,
    pub files_skipped: u64,
    pub bytes_transferred: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
}

/// 服务端事件，发送前统一包装成信封
#[derive(Debug, Clone)]
pub enum ServerEvent {
    ScanStart,
    ScanProgress(ScanProgressPayload),
    ScanComplete(ScanCompletePayload),
    CompareStart,
    CompareProgress(CompareProgressPayload),
    CompareComplete(CompareCompletePayload),
    SyncStart,
    SyncProgress(SyncProgressPayload),
    SyncComplete(SyncCompletePayload),
    Paused,
    Resumed,
    Cancelled,
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::ScanStart => "scan_start",
            ServerEvent::ScanProgress(_) => "scan_progress",
            ServerEvent::ScanComplete(_) => "scan_complete",
            ServerEvent::CompareStart => "compare_start",
            ServerEvent::CompareProgress(_) => "compare_progress",
            ServerEvent::CompareComplete(_) => "compare_complete",
            ServerEvent::SyncStart => "sync_start",
            ServerEvent::SyncProgress(_) => "sync_progress",
            ServerEvent::SyncComplete(_) => "sync_complete",
            ServerEvent::Paused => "paused",
            ServerEvent::Resumed => "resumed",
            ServerEvent::Cancelled => "cancelled",
            ServerEvent::Error(_) => "error",
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let event_type = self.event_type();
        let payload = match self {
            ServerEvent::ScanStart
            | ServerEvent::CompareStart
            | ServerEvent::SyncStart
            | ServerEvent::Paused
            | ServerEvent::Resumed
            | ServerEvent::Cancelled => Value::Object(Default::default()),
            ServerEvent::ScanProgress(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            ServerEvent::ScanComplete(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            ServerEvent::CompareProgress(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            ServerEvent::CompareComplete(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            ServerEvent::SyncProgress(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            ServerEvent::SyncComplete(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            ServerEvent::Error(p) => serde_json::to_value(p).unwrap_or(Value::Null),
        };
        Envelope::new(event_type, payload)
    }
}
