use thiserror::Error;

/// 迁移请求的错误分类，决定 error 事件内容与会话状态的处理方式
#[derive(Debug, Error)]
pub enum TransferError {
    /// 跨组织访问或权限不足，在任何网络 IO 之前抛出
    #[error("Unauthorized")]
    Unauthorized,

    /// 请求参数无法解析为有效配置
    #[error("{0}")]
    BadRequest(String),

    /// 内部错误（数据库等）
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::Internal(e.into())
    }
}
