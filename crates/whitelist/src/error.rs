//! 白名单服务错误定义

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// 白名单服务错误类型
#[derive(Error, Debug)]
pub enum WhitelistError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 数据库中缺少 whitelist 表
    #[error("Whitelist schema is missing in database {0}, run `create-db` first")]
    SchemaMissing(String),

    /// 不支持的 JSON-RPC 方法
    #[error("Unsupported JSON-RPC method: {0}")]
    InvalidRequestMethod(String),

    /// 无效的请求参数
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 地址格式错误（仅导入时使用）
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    /// 时间格式错误（仅导入时使用）
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// CSV 读取/解析错误
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 内部服务器错误
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WhitelistError {
    /// 错误对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            WhitelistError::InvalidRequestMethod(_) => StatusCode::NOT_FOUND,
            WhitelistError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WhitelistError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            // 方法过滤属于预期行为，不按错误记录
            WhitelistError::InvalidRequestMethod(method) => {
                tracing::debug!("Rejected JSON-RPC method: {}", method);
            }
            WhitelistError::InvalidInput(reason) => {
                tracing::debug!("Rejected request: {}", reason);
            }
            _ => {
                // 不向客户端暴露内部错误详情
                tracing::error!("Internal error: {:?}", self);
            }
        }

        // 所有错误响应均为空 body
        status.into_response()
    }
}

/// 白名单结果类型别名
pub type WhitelistResult<T> = Result<T, WhitelistError>;
