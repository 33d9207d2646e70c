//! 统一错误处理
//!
//! - [`AppError`] - 应用错误枚举 (implements `IntoResponse`)
//! - [`AppResponse`] - API 响应结构
//!
//! # 错误码规范
//!
//! | 代码 | HTTP | 说明 |
//! |------|------|------|
//! | E0000 | 200 | 成功 |
//! | E0002 | 400 | 验证失败 |
//! | E0003 | 404 | 资源不存在 |
//! | E0004 | 409 | 冲突 (并发修改) |
//! | E0007 | 503 | 服务暂不可用 |
//! | E9001 | 500 | 内部错误 |
//! | E9002 | 500 | 存储错误 |
//!
//! Denied / duplicate check-ins are successful responses carrying a
//! status, not errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::attendance::{CheckInError, StorageError};

/// API 统一响应结构
///
/// ```json
/// {
///   "code": "E0000",
///   "message": "Success",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AppResponse<T> {
    /// 错误码 (E0000 表示成功)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// 应用错误枚举
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    /// 资源不存在 (404)
    NotFound(String),

    #[error("Conflict: {0}")]
    /// 并发冲突 (409)
    Conflict(String),

    #[error("Validation failed: {0}")]
    /// 验证失败 (400)
    Validation(String),

    #[error("Service unavailable: {0}")]
    /// 暂不可用，可重试 (503)
    Unavailable(String),

    #[error("Storage error: {0}")]
    /// 存储错误 (500)
    Storage(String),

    #[error("Internal server error: {0}")]
    /// 内部错误 (500)
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "E0003", msg.as_str()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "E0004", msg.as_str()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "E0002", msg.as_str()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "E0007", msg.as_str()),
            AppError::Storage(msg) => {
                error!(target: "database", error = %msg, "Storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "E9002", "Storage error")
            }
            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "E9001", "Internal server error")
            }
        };

        let body = Json(AppResponse::<()> {
            code: code.to_string(),
            message: message.to_string(),
            data: None,
        });

        (status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::MemberNotFound(id) => AppError::NotFound(format!("Member not found: {}", id)),
            StorageError::RecordNotFound(id) => AppError::NotFound(format!("Attendance record not found: {}", id)),
            StorageError::VersionConflict { .. } => AppError::Conflict(e.to_string()),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl From<CheckInError> for AppError {
    fn from(e: CheckInError) -> Self {
        match e {
            CheckInError::MemberNotFound(id) => AppError::NotFound(format!("Member not found: {}", id)),
            CheckInError::Unavailable(msg) => AppError::Unavailable(msg),
            CheckInError::Contended(_) => AppError::Conflict(e.to_string()),
            CheckInError::Storage(e) => e.into(),
        }
    }
}

/// Create a successful response
pub fn ok<T: Serialize>(data: T) -> Json<AppResponse<T>> {
    Json(AppResponse {
        code: "E0000".to_string(),
        message: "Success".to_string(),
        data: Some(data),
    })
}
