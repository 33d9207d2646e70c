//! 工具模块 - 错误、日志、时间
//!
//! - [`AppError`] - 应用错误类型 (HTTP 映射)
//! - [`logger`] - tracing 初始化
//! - [`time`] - 场馆时区转换

pub mod error;
pub mod logger;
pub mod time;

pub use error::{AppError, AppResponse, AppResult, ok};
