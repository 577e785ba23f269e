//! 工具模块
//!
//! - [`logger`] - 日志初始化
//! - [`retry`] - 指数退避重试策略
//! - [`AppError`] / [`ApiResponse`] - 统一错误与响应（来自 shared::error）

pub mod logger;
pub mod retry;

pub use retry::RetryPolicy;
pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
