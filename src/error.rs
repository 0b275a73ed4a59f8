use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::derivation::DeriveError;

/// 错误分类
///
/// - `Input`：调用方输入错误（格式错误的 hex / 地址 / 扩展密钥、不支持的网络或链）
/// - `Upstream`：上游 HTTP 失败、响应结构异常、熔断打开
/// - `Partial`：对比数据源单个地址失败，只降级该条目
/// - `Internal`：密码库等内部失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Input,
    Upstream,
    Partial,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Input => "input",
            ErrorClass::Upstream => "upstream",
            ErrorClass::Partial => "partial",
            ErrorClass::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AppErrorCode {
    Unauthorized,
    NotFound,
    Internal,

    InvalidHex,
    TokenInvalid,
    ValidationFailed,
}

impl AppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppErrorCode::Unauthorized => "unauthorized",
            AppErrorCode::NotFound => "not_found",
            AppErrorCode::Internal => "internal",
            AppErrorCode::InvalidHex => "invalid_hex",
            AppErrorCode::TokenInvalid => "token_invalid",
            AppErrorCode::ValidationFailed => "validation_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
    pub trace_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    trace_id: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.as_str(),
            message: &self.message,
            trace_id: self.trace_id.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    fn new(code: AppErrorCode, status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            status,
            trace_id: None,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::NotFound, StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Internal, StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::Unauthorized, StatusCode::UNAUTHORIZED, msg)
    }

    pub fn token_invalid(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::TokenInvalid, StatusCode::UNAUTHORIZED, msg)
    }

    pub fn invalid_hex(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::InvalidHex, StatusCode::BAD_REQUEST, msg)
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::new(AppErrorCode::ValidationFailed, StatusCode::BAD_REQUEST, msg)
    }

    /// 设置追踪ID
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

// 派生错误：输入类 → 400，密码库失败 → 500
impl From<DeriveError> for AppError {
    fn from(err: DeriveError) -> Self {
        if err.is_input_error() {
            Self::invalid_hex(err.to_string())
        } else {
            tracing::error!(error = %err, "key derivation failed");
            Self::internal("Key derivation failed")
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{}", err))
    }
}
