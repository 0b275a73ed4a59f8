use serde::Serialize;
use utoipa::ToSchema;

/// OpenAPI 文档用的错误响应结构
#[derive(Serialize, ToSchema)]
pub struct ErrorBodyDoc {
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}
