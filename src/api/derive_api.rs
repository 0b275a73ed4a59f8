//! 密钥派生 API
//! 十六进制种子 → 扩展密钥与地址快照（同步计算，不访问网络）

use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    api::middleware::{AuthUser, TraceId},
    domain::derivation::{snapshot_from_hex, DerivedSnapshot},
    error::AppError,
    metrics,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeriveFromHexRequest {
    /// 最多 64 个十六进制字符，可带 `0x` 前缀
    pub hex: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/derive/from-hex",
    request_body = DeriveFromHexRequest,
    responses(
        (status = 200, description = "Derived snapshot", body = DerivedSnapshot),
        (status = 400, description = "Invalid hex seed", body = crate::error_body::ErrorBodyDoc),
        (status = 401, description = "Unauthorized", body = crate::error_body::ErrorBodyDoc),
        (status = 500, description = "Derivation failure", body = crate::error_body::ErrorBodyDoc)
    ),
    security(("bearer_auth" = [])),
    tag = "Derive"
)]
pub async fn derive_from_hex(
    user: AuthUser,
    trace_id: TraceId,
    Json(req): Json<DeriveFromHexRequest>,
) -> Result<Json<DerivedSnapshot>, AppError> {
    // 种子本身不能进日志
    let snapshot = snapshot_from_hex(&req.hex).map_err(|e| {
        metrics::count_err("POST /api/v1/derive/from-hex");
        AppError::from(e).with_trace_id(trace_id.as_str())
    })?;

    metrics::count_ok("POST /api/v1/derive/from-hex");
    metrics::inc_derivation();
    tracing::info!(user_id = %user.user_id, "Derived snapshot from hex seed");
    Ok(Json(snapshot))
}
