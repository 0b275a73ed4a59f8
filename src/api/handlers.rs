use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{
    app_state::AppState,
    infrastructure::health::{check_health, HealthCheckResult},
    metrics,
};

/// 存活检查：缓存后端连通性 + 各数据源熔断状态
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service health", body = HealthCheckResult)),
    tag = "Health"
)]
pub async fn api_health(State(st): State<Arc<AppState>>) -> Json<HealthCheckResult> {
    metrics::count_ok("GET /api/health");
    let snapshots = st.services.guard_snapshots();
    Json(check_health(&st.services.cache, snapshots).await)
}

pub async fn metrics_text() -> String {
    metrics::render_prometheus()
}
