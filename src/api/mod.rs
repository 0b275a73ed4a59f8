use std::sync::Arc;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    api::middleware::{jwt_auth_middleware, trace_id_middleware},
    app_state::AppState,
};

pub mod derive_api;
pub mod handlers;
pub mod middleware;
pub mod scan_api;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::api_health,
        derive_api::derive_from_hex,
        scan_api::create_scan,
        scan_api::list_scans,
        scan_api::scan_status,
        scan_api::scan_results,
    ),
    components(
        schemas(
            derive_api::DeriveFromHexRequest,
            crate::domain::derivation::DerivedSnapshot,
            scan_api::CreateScanRequest,
            scan_api::CreateScanResponse,
            scan_api::PendingResponse,
            crate::domain::scan_job::ScanKind,
            crate::domain::scan_job::ScanStatus,
            crate::domain::scan_job::ScanStatusView,
            crate::domain::scan_job::ScanListItem,
            crate::domain::provider_result::ProviderResult,
            crate::domain::provider_result::ResultSummary,
            crate::domain::provider_result::AddressEntry,
            crate::domain::provider_result::BalancePoint,
            crate::domain::provider_result::VolumeBucket,
            crate::domain::provider_result::ResultMeta,
            crate::domain::provider_result::XpubNormalization,
            crate::infrastructure::health::HealthCheckResult,
            crate::infrastructure::health::ComponentStatus,
            crate::error_body::ErrorBodyDoc
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "keyscan API", description = "Auto-generated OpenAPI via utoipa")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

fn cors_layer() -> CorsLayer {
    let trace_header = HeaderName::from_static("x-trace-id");
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, trace_header.clone()])
        .expose_headers([trace_header])
}

pub fn routes(state: Arc<AppState>) -> Router {
    // 公开路由（不需要认证）
    let public_routes = Router::new()
        .route("/health", get(handlers::api_health))
        .route("/api/health", get(handlers::api_health))
        .route("/metrics", get(handlers::metrics_text))
        .route("/ws/scan/:id", get(scan_api::scan_stream))
        .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));

    // 需要 Bearer token 的路由
    let protected_routes = Router::new()
        .route("/api/v1/derive/from-hex", post(derive_api::derive_from_hex))
        .route(
            "/api/v1/scan",
            post(scan_api::create_scan).get(scan_api::list_scans),
        )
        .route("/api/v1/scan/:id/status", get(scan_api::scan_status))
        .route("/api/v1/scan/:id/results", get(scan_api::scan_results))
        .layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(trace_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(state)
}
