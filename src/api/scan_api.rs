//! 扫描任务 API
//!
//! 提交后立即返回任务 id，扫描在后台执行；状态、结果和推送流都只读任务记录。

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::middleware::{AuthUser, TraceId},
    app_state::AppState,
    domain::{
        provider_result::ProviderResult,
        scan_job::{ScanJob, ScanKind, ScanListItem, ScanStatus, ScanStatusView, STATUS_LOG_TAIL, STREAM_LOG_TAIL},
    },
    error::AppError,
    metrics,
    repository::{scan_job_repository::LIST_LIMIT, ScanJobRepository},
    service::ScanRequest,
};

/// 推送流轮询间隔
pub const STREAM_INTERVAL: Duration = Duration::from_millis(600);
const MIN_INPUT_LEN: usize = 4;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateScanRequest {
    pub kind: ScanKind,
    pub input: String,
    /// bitcoin / btc / ethereum / eth / auto，缺省为 auto
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default, alias = "compareProviders")]
    pub compare_providers: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateScanResponse {
    pub id: Uuid,
    pub status: ScanStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PendingResponse {
    pub detail: String,
}

fn scan_not_found(trace_id: &TraceId) -> AppError {
    AppError::not_found("Scan not found").with_trace_id(trace_id.as_str())
}

/// 只接受 UUID 形式的 id，其他一律按不存在处理
async fn find_owned(
    state: &AppState,
    user: AuthUser,
    id: &str,
    trace_id: &TraceId,
) -> Result<ScanJob, AppError> {
    let Ok(id) = Uuid::parse_str(id) else {
        return Err(scan_not_found(trace_id));
    };
    state
        .jobs
        .get_for_user(id, user.user_id)
        .await?
        .ok_or_else(|| scan_not_found(trace_id))
}

#[utoipa::path(
    post,
    path = "/api/v1/scan",
    request_body = CreateScanRequest,
    responses(
        (status = 200, description = "Scan job accepted", body = CreateScanResponse),
        (status = 400, description = "Invalid request", body = crate::error_body::ErrorBodyDoc),
        (status = 401, description = "Unauthorized", body = crate::error_body::ErrorBodyDoc)
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn create_scan(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    trace_id: TraceId,
    Json(req): Json<CreateScanRequest>,
) -> Result<Json<CreateScanResponse>, AppError> {
    let input = req.input.trim().to_string();
    if input.chars().count() < MIN_INPUT_LEN {
        metrics::count_err("POST /api/v1/scan");
        return Err(AppError::validation_failed(format!(
            "input must be at least {} characters",
            MIN_INPUT_LEN
        ))
        .with_trace_id(trace_id.as_str()));
    }

    let chain = req
        .chain
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let job = state
        .orchestrator
        .submit(
            user.user_id,
            ScanRequest {
                kind: req.kind,
                input,
                chain,
                compare_providers: req.compare_providers,
            },
        )
        .await
        .map_err(|e| AppError::from(e).with_trace_id(trace_id.as_str()))?;

    metrics::count_ok("POST /api/v1/scan");
    Ok(Json(CreateScanResponse {
        id: job.id,
        status: job.status,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/scan",
    responses(
        (status = 200, description = "Caller's scan jobs, newest first", body = [ScanListItem]),
        (status = 401, description = "Unauthorized", body = crate::error_body::ErrorBodyDoc)
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn list_scans(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<ScanListItem>>, AppError> {
    let jobs = state.jobs.list_for_user(user.user_id, LIST_LIMIT).await?;
    metrics::count_ok("GET /api/v1/scan");
    Ok(Json(jobs.iter().map(ScanJob::list_item).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/scan/{id}/status",
    params(("id" = String, Path, description = "Scan job id")),
    responses(
        (status = 200, description = "Job status with the most recent log lines", body = ScanStatusView),
        (status = 404, description = "Scan not found", body = crate::error_body::ErrorBodyDoc)
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn scan_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    trace_id: TraceId,
    Path(id): Path<String>,
) -> Result<Json<ScanStatusView>, AppError> {
    let job = find_owned(&state, user, &id, &trace_id).await?;
    Ok(Json(job.status_view(STATUS_LOG_TAIL)))
}

#[utoipa::path(
    get,
    path = "/api/v1/scan/{id}/results",
    params(("id" = String, Path, description = "Scan job id")),
    responses(
        (status = 200, description = "Scan results", body = ProviderResult),
        (status = 202, description = "Scan not completed", body = PendingResponse),
        (status = 404, description = "Scan not found", body = crate::error_body::ErrorBodyDoc)
    ),
    security(("bearer_auth" = [])),
    tag = "Scan"
)]
pub async fn scan_results(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    trace_id: TraceId,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job = find_owned(&state, user, &id, &trace_id).await?;
    match (job.status, job.results) {
        (ScanStatus::Completed, Some(results)) => Ok(Json(results).into_response()),
        _ => Ok((
            StatusCode::ACCEPTED,
            Json(PendingResponse {
                detail: "Scan not completed".into(),
            }),
        )
            .into_response()),
    }
}

/// 推送流不做认证，按 id 直接读任务
pub async fn scan_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let jobs = state.jobs.clone();
    let id = Uuid::parse_str(&id).ok();
    ws.on_upgrade(move |socket| stream_status(socket, jobs, id))
}

/// 每 600ms 推送一次 `{id,status,progress,logs}`；终态推送一次后关闭，任务不存在时推送 not_found 后关闭
async fn stream_status(mut socket: WebSocket, jobs: Arc<dyn ScanJobRepository>, id: Option<Uuid>) {
    loop {
        let job = match id {
            Some(id) => match jobs.get(id).await {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to read scan job for stream");
                    None
                }
            },
            None => None,
        };

        let Some(job) = job else {
            let _ = socket
                .send(Message::Text(json!({ "error": "not_found" }).to_string()))
                .await;
            break;
        };

        let payload = match serde_json::to_string(&job.status_view(STREAM_LOG_TAIL)) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to encode stream payload");
                break;
            }
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            // 客户端已断开
            return;
        }
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(STREAM_INTERVAL).await;
    }

    let _ = socket.send(Message::Close(None)).await;
}
