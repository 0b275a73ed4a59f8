//! JWT 认证中间件
//! 校验 `Authorization: Bearer <token>`，把调用方身份注入 request extensions

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{api::middleware::trace_id::TraceId, app_state::AppState, error::AppError};

/// 已认证的调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.as_str().to_string());
    let with_trace = |e: AppError| match &trace_id {
        Some(id) => e.with_trace_id(id.clone()),
        None => e,
    };

    // OPTIONS 请求直接放行
    if req.method() == axum::http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let Some(token) = bearer_token(&req) else {
        tracing::debug!(path = %req.uri().path(), "Missing bearer token");
        return Err(with_trace(AppError::unauthorized("Missing bearer token")));
    };

    let user_id = state.jwt.verify(token).map_err(|e| {
        tracing::warn!(error = %e, "JWT verification failed");
        with_trace(AppError::token_invalid("Invalid or expired token"))
    })?;

    req.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(req).await)
}

/// Axum Extractor: 从 request extensions 中提取认证身份
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
