//! 健康检查模块
//! 缓存后端连通性 + 各上游数据源的熔断状态

use serde::Serialize;
use utoipa::ToSchema;

use crate::infrastructure::{
    cache::ScanCache,
    circuit_breaker::CircuitState,
    provider_guard::GuardSnapshot,
};

/// 健康检查结果
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthCheckResult {
    pub status: String, // "healthy" | "degraded"
    pub cache: ComponentStatus,
    #[schema(value_type = Vec<Object>)]
    pub providers: Vec<GuardSnapshot>,
    pub timestamp: String,
}

/// 组件状态
#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentStatus {
    pub backend: String,
    pub status: String, // "ok" | "error"
    pub message: String,
    pub latency_ms: Option<u64>,
}

/// 执行完整健康检查
pub async fn check_health(cache: &ScanCache, providers: Vec<GuardSnapshot>) -> HealthCheckResult {
    let cache_status = check_cache(cache).await;

    let any_open = providers.iter().any(|p| p.circuit == CircuitState::Open);
    let status = if cache_status.status == "ok" && !any_open {
        "healthy"
    } else {
        // 缓存有进程内兜底，熔断只影响单个数据源，服务仍可用
        "degraded"
    };

    HealthCheckResult {
        status: status.to_string(),
        cache: cache_status,
        providers,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// 检查缓存后端
async fn check_cache(cache: &ScanCache) -> ComponentStatus {
    let Some(redis) = cache.redis() else {
        return ComponentStatus {
            backend: "memory".to_string(),
            status: "ok".to_string(),
            message: "In-process cache".to_string(),
            latency_ms: Some(0),
        };
    };

    let start = std::time::Instant::now();
    match redis.ping().await {
        Ok(_) => ComponentStatus {
            backend: "redis".to_string(),
            status: "ok".to_string(),
            message: "Redis connection healthy".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => ComponentStatus {
            backend: "redis".to_string(),
            status: "error".to_string(),
            message: format!("Redis error: {}", e),
            latency_ms: None,
        },
    }
}
