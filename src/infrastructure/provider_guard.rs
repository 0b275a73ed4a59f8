//! 上游调用保护：并发限制 + 熔断 + 重试
//!
//! 每次尝试先拿信号量许可，再经过熔断器；重试包在最外层，所以退避等待期间不占许可。

use std::{future::Future, sync::Arc, time::Instant};

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::{
    config::ResilienceConfig,
    infrastructure::{
        circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState},
        retry::{retry_if, RetryPolicy},
        upstream::ProviderError,
    },
    metrics,
};

pub struct ProviderGuard {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

/// 健康检查展示用
#[derive(Debug, Clone, Serialize)]
pub struct GuardSnapshot {
    pub provider: &'static str,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    pub available_permits: usize,
}

impl ProviderGuard {
    pub fn new(
        name: &'static str,
        max_concurrency: usize,
        breaker: CircuitBreakerConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            breaker: CircuitBreaker::new(name, breaker),
            retry,
        }
    }

    pub fn from_config(name: &'static str, max_concurrency: usize, cfg: &ResilienceConfig) -> Self {
        Self::new(
            name,
            max_concurrency,
            CircuitBreakerConfig {
                failure_threshold: cfg.circuit_fail_max,
                reset_timeout: std::time::Duration::from_secs(cfg.circuit_reset_timeout_secs),
            },
            RetryPolicy::from(cfg),
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            provider: self.name,
            circuit: self.breaker.get_state(),
            consecutive_failures: self.breaker.get_failure_count(),
            available_permits: self.semaphore.available_permits(),
        }
    }

    /// 执行受保护的上游调用；`op` 每次重试都会重新调用
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        retry_if(&self.retry, self.name, ProviderError::is_retryable, || {
            let fut = op();
            self.attempt(fut)
        })
        .await
    }

    async fn attempt<T, Fut>(&self, fut: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderError::Http {
                provider: self.name,
                message: "concurrency limiter closed".into(),
            })?;

        let started = Instant::now();
        match self.breaker.call(fut).await {
            Ok(v) => {
                metrics::observe_upstream(self.name, started.elapsed().as_millis(), true);
                Ok(v)
            }
            Err(BreakerError::Open) => {
                metrics::inc_breaker_rejection(self.name);
                tracing::warn!(provider = self.name, "call rejected by open circuit breaker");
                Err(ProviderError::BreakerOpen {
                    provider: self.name,
                })
            }
            Err(BreakerError::Inner(e)) => {
                metrics::observe_upstream(self.name, started.elapsed().as_millis(), false);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    fn guard(concurrency: usize, fail_max: u32, retries: u32) -> ProviderGuard {
        ProviderGuard::new(
            "test",
            concurrency,
            CircuitBreakerConfig {
                failure_threshold: fail_max,
                reset_timeout: Duration::from_secs(60),
            },
            RetryPolicy {
                retries,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        )
    }

    fn upstream_down() -> ProviderError {
        ProviderError::Status {
            provider: "test",
            status: 503,
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let g = guard(2, 10, 3);
        let calls = &AtomicU32::new(0);
        let result = g
            .call(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(upstream_down())
                } else {
                    Ok("ok")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_breaker_open_stops_retries() {
        let g = guard(2, 2, 5);
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = g
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(upstream_down())
            })
            .await;
        // 两次真实失败后熔断，第三次尝试被拒绝且不再重试
        assert!(matches!(result, Err(ProviderError::BreakerOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(g.snapshot().circuit, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let g = Arc::new(guard(2, 100, 0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let g = g.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                g.call(|| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), ProviderError>(())
                    }
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(g.snapshot().available_permits, 2);
    }

    #[tokio::test]
    async fn test_invalid_input_not_retried_and_counts_once() {
        let g = guard(1, 10, 3);
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = g
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::InvalidAddress)
            })
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidAddress)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
