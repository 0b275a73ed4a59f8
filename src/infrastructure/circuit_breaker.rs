//! 熔断器实现
//! 每个上游数据源一个实例，所有扫描任务共享同一失败预算

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// 正常状态：所有请求通过
    Closed,
    /// 熔断状态：快速失败
    Open,
    /// 半开状态：放行请求试探恢复
    HalfOpen,
}

/// 熔断器配置
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// 连续失败多少次触发熔断
    pub failure_threshold: u32,
    /// 熔断后多久进入半开
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// 受保护调用的失败原因
#[derive(Debug, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// 熔断打开，未发起调用
    Open,
    /// 调用本身失败
    Inner(E),
}

/// 熔断器
#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<CircuitBreakerState>>,
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    // 避免因锁污染导致 panic
    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 执行受保护的操作
    ///
    /// 熔断打开时 `fut` 不会被 poll，直接返回 `BreakerError::Open`。
    pub async fn call<F, T, E>(&self, fut: F) -> Result<T, BreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(BreakerError::Open);
        }

        match fut.await {
            Ok(result) => {
                self.on_success();
                Ok(result)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// 检查是否允许通过；超时后 Open → HalfOpen
    fn allow_request(&self) -> bool {
        let mut state = self.lock();
        if state.state != CircuitState::Open {
            return true;
        }

        let elapsed = state
            .opened_at
            .map(|t| t.elapsed() >= self.config.reset_timeout)
            .unwrap_or(true);
        if elapsed {
            state.state = CircuitState::HalfOpen;
            tracing::info!(provider = self.name, "Circuit breaker transitioning to HalfOpen state");
            true
        } else {
            false
        }
    }

    fn on_success(&self) {
        let mut state = self.lock();
        if state.state == CircuitState::HalfOpen {
            tracing::info!(provider = self.name, "Circuit breaker recovered to Closed state");
        }
        state.state = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        match state.state {
            CircuitState::HalfOpen => {
                // 半开状态失败，立即重新熔断
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                tracing::warn!(
                    provider = self.name,
                    "Circuit breaker re-opened due to failure in HalfOpen state"
                );
            }
            CircuitState::Closed if state.consecutive_failures >= self.config.failure_threshold => {
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                tracing::warn!(
                    provider = self.name,
                    failures = state.consecutive_failures,
                    "Circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    /// 获取当前状态（不触发 Open → HalfOpen 转换）
    pub fn get_state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn get_failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_millis(reset_ms),
            },
        )
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_threshold() {
        let cb = breaker(3, 10_000);

        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.get_state(), CircuitState::Closed);

        let _ = cb.call(async { Err::<(), _>("error") }).await;
        assert_eq!(cb.get_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_breaker_fails_fast_without_polling() {
        let cb = breaker(1, 10_000);
        let _ = cb.call(async { Err::<(), _>("error") }).await;

        let attempts = AtomicU32::new(0);
        let result = cb
            .call(async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<(), &str>(())
            })
            .await;
        assert_eq!(result, Err(BreakerError::Open));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let cb = breaker(3, 10_000);
        let _ = cb.call(async { Err::<(), _>("error") }).await;
        let _ = cb.call(async { Err::<(), _>("error") }).await;
        let _ = cb.call(async { Ok::<(), &str>(()) }).await;
        let _ = cb.call(async { Err::<(), _>("error") }).await;
        assert_eq!(cb.get_state(), CircuitState::Closed);
        assert_eq!(cb.get_failure_count(), 1);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let cb = breaker(2, 10);
        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>("error") }).await;
        }
        assert_eq!(cb.get_state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        // 半开状态一次成功即恢复
        let result = cb.call(async { Ok::<u8, &str>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(cb.get_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(2, 10);
        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>("error") }).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = cb.call(async { Err::<(), _>("still down") }).await;
        assert_eq!(result, Err(BreakerError::Inner("still down")));
        assert_eq!(cb.get_state(), CircuitState::Open);

        // 重新计时，立即调用仍被拒绝
        let result = cb.call(async { Ok::<(), &str>(()) }).await;
        assert_eq!(result, Err(BreakerError::Open));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let cb = breaker(1, 10_000);
        let other = cb.clone();
        let _ = cb.call(async { Err::<(), _>("error") }).await;
        assert_eq!(other.get_state(), CircuitState::Open);
    }
}
