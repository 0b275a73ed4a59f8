//! 指数退避重试
//!
//! 第 n 次失败后等待 `min(max_delay, base_delay * 2^n)`，再乘以 0.7–1.3 的随机抖动。
//! 总尝试次数 = retries + 1，耗尽后返回最后一次的错误。

use std::{future::Future, time::Duration};

use rand::Rng;

use crate::config::ResilienceConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(cfg: &ResilienceConfig) -> Self {
        Self {
            retries: cfg.retries,
            base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// 不加抖动的退避上限
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// 加抖动后的实际等待时间
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.7..=1.3);
        self.backoff(attempt).mul_f64(jitter)
    }

    /// 累计等待时间上限（所有重试都按 1.3 倍抖动）
    pub fn max_total_delay(&self) -> Duration {
        (0..self.retries)
            .map(|a| self.backoff(a).mul_f64(1.3))
            .sum()
    }
}

/// 只对 `should_retry` 返回 true 的错误重试，其余错误立即返回
pub async fn retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    op: &str,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= policy.retries || !should_retry(&e) {
                    return Err(e);
                }
                let delay = policy.jittered_delay(attempt);
                tracing::debug!(
                    op,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
