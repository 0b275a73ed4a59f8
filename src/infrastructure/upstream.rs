//! 上游数据源 HTTP 客户端
//!
//! 进程内共享一个 reqwest::Client（连接池、超时统一配置）。
//! 每次调用返回类型化的 `ProviderError`，由调用方按变体处理而不是匹配错误字符串。

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Serialize;
use thiserror::Error;

use crate::error::ErrorClass;

/// 单次上游调用的错误
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Http {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("{provider} circuit breaker is open")]
    BreakerOpen { provider: &'static str },
    #[error("{provider} returned an unexpected response shape: {detail}")]
    UpstreamShape {
        provider: &'static str,
        detail: String,
    },
    #[error("Invalid Ethereum address format")]
    InvalidAddress,
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::InvalidAddress => ErrorClass::Input,
            ProviderError::NotConfigured(_) => ErrorClass::Internal,
            _ => ErrorClass::Upstream,
        }
    }

    /// 熔断打开、输入错误和缺少配置都不值得重试
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::BreakerOpen { .. }
                | ProviderError::InvalidAddress
                | ProviderError::NotConfigured(_)
        )
    }
}

/// 上游 HTTP 客户端
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("keyscan/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// GET 并解析 JSON
    pub async fn get_json(
        &self,
        provider: &'static str,
        url: &str,
        query: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<serde_json::Value, ProviderError> {
        let req = self.http.get(url).query(query).headers(headers);
        self.send(provider, url, req).await
    }

    /// POST JSON 并解析 JSON
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        provider: &'static str,
        url: &str,
        body: &B,
    ) -> Result<serde_json::Value, ProviderError> {
        let req = self.http.post(url).json(body);
        self.send(provider, url, req).await
    }

    async fn send(
        &self,
        provider: &'static str,
        url: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ProviderError> {
        // 只记录路径，查询串里可能带 API key
        let path = loggable_path(url);
        tracing::debug!(provider, path = %path, "upstream request");

        let resp = req.send().await.map_err(|e| ProviderError::Http {
            provider,
            message: e.without_url().to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(provider, path = %path, status = status.as_u16(), "upstream returned error status");
            return Err(ProviderError::Status {
                provider,
                status: status.as_u16(),
            });
        }

        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| ProviderError::Decode {
                provider,
                message: e.without_url().to_string(),
            })
    }
}

/// 去掉查询串；Infura 把 key 放在路径末段，也一并隐藏
fn loggable_path(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(u) => {
            let host = u.host_str().unwrap_or_default().to_string();
            let path = u.path();
            if path.starts_with("/v3/") {
                format!("{}/v3/<redacted>", host)
            } else {
                format!("{}{}", host, path)
            }
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
