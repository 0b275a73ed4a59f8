//! 上游服务上下文
//!
//! 启动时构造一次：共享 HTTP 客户端、扫描缓存，以及每个数据源一组并发限制 + 熔断 + 重试。
//! 熔断器按数据源全局共享，一个任务的失败会影响其他任务对同一数据源的调用。

use std::sync::Arc;

use crate::{
    config::{Config, ProvidersConfig},
    infrastructure::{
        cache::ScanCache,
        provider_guard::{GuardSnapshot, ProviderGuard},
        upstream::UpstreamClient,
    },
};

pub const BLOCKCHAIR: &str = "blockchair";
pub const INFURA: &str = "infura";
pub const TATUM: &str = "tatum";
pub const ETHERSCAN: &str = "etherscan";

pub struct ServiceContext {
    pub providers: ProvidersConfig,
    pub http: UpstreamClient,
    pub cache: ScanCache,
    pub blockchair: Arc<ProviderGuard>,
    pub infura: Arc<ProviderGuard>,
    pub tatum: Arc<ProviderGuard>,
    pub etherscan: Arc<ProviderGuard>,
}

impl ServiceContext {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let cache = ScanCache::from_config(&config.cache)?;
        Self::with_cache(config, cache)
    }

    /// 使用外部提供的缓存（测试里用纯内存缓存）
    pub fn with_cache(config: &Config, cache: ScanCache) -> anyhow::Result<Self> {
        let p = &config.providers;
        let r = &config.resilience;
        let http = UpstreamClient::new(p.http_timeout(), p.http_connect_timeout())?;

        tracing::info!(
            cache_backend = cache.backend_name(),
            blockchair_key = p.blockchair_api_key.is_some(),
            ethereum_rpc = p.ethereum_rpc_endpoint().is_some(),
            tatum_key = p.tatum_api_key.is_some(),
            etherscan_key = p.etherscan_api_key.is_some(),
            "Service context initialized"
        );

        Ok(Self {
            http,
            cache,
            blockchair: Arc::new(ProviderGuard::from_config(
                BLOCKCHAIR,
                p.blockchair_max_concurrency,
                r,
            )),
            infura: Arc::new(ProviderGuard::from_config(INFURA, p.infura_max_concurrency, r)),
            tatum: Arc::new(ProviderGuard::from_config(TATUM, p.tatum_max_concurrency, r)),
            etherscan: Arc::new(ProviderGuard::from_config(
                ETHERSCAN,
                p.etherscan_max_concurrency,
                r,
            )),
            providers: p.clone(),
        })
    }

    pub fn guard_snapshots(&self) -> Vec<GuardSnapshot> {
        [&self.blockchair, &self.infura, &self.tatum, &self.etherscan]
            .iter()
            .map(|g| g.snapshot())
            .collect()
    }

    /// 是否配置了对比数据源
    pub fn comparison_available(&self) -> bool {
        self.providers.tatum_api_key.is_some()
    }
}
