//! 链扫描器
//!
//! 每条链一个 `ChainScanner` 实现，启动时注册到 `ScannerRegistry`，按链名称（含别名）查找。

pub mod bitcoin;
pub mod ethereum;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

pub use self::{bitcoin::BitcoinScanner, ethereum::EthereumScanner};
use crate::{
    domain::provider_result::ProviderResult,
    infrastructure::upstream::ProviderError,
    service::provider_context::ServiceContext,
    utils::chain_normalizer,
};

#[async_trait]
pub trait ChainScanner: Send + Sync {
    /// 规范链名称
    fn chain(&self) -> &'static str;

    async fn scan_address(
        &self,
        address: &str,
        compare_providers: bool,
    ) -> Result<ProviderResult, ProviderError>;

    async fn scan_xpub(
        &self,
        xpub: &str,
        compare_providers: bool,
    ) -> Result<ProviderResult, ProviderError>;
}

/// 链名称 → 扫描器
#[derive(Clone, Default)]
pub struct ScannerRegistry {
    scanners: HashMap<&'static str, Arc<dyn ChainScanner>>,
}

impl ScannerRegistry {
    /// 注册所有内置链
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(BitcoinScanner::new(ctx.clone())));
        registry.register(Arc::new(EthereumScanner::new(ctx)));
        registry
    }

    pub fn register(&mut self, scanner: Arc<dyn ChainScanner>) {
        self.scanners.insert(scanner.chain(), scanner);
    }

    /// 未指定、"auto" 或未知链都返回 None
    pub fn get(&self, chain: Option<&str>) -> Option<Arc<dyn ChainScanner>> {
        let chain = chain?;
        if chain_normalizer::is_auto(Some(chain)) {
            return None;
        }
        let canonical = chain_normalizer::normalize_chain_identifier(chain)?;
        self.scanners.get(canonical).cloned()
    }
}
