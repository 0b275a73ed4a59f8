use std::sync::Arc;

use crate::{
    config::Config,
    infrastructure::jwt::JwtVerifier,
    repository::{InMemoryScanJobRepository, ScanJobRepository},
    service::{ScanOrchestrator, ScannerRegistry, ServiceContext},
};

/// 应用状态
/// 包含所有共享资源
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Arc<ServiceContext>,
    pub jobs: Arc<dyn ScanJobRepository>,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub jwt: JwtVerifier,
}

impl AppState {
    /// 创建新的应用状态（任务存储默认使用内存实现）
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let services = Arc::new(ServiceContext::from_config(&config)?);
        Ok(Self::with_parts(
            config,
            services,
            Arc::new(InMemoryScanJobRepository::new()),
        ))
    }

    /// 由已构造的组件组装（测试里替换缓存、任务存储）
    pub fn with_parts(
        config: Arc<Config>,
        services: Arc<ServiceContext>,
        jobs: Arc<dyn ScanJobRepository>,
    ) -> Self {
        let scanners = ScannerRegistry::new(services.clone());
        let orchestrator = Arc::new(ScanOrchestrator::new(
            services.clone(),
            scanners,
            jobs.clone(),
        ));
        let jwt = JwtVerifier::new(&config.jwt.secret);

        Self {
            config,
            services,
            jobs,
            orchestrator,
            jwt,
        }
    }
}
