//! 扫描任务编排
//!
//! 每个任务一个独立的 tokio 任务，编排器是该任务记录的唯一写者：
//! 持有本地副本，每个里程碑后整体写回存储。读者（状态查询、推送流）只读。
//!
//! 进入 running 之后依次：自动识别链 → 识别扩展公钥 → Ethereum/xpub 守卫 → 选择扫描器
//! → 扩展公钥标准化 → 自动开启对比数据源 → 扫描。任何失败都落到 error 终态。

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    domain::{
        extkey_normalizer::{self, ExtKeyError},
        provider_result::{ProviderResult, XpubNormalization},
        scan_job::{progress, ScanJob, ScanKind},
    },
    error::ErrorClass,
    infrastructure::upstream::ProviderError,
    metrics,
    repository::ScanJobRepository,
    service::{
        provider_context::ServiceContext,
        scanner::{ChainScanner, ScannerRegistry},
    },
    utils::{chain_normalizer, AddressValidator},
};

/// 任务级错误
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("Ethereum does not support xpub")]
    ExtendedKeyOnEthereum,
    #[error("Invalid/unsupported extended key: {0}")]
    ExtKey(#[from] ExtKeyError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ScanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScanError::UnsupportedChain(_)
            | ScanError::ExtendedKeyOnEthereum
            | ScanError::ExtKey(_) => ErrorClass::Input,
            ScanError::Provider(e) => e.class(),
        }
    }
}

/// 提交参数（已通过 API 层校验）
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub kind: ScanKind,
    pub input: String,
    pub chain: Option<String>,
    pub compare_providers: bool,
}

pub struct ScanOrchestrator {
    ctx: Arc<ServiceContext>,
    scanners: ScannerRegistry,
    repo: Arc<dyn ScanJobRepository>,
}

impl ScanOrchestrator {
    pub fn new(
        ctx: Arc<ServiceContext>,
        scanners: ScannerRegistry,
        repo: Arc<dyn ScanJobRepository>,
    ) -> Self {
        Self {
            ctx,
            scanners,
            repo,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ScanJobRepository> {
        &self.repo
    }

    /// 创建 pending 任务并在后台执行，立即返回
    pub async fn submit(self: &Arc<Self>, user_id: Uuid, req: ScanRequest) -> anyhow::Result<ScanJob> {
        let job = ScanJob::new(
            user_id,
            req.kind,
            req.input,
            req.chain,
            req.compare_providers,
        );
        self.repo.insert(job.clone()).await?;

        tracing::info!(
            job_id = %job.id,
            user_id = %user_id,
            kind = job.kind.as_str(),
            chain = job.chain.as_deref().unwrap_or("auto"),
            "Scan job submitted"
        );

        let this = Arc::clone(self);
        let pending = job.clone();
        tokio::spawn(async move { this.supervise(pending).await });

        Ok(job)
    }

    /// 监督执行任务：扫描任务 panic 时把记录落到 error 终态，不会停留在 running
    async fn supervise(self: Arc<Self>, job: ScanJob) {
        let id = job.id;
        let worker = Arc::clone(&self);
        let handle = tokio::spawn(async move { worker.run(job).await });
        if let Err(join_err) = handle.await {
            tracing::error!(job_id = %id, error = %join_err, "Scan job task aborted");
            self.fail_aborted(id, "Internal error: scan task aborted").await;
        }
    }

    /// 把未到终态的任务标记为失败
    async fn fail_aborted(&self, id: Uuid, reason: &str) {
        let mut job = match self.repo.get(id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to load aborted scan job");
                return;
            }
        };
        if job.status.is_terminal() {
            return;
        }
        job.push_log(format!("Error: {}", reason));
        if let Err(e) = job.fail(reason) {
            tracing::error!(job_id = %id, error = %e, "Scan job could not be failed");
            return;
        }
        metrics::inc_scan_failed();
        self.save(&job).await;
    }

    /// 执行任务直到终态，返回最终记录
    pub async fn run(&self, mut job: ScanJob) -> ScanJob {
        metrics::inc_scan_started();
        if let Err(e) = job.start() {
            tracing::error!(job_id = %job.id, error = %e, "Scan job could not be started");
            return job;
        }
        self.save(&job).await;

        match self.execute(&mut job).await {
            Ok(results) => {
                job.push_log("Aggregating results");
                job.advance(progress::AGGREGATING);
                self.save(&job).await;

                if let Err(e) = job.complete(results) {
                    tracing::error!(job_id = %job.id, error = %e, "Scan job could not be completed");
                }
                metrics::inc_scan_completed();
                tracing::info!(job_id = %job.id, chain = job.chain.as_deref().unwrap_or_default(), "Scan job completed");
            }
            Err(e) => {
                job.push_log(format!("Error: {}", e));
                if let Err(te) = job.fail(e.to_string()) {
                    tracing::error!(job_id = %job.id, error = %te, "Scan job could not be failed");
                }
                metrics::inc_scan_failed();
                tracing::warn!(
                    job_id = %job.id,
                    class = e.class().as_str(),
                    error = %e,
                    "Scan job failed"
                );
            }
        }

        self.save(&job).await;
        job
    }

    async fn execute(&self, job: &mut ScanJob) -> Result<ProviderResult, ScanError> {
        // 1. 自动识别链
        let chain = if chain_normalizer::is_auto(job.chain.as_deref()) {
            let inferred = if job.kind == ScanKind::Xpub {
                "bitcoin"
            } else if AddressValidator::looks_like_eth(&job.input) {
                "ethereum"
            } else {
                "bitcoin"
            };
            job.chain = Some(inferred.to_string());
            inferred.to_string()
        } else {
            job.chain.clone().unwrap_or_default()
        };
        job.push_log(format!("Chain resolved: {}", chain));
        job.advance(progress::CHAIN_RESOLVED);
        tracing::debug!(job_id = %job.id, chain = %chain, "Chain resolved");

        // 2. 选了 address 但输入是扩展公钥
        if job.kind == ScanKind::Address
            && extkey_normalizer::looks_like_mainnet_xpub_family(&job.input)
        {
            job.kind = ScanKind::Xpub;
            job.push_log("Detected extended key; switching to xpub scan");
        }
        self.save(job).await;

        // 3. Ethereum 不支持扩展公钥，不发起任何上游调用
        if job.kind == ScanKind::Xpub && chain_normalizer::is_ethereum(&chain) {
            return Err(ScanError::ExtendedKeyOnEthereum);
        }

        // 4. 扫描器
        let scanner = self
            .scanners
            .get(Some(&chain))
            .ok_or_else(|| ScanError::UnsupportedChain(chain.clone()))?;

        job.push_log("Fetching data from provider");
        job.advance(progress::FETCHING);
        self.save(job).await;

        let compare = self.resolve_compare(job, scanner.as_ref());

        match job.kind {
            ScanKind::Address => Ok(scanner.scan_address(&job.input, compare).await?),
            ScanKind::Xpub => {
                // 5. 拒绝测试网，ypub/zpub → xpub
                let normalized = extkey_normalizer::convert_to_xpub(&job.input)?;
                let mut results = scanner.scan_xpub(&normalized, compare).await?;
                if normalized != job.input {
                    results.record_normalization(XpubNormalization {
                        original: job.input.clone(),
                        original_prefix: extkey_normalizer::detect_prefix(&job.input).to_string(),
                        normalized_xpub: normalized,
                    });
                }
                Ok(results)
            }
        }
    }

    /// 6. 调用方未开启对比时，Bitcoin 扩展公钥扫描在配置了对比数据源时自动开启
    ///
    /// 关闭只能通过 `providers.auto_compare_xpub`。
    fn resolve_compare(&self, job: &mut ScanJob, scanner: &dyn ChainScanner) -> bool {
        if job.compare_providers {
            return true;
        }
        let eligible = scanner.chain() == "bitcoin"
            && job.kind == ScanKind::Xpub
            && self.ctx.providers.auto_compare_xpub
            && self.ctx.comparison_available();
        if eligible {
            job.compare_providers = true;
            job.push_log("Comparison provider enabled automatically");
        }
        eligible
    }

    async fn save(&self, job: &ScanJob) {
        if let Err(e) = self.repo.update(job).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to persist scan job");
        }
    }
}
