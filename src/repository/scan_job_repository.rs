// 扫描任务数据访问 Repository

use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::scan_job::ScanJob;

/// 列表接口最多返回的条数
pub const LIST_LIMIT: usize = 100;

// ============ Repository Trait ============

/// 任务持久化接口
///
/// 每个任务只有编排器一个写者：它持有任务副本，修改后整体 `update` 回来。
#[async_trait]
pub trait ScanJobRepository: Send + Sync {
    /// 新建任务
    async fn insert(&self, job: ScanJob) -> Result<()>;

    /// 根据 ID 查询（不校验归属，推送流使用）
    async fn get(&self, id: Uuid) -> Result<Option<ScanJob>>;

    /// 根据 ID 和归属用户查询
    async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<ScanJob>>;

    /// 用户的任务，按创建时间倒序，最多 `limit` 条
    async fn list_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<ScanJob>>;

    /// 覆盖写入已存在的任务
    async fn update(&self, job: &ScanJob) -> Result<()>;
}

// ============ 内存实现 ============

#[derive(Default, Clone)]
pub struct InMemoryScanJobRepository {
    jobs: Arc<RwLock<HashMap<Uuid, ScanJob>>>,
}

impl InMemoryScanJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanJobRepository for InMemoryScanJobRepository {
    async fn insert(&self, job: ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(anyhow!("Scan job {} already exists", job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScanJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<ScanJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .get(&id)
            .filter(|j| j.user_id == user_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<ScanJob>> {
        let jobs = self.jobs.read().await;
        let mut items: Vec<ScanJob> = jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn update(&self, job: &ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(anyhow!("Scan job {} not found", job.id)),
        }
    }
}
