//! 扫描任务模型与状态机
//!
//! ```text
//! Pending -> Running   ✅
//! Running -> Completed ✅
//! Running -> Error     ✅
//! Pending -> Error     ✅ (启动前即失败)
//! ```
//! 终态之后任务不可再修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::provider_result::ProviderResult;

/// 进度里程碑（粗粒度，不代表精确完成度）
pub mod progress {
    pub const STARTED: u8 = 5;
    pub const CHAIN_RESOLVED: u8 = 15;
    pub const FETCHING: u8 = 40;
    pub const AGGREGATING: u8 = 80;
    pub const DONE: u8 = 100;
}

/// 状态查询返回的日志条数
pub const STATUS_LOG_TAIL: usize = 10;
/// 推送流每次携带的日志条数
pub const STREAM_LOG_TAIL: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Error => "error",
        }
    }

    /// 判断是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Error)
    }

    pub fn can_transition_to(&self, target: ScanStatus) -> bool {
        use ScanStatus::*;
        matches!(
            (self, target),
            (Pending, Running) | (Pending, Error) | (Running, Completed) | (Running, Error)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Address,
    Xpub,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Address => "address",
            ScanKind::Xpub => "xpub",
        }
    }

    /// 缓存键中使用的简写
    pub fn cache_segment(&self) -> &'static str {
        match self {
            ScanKind::Address => "addr",
            ScanKind::Xpub => "xpub",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanJobError {
    #[error("Invalid scan state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("Scan job is already terminal")]
    Terminal,
}

/// 扫描任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: ScanStatus,
    pub progress: u8,
    pub logs: Vec<String>,
    pub kind: ScanKind,
    pub chain: Option<String>,
    pub input: String,
    pub compare_providers: bool,
    pub results: Option<ProviderResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanJob {
    pub fn new(
        user_id: Uuid,
        kind: ScanKind,
        input: impl Into<String>,
        chain: Option<String>,
        compare_providers: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: ScanStatus::Pending,
            progress: 0,
            logs: Vec::new(),
            kind,
            chain,
            input: input.into(),
            compare_providers,
            results: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn ensure_mutable(&self) -> Result<(), ScanJobError> {
        if self.status.is_terminal() {
            return Err(ScanJobError::Terminal);
        }
        Ok(())
    }

    fn transition(&mut self, to: ScanStatus) -> Result<(), ScanJobError> {
        self.ensure_mutable()?;
        if !self.status.can_transition_to(to) {
            return Err(ScanJobError::InvalidTransition {
                from: self.status.as_str(),
                to: to.as_str(),
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), ScanJobError> {
        self.transition(ScanStatus::Running)?;
        self.started_at = Some(Utc::now());
        self.advance(progress::STARTED);
        Ok(())
    }

    pub fn complete(&mut self, results: ProviderResult) -> Result<(), ScanJobError> {
        self.transition(ScanStatus::Completed)?;
        self.results = Some(results);
        self.finish();
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ScanJobError> {
        self.transition(ScanStatus::Error)?;
        self.error = Some(error.into());
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        self.progress = progress::DONE;
        self.completed_at = Some(Utc::now());
    }

    /// 进度只增不减
    pub fn advance(&mut self, to: u8) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = self.progress.max(to.min(progress::DONE));
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.logs.push(line.into());
    }

    /// 最近 n 条日志
    pub fn tail_logs(&self, n: usize) -> Vec<String> {
        let start = self.logs.len().saturating_sub(n);
        self.logs[start..].to_vec()
    }

    pub fn status_view(&self, log_tail: usize) -> ScanStatusView {
        ScanStatusView {
            id: self.id,
            status: self.status,
            progress: self.progress,
            logs: self.tail_logs(log_tail),
        }
    }

    pub fn list_item(&self) -> ScanListItem {
        ScanListItem {
            id: self.id,
            status: self.status,
            progress: self.progress,
            kind: self.kind,
            input: self.input.clone(),
            chain: self.chain.clone(),
            created_at: self.created_at,
        }
    }
}

/// 状态查询 / 推送流的载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScanStatusView {
    pub id: Uuid,
    pub status: ScanStatus,
    pub progress: u8,
    pub logs: Vec<String>,
}

/// 列表项（只含摘要字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScanListItem {
    pub id: Uuid,
    pub status: ScanStatus,
    pub progress: u8,
    pub kind: ScanKind,
    pub input: String,
    pub chain: Option<String>,
    pub created_at: DateTime<Utc>,
}
