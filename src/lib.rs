//! keyscan - 密钥派生与多数据源地址扫描服务
//!
//! 十六进制种子 → 扩展密钥与地址；地址 / 扩展公钥 → 跨数据源的余额与交易汇总。

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod error_body;
pub mod infrastructure;
pub mod metrics;
pub mod repository;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, AppErrorCode};

pub mod prelude {
    pub use crate::{
        app_state::AppState,
        domain::{snapshot_from_hex, DerivedSnapshot, ProviderResult, ScanJob, ScanKind, ScanStatus},
        error::{AppError, AppErrorCode},
        service::{ChainScanner, ScanOrchestrator, ScanRequest},
    };
}
