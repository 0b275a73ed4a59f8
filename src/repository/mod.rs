// Repository 抽象层
pub mod scan_job_repository;

pub use scan_job_repository::{InMemoryScanJobRepository, ScanJobRepository};
