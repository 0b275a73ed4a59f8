pub mod provider_context;
pub mod scan_orchestrator;
pub mod scanner;

pub use provider_context::ServiceContext;
pub use scan_orchestrator::{ScanError, ScanOrchestrator, ScanRequest};
pub use scanner::{ChainScanner, ScannerRegistry};
