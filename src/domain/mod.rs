//! Domain 模块
//!
//! 编码原语、密钥派生、扩展密钥标准化与扫描任务模型。不依赖网络与运行时状态。

pub mod codec;
pub mod derivation;
pub mod extended_key;
pub mod extkey_normalizer;
pub mod provider_result;
pub mod scan_job;

// 重新导出常用类型
pub use codec::{CodecError, ExtKeyFamily};
pub use derivation::{snapshot_from_hex, DeriveError, DerivedSnapshot};
pub use extended_key::ExtendedKey;
pub use extkey_normalizer::{convert_to_xpub, ExtKeyError};
pub use provider_result::{ProviderResult, ResultSummary, XpubNormalization};
pub use scan_job::{ScanJob, ScanKind, ScanStatus};
