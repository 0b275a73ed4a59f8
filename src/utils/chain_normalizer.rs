//! 链标识符标准化模块
//!
//! 统一处理请求里的链名称与别名（大小写不敏感），扫描器注册表和编排器都依赖这里的规范名称。

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// 链标识符配置
#[derive(Debug, Clone)]
pub struct ChainIdentifier {
    /// 规范名称（小写，用于内部处理）
    pub canonical_name: &'static str,
    /// 缓存键中使用的简写
    pub short_name: &'static str,
    /// 符号（大写），同时作为结果的单位
    pub symbol: &'static str,
    /// 别名列表（小写）
    pub aliases: &'static [&'static str],
}

/// 自动识别链的占位值
pub const AUTO: &str = "auto";

pub const BITCOIN: ChainIdentifier = ChainIdentifier {
    canonical_name: "bitcoin",
    short_name: "btc",
    symbol: "BTC",
    aliases: &["btc"],
};

pub const ETHEREUM: ChainIdentifier = ChainIdentifier {
    canonical_name: "ethereum",
    short_name: "eth",
    symbol: "ETH",
    aliases: &["eth"],
};

/// 链标识符注册表（静态初始化，键为小写）
static CHAIN_REGISTRY: Lazy<HashMap<&'static str, ChainIdentifier>> = Lazy::new(|| {
    let chains = [BITCOIN, ETHEREUM];

    let mut registry = HashMap::new();
    for chain in chains {
        // 注册所有别名
        for alias in chain.aliases {
            registry.insert(*alias, chain.clone());
        }
        registry.insert(chain.canonical_name, chain);
    }
    registry
});

/// 标准化链标识符
///
/// ```rust
/// # use keyscan::utils::chain_normalizer::normalize_chain_identifier;
/// assert_eq!(normalize_chain_identifier("BTC"), Some("bitcoin"));
/// assert_eq!(normalize_chain_identifier(" Ethereum "), Some("ethereum"));
/// assert_eq!(normalize_chain_identifier("auto"), None);
/// ```
pub fn normalize_chain_identifier(input: &str) -> Option<&'static str> {
    get_chain_config(input).map(|c| c.canonical_name)
}

/// 获取链配置
pub fn get_chain_config(input: &str) -> Option<&'static ChainIdentifier> {
    let key = input.trim().to_ascii_lowercase();
    CHAIN_REGISTRY.get(key.as_str())
}

/// 未指定或显式 "auto" 时需要自动识别
pub fn is_auto(chain: Option<&str>) -> bool {
    match chain.map(str::trim) {
        None => true,
        Some(c) => c.is_empty() || c.eq_ignore_ascii_case(AUTO),
    }
}

pub fn is_ethereum(chain: &str) -> bool {
    normalize_chain_identifier(chain) == Some(ETHEREUM.canonical_name)
}
