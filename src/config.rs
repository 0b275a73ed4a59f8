//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// JWT配置（仅校验，不签发）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

/// 上游数据源配置
///
/// API key 缺省为 None；未配置 key 的可选数据源（Tatum、Etherscan）直接跳过。
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub blockchair_api_key: Option<String>,
    pub infura_key: Option<String>,
    pub tatum_api_key: Option<String>,
    pub etherscan_api_key: Option<String>,

    pub blockchair_base_url: String,
    /// 完整 RPC 地址；为空时按 infura_key 拼接主网地址
    pub ethereum_rpc_url: Option<String>,
    pub tatum_base_url: String,
    pub etherscan_base_url: String,

    pub blockchair_max_concurrency: usize,
    pub infura_max_concurrency: usize,
    pub etherscan_max_concurrency: usize,
    pub tatum_max_concurrency: usize,

    /// Tatum 对比查询的地址上限
    pub tatum_max_lookups: usize,
    /// Blockchair xpub dashboard 的 limit 参数
    pub blockchair_xpub_limit: usize,
    /// BTC xpub 扫描在配置了 Tatum key 时自动开启对比
    pub auto_compare_xpub: bool,

    pub http_timeout_secs: u64,
    pub http_connect_timeout_secs: u64,
}

/// 熔断 / 重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_fail_max: u32,
    pub circuit_reset_timeout_secs: u64,
    pub retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

/// 扫描结果缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 设置后使用 Redis，否则使用进程内缓存
    pub redis_url: Option<String>,
    pub ttl_secs: u64,
}

/// 未配置 JWT_SECRET 时的开发用密钥
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-please-change-in-production-min-32-chars";

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8088".into()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            // 警告在 main.rs 中根据实际使用的密钥输出
            secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            blockchair_api_key: env_opt("BLOCKCHAIR_API_KEY"),
            infura_key: env_opt("INFURA_KEY"),
            tatum_api_key: env_opt("TATUM_API_KEY"),
            etherscan_api_key: env_opt("ETHERSCAN_API_KEY"),

            blockchair_base_url: std::env::var("BLOCKCHAIR_BASE_URL")
                .unwrap_or_else(|_| "https://api.blockchair.com".into()),
            ethereum_rpc_url: env_opt("ETHEREUM_RPC_URL"),
            tatum_base_url: std::env::var("TATUM_BASE_URL")
                .unwrap_or_else(|_| "https://api.tatum.io".into()),
            etherscan_base_url: std::env::var("ETHERSCAN_BASE_URL")
                .unwrap_or_else(|_| "https://api.etherscan.io".into()),

            blockchair_max_concurrency: env_parse("BLOCKCHAIR_MAX_CONCURRENCY", 8),
            infura_max_concurrency: env_parse("INFURA_MAX_CONCURRENCY", 8),
            etherscan_max_concurrency: env_parse("ETHERSCAN_MAX_CONCURRENCY", 4),
            tatum_max_concurrency: env_parse("TATUM_MAX_CONCURRENCY", 10),

            tatum_max_lookups: env_parse("TATUM_MAX_LOOKUPS", 20),
            blockchair_xpub_limit: env_parse("BLOCKCHAIR_XPUB_LIMIT", 250),
            auto_compare_xpub: std::env::var("AUTO_COMPARE_XPUB")
                .map(|v| v != "0")
                .unwrap_or(true),

            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 20),
            http_connect_timeout_secs: env_parse("HTTP_CONNECT_TIMEOUT_SECS", 10),
        }
    }
}

// API key 不能出现在日志里
impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ProvidersConfig")
            .field("blockchair_api_key", &mask(&self.blockchair_api_key))
            .field("infura_key", &mask(&self.infura_key))
            .field("tatum_api_key", &mask(&self.tatum_api_key))
            .field("etherscan_api_key", &mask(&self.etherscan_api_key))
            .field("blockchair_base_url", &self.blockchair_base_url)
            .field("tatum_base_url", &self.tatum_base_url)
            .field("etherscan_base_url", &self.etherscan_base_url)
            .field("tatum_max_lookups", &self.tatum_max_lookups)
            .field("auto_compare_xpub", &self.auto_compare_xpub)
            .finish_non_exhaustive()
    }
}

impl ProvidersConfig {
    /// Ethereum JSON-RPC 地址：显式配置优先，否则使用 Infura 主网
    pub fn ethereum_rpc_endpoint(&self) -> Option<String> {
        if let Some(url) = &self.ethereum_rpc_url {
            return Some(url.clone());
        }
        self.infura_key
            .as_ref()
            .map(|key| format!("https://mainnet.infura.io/v3/{}", key))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn http_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http_connect_timeout_secs)
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_fail_max: env_parse("CIRCUIT_FAIL_MAX", 5),
            circuit_reset_timeout_secs: env_parse("CIRCUIT_RESET_TIMEOUT", 60),
            retries: env_parse("RETRY_ATTEMPTS", 3),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", 500),
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", 5000),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: env_opt("REDIS_URL"),
            ttl_secs: env_parse("CACHE_TTL", 300),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            jwt: JwtConfig::default(),
            providers: ProvidersConfig::default(),
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    /// 从配置文件加载配置（缺失的段落使用环境变量默认值）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        let p = &self.providers;
        for (name, n) in [
            ("blockchair", p.blockchair_max_concurrency),
            ("infura", p.infura_max_concurrency),
            ("etherscan", p.etherscan_max_concurrency),
            ("tatum", p.tatum_max_concurrency),
        ] {
            if n == 0 {
                anyhow::bail!("{} max concurrency must be at least 1", name);
            }
        }

        if self.resilience.circuit_fail_max == 0 {
            anyhow::bail!("CIRCUIT_FAIL_MAX must be at least 1");
        }
        if self.resilience.retry_base_delay_ms > self.resilience.retry_max_delay_ms {
            anyhow::bail!("RETRY_BASE_DELAY_MS must not exceed RETRY_MAX_DELAY_MS");
        }

        if let Some(url) = &self.cache.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                anyhow::bail!("REDIS_URL must start with redis:// or rediss://");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.jwt.secret = "test_secret_that_is_at_least_32_characters_long".into();
        config.logging.level = "info".into();
        config.logging.format = "text".into();
        config
    }

    #[test]
    fn test_config_defaults() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert!(config.providers.tatum_max_lookups > 0);
        assert!(config.providers.blockchair_max_concurrency > 0);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_addr = "0.0.0.0:9090"

[logging]
level = "debug"
format = "json"

[jwt]
secret = "test_secret_that_is_at_least_32_characters_long"

[providers]
blockchair_base_url = "http://127.0.0.1:1"
tatum_max_lookups = 5
auto_compare_xpub = false

[resilience]
circuit_fail_max = 2
retries = 0

[cache]
ttl_secs = 10
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9090");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.providers.blockchair_base_url, "http://127.0.0.1:1");
        assert_eq!(config.providers.tatum_max_lookups, 5);
        assert!(!config.providers.auto_compare_xpub);
        assert_eq!(config.resilience.circuit_fail_max, 2);
        assert_eq!(config.resilience.retries, 0);
        assert_eq!(config.cache.ttl_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = test_config();
        config.jwt.secret = "short".into();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.providers.tatum_max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.cache.redis_url = Some("http://localhost".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rpc_endpoint_resolution() {
        let mut providers = test_config().providers;
        providers.ethereum_rpc_url = None;
        providers.infura_key = Some("abc".into());
        assert_eq!(
            providers.ethereum_rpc_endpoint().as_deref(),
            Some("https://mainnet.infura.io/v3/abc")
        );

        providers.ethereum_rpc_url = Some("http://127.0.0.1:8545".into());
        assert_eq!(
            providers.ethereum_rpc_endpoint().as_deref(),
            Some("http://127.0.0.1:8545")
        );
    }

    #[test]
    fn test_debug_masks_keys() {
        let mut providers = test_config().providers;
        providers.tatum_api_key = Some("super-secret-key".into());
        let rendered = format!("{:?}", providers);
        assert!(!rendered.contains("super-secret-key"));
        assert!(rendered.contains("<set>"));
    }
}
