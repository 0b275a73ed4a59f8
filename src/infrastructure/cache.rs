//! 扫描结果缓存
//!
//! 配置了 REDIS_URL 时使用 Redis（跨进程共享、重启后仍在），否则使用进程内 TTL map。
//! 两种后端对调用方行为一致：过期条目永远不会被返回，无法解码的值视为未命中。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::OnceCell;

use crate::{config::CacheConfig, metrics};

// 建连重试次数和退避基数；缓存读写不能长时间阻塞扫描
const REDIS_CONNECT_RETRIES: usize = 1;
const REDIS_RETRY_FACTOR_MS: u64 = 50;

/// Redis 封装：首次使用时建立 ConnectionManager，之后复用（断线自动重连）
#[derive(Clone)]
pub struct RedisCtx {
    pub client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
}

impl RedisCtx {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
        })
    }

    /// 连接失败不会被缓存，下次调用重新尝试
    async fn connection(&self) -> Result<ConnectionManager, redis::RedisError> {
        let conn = self
            .conn
            .get_or_try_init(|| {
                ConnectionManager::new_with_backoff(
                    self.client.clone(),
                    2,
                    REDIS_RETRY_FACTOR_MS,
                    REDIS_CONNECT_RETRIES,
                )
            })
            .await?;
        Ok(conn.clone())
    }

    pub async fn ping(&self) -> Result<String, redis::RedisError> {
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }

    /// SET key value EX ttl
    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), redis::RedisError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1) as usize)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }
}

/// 写入时条目数达到该值就清扫一次过期条目
const SWEEP_THRESHOLD: usize = 1024;

/// 进程内 TTL map：读取时惰性过期，写入时按阈值清扫
#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, (Instant, String)>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((expires_at, _)) if Instant::now() >= *expires_at => {
                entries.remove(key);
                None
            }
            Some((_, blob)) => Some(blob.clone()),
            None => None,
        }
    }

    fn set(&self, key: &str, blob: String, ttl: Duration) {
        let mut entries = self.lock();
        let now = Instant::now();
        if entries.len() >= SWEEP_THRESHOLD {
            let before = entries.len();
            entries.retain(|_, (expires_at, _)| *expires_at > now);
            tracing::debug!(removed = before - entries.len(), "swept expired cache entries");
        }
        entries.insert(key.to_string(), (now + ttl, blob));
    }
}

/// 扫描结果缓存
pub struct ScanCache {
    redis: Option<RedisCtx>,
    // Redis 不可用时的兜底存储
    memory: MemoryStore,
    ttl: Duration,
}

impl ScanCache {
    pub fn memory(ttl: Duration) -> Self {
        Self {
            redis: None,
            memory: MemoryStore::default(),
            ttl,
        }
    }

    pub fn with_redis(redis: RedisCtx, ttl: Duration) -> Self {
        Self {
            redis: Some(redis),
            memory: MemoryStore::default(),
            ttl,
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> anyhow::Result<Self> {
        let ttl = Duration::from_secs(cfg.ttl_secs);
        match &cfg.redis_url {
            Some(url) => Ok(Self::with_redis(RedisCtx::new(url)?, ttl)),
            None => Ok(Self::memory(ttl)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        if self.redis.is_some() {
            "redis"
        } else {
            "memory"
        }
    }

    pub fn redis(&self) -> Option<&RedisCtx> {
        self.redis.as_ref()
    }

    /// 读取缓存；过期、缺失或无法解码都返回 None
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut blob = None;
        if let Some(redis) = &self.redis {
            match redis.get(key).await {
                Ok(v) => blob = v,
                Err(e) => tracing::warn!(error = %e, "redis cache read failed"),
            }
        }
        if blob.is_none() {
            blob = self.memory.get(key);
        }

        let value = blob.and_then(|b| match serde_json::from_str::<T>(&b) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "discarding undecodable cache entry");
                None
            }
        });
        metrics::inc_cache(value.is_some());
        value
    }

    /// 写入缓存；Redis 写失败时退回进程内存储
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let blob = match serde_json::to_string(value) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize cache value");
                return;
            }
        };

        if let Some(redis) = &self.redis {
            match redis.set_ex(key, &blob, self.ttl).await {
                Ok(()) => return,
                Err(e) => tracing::warn!(error = %e, "redis cache write failed; using memory fallback"),
            }
        }
        self.memory.set(key, blob, self.ttl);
    }
}

/// 缓存键：`scan:{chain_short}:{network}:{kind}:{identifier}`，对比结果追加 `:cmp`
pub fn scan_cache_key(
    chain_short: &str,
    network: &str,
    kind: &str,
    identifier: &str,
    with_comparison: bool,
) -> String {
    let mut key = format!("scan:{}:{}:{}:{}", chain_short, network, kind, identifier);
    if with_comparison {
        key.push_str(":cmp");
    }
    key
}
