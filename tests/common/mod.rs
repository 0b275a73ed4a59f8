//! 测试辅助模块
//! 本地假上游（JSON-RPC / Etherscan / Blockchair / Tatum）、令牌签发和应用状态构造

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use keyscan::{
    app_state::AppState,
    config::Config,
    domain::scan_job::ScanJob,
    infrastructure::{cache::ScanCache, jwt::Claims},
    repository::{InMemoryScanJobRepository, ScanJobRepository},
    service::ServiceContext,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub const TEST_SECRET: &str = "test_secret_that_is_at_least_32_characters_long";

/// 种子 0x01 的主扩展公钥及其 ypub / zpub 形式
pub const XPUB: &str = "xpub661MyMwAqRbcEYS8w7XLSVeEsBXy79zSzH1J8vCdxAZningWLdN3zgtU6QzvJsNBNF5QPBBBg1yVF2LKrcfGdJq86PeLWDMUCYatZPzQu8R";
pub const YPUB: &str = "ypub6QqdH2c5z7965qdFmUJxeajk39gR3mywuPXWvK6XLAwfmtVjbHXcckYc7cxWJn26mtCD8emk8gL38JwtaK5HRYWixjLm68AxUGeXwvkxrFF";
pub const ZPUB: &str = "zpub6jftahH18ngZw8pNbq6arfqFD7przPySpW3jhhzQiBKYpzJxqwhBEpCk8pv6Jgg2BXK1t8NJbLgb1bZTJ1VJDnCKq53Bg2zSjziBLZ7HLSy";
pub const BTC_ADDR: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
pub const BTC_CHANGE_ADDR: &str = "1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP";
pub const ETH_ADDR: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 假上游
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 各数据源收到的请求数
#[derive(Default)]
pub struct UpstreamHits {
    pub rpc: AtomicU32,
    pub rpc_down: AtomicU32,
    pub rpc_error: AtomicU32,
    pub etherscan: AtomicU32,
    pub blockchair: AtomicU32,
    pub tatum: AtomicU32,
    pub tatum_down: AtomicU32,
    pub etherscan_down: AtomicU32,
    /// 最近一次 xpub 仪表盘请求里的扩展公钥
    pub last_xpub: Mutex<Option<String>>,
}

impl UpstreamHits {
    pub fn total(&self) -> u32 {
        self.rpc.load(Ordering::SeqCst)
            + self.rpc_down.load(Ordering::SeqCst)
            + self.rpc_error.load(Ordering::SeqCst)
            + self.etherscan.load(Ordering::SeqCst)
            + self.blockchair.load(Ordering::SeqCst)
            + self.tatum.load(Ordering::SeqCst)
            + self.tatum_down.load(Ordering::SeqCst)
            + self.etherscan_down.load(Ordering::SeqCst)
    }

    pub fn last_xpub(&self) -> Option<String> {
        self.last_xpub.lock().ok().and_then(|g| g.clone())
    }
}

pub struct FakeUpstream {
    pub base_url: String,
    pub hits: Arc<UpstreamHits>,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let hits = Arc::new(UpstreamHits::default());
        let app = Router::new()
            .route("/rpc", post(rpc))
            .route("/rpc-down", post(rpc_down))
            .route("/rpc-error", post(rpc_error))
            .route("/api", get(etherscan))
            .route("/bitcoin/dashboards/:kind/:id", get(blockchair))
            .route("/v3/bitcoin/address/balance/:address", get(tatum))
            .route(
                "/tatum-down/v3/bitcoin/address/balance/:address",
                get(tatum_down),
            )
            .route("/etherscan-down/api", get(etherscan_down))
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
        }
    }
}

async fn rpc(State(hits): State<Arc<UpstreamHits>>, Json(body): Json<Value>) -> Json<Value> {
    hits.rpc.fetch_add(1, Ordering::SeqCst);
    let result = match body["method"].as_str() {
        // 1 ETH
        Some("eth_getBalance") => "0xde0b6b3a7640000",
        Some("eth_getTransactionCount") => "0x2",
        _ => "0x0",
    };
    Json(json!({ "jsonrpc": "2.0", "id": body["id"], "result": result }))
}

async fn rpc_down(State(hits): State<Arc<UpstreamHits>>) -> StatusCode {
    hits.rpc_down.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

/// HTTP 200，但带 JSON-RPC error 对象（限流）
async fn rpc_error(State(hits): State<Arc<UpstreamHits>>, Json(body): Json<Value>) -> Json<Value> {
    hits.rpc_error.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "jsonrpc": "2.0",
        "id": body["id"],
        "error": { "code": -32005, "message": "daily request count exceeded" }
    }))
}

/// 两笔交易：2024-01 收入 2 ETH，2024-02 转出 0.5 ETH（gas 21000 × 1 gwei）
async fn etherscan(
    State(hits): State<Arc<UpstreamHits>>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    hits.etherscan.fetch_add(1, Ordering::SeqCst);
    let me = q.get("address").cloned().unwrap_or_default().to_lowercase();
    let other = format!("0x{}", "11".repeat(20));
    Json(json!({
        "status": "1",
        "message": "OK",
        "result": [
            {
                "timeStamp": "1704067200", "from": other, "to": me,
                "value": "2000000000000000000", "gasUsed": "21000",
                "gasPrice": "1000000000", "isError": "0"
            },
            {
                "timeStamp": "1706745600", "from": me, "to": other,
                "value": "500000000000000000", "gasUsed": "21000",
                "gasPrice": "1000000000", "isError": "0"
            }
        ]
    }))
}

async fn blockchair(
    State(hits): State<Arc<UpstreamHits>>,
    Path((kind, id)): Path<(String, String)>,
) -> Json<Value> {
    hits.blockchair.fetch_add(1, Ordering::SeqCst);
    if kind == "xpub" {
        if let Ok(mut last) = hits.last_xpub.lock() {
            *last = Some(id.clone());
        }
        return Json(json!({
            "data": { id: {
                "xpub": {
                    "balance": 150_000_000u64, "received": 250_000_000u64, "spent": 100_000_000u64,
                    "transaction_count": 4, "address_count": 2
                },
                "addresses": [
                    { "address": BTC_ADDR, "path": "0/0", "balance": 150_000_000u64, "transaction_count": 3 },
                    { "address": BTC_CHANGE_ADDR, "path": "1/0", "balance": 0, "transaction_count": 1 }
                ]
            }}
        }));
    }
    Json(json!({
        "data": { id: { "address": {
            "transaction_count": 3,
            "balance": 150_000_000u64,
            "received": 250_000_000u64,
            "spent": 100_000_000u64
        }}}
    }))
}

async fn tatum(State(hits): State<Arc<UpstreamHits>>, Path(_address): Path<String>) -> Json<Value> {
    hits.tatum.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "incoming": "2.5", "outgoing": "1.0" }))
}

async fn tatum_down(State(hits): State<Arc<UpstreamHits>>) -> StatusCode {
    hits.tatum_down.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

async fn etherscan_down(State(hits): State<Arc<UpstreamHits>>) -> StatusCode {
    hits.etherscan_down.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 应用状态
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 所有数据源指向假上游；不重试，两次失败即熔断
pub fn test_config(upstream: &FakeUpstream) -> Config {
    let mut config = Config::default();
    config.jwt.secret = TEST_SECRET.to_string();
    config.cache.redis_url = None;

    let p = &mut config.providers;
    p.blockchair_api_key = None;
    p.blockchair_base_url = upstream.base_url.clone();
    p.infura_key = None;
    p.ethereum_rpc_url = Some(format!("{}/rpc", upstream.base_url));
    p.etherscan_api_key = Some("test-etherscan-key".to_string());
    p.etherscan_base_url = upstream.base_url.clone();
    p.tatum_api_key = Some("test-tatum-key".to_string());
    p.tatum_base_url = upstream.base_url.clone();
    p.auto_compare_xpub = true;
    p.http_timeout_secs = 5;
    p.http_connect_timeout_secs = 2;

    let r = &mut config.resilience;
    r.retries = 0;
    r.retry_base_delay_ms = 1;
    r.retry_max_delay_ms = 2;
    r.circuit_fail_max = 2;
    r.circuit_reset_timeout_secs = 60;

    config
}

/// 纯内存缓存 + 内存任务存储
pub fn build_state(config: Config) -> Arc<AppState> {
    let config = Arc::new(config);
    let cache = ScanCache::memory(Duration::from_secs(300));
    let services =
        Arc::new(ServiceContext::with_cache(&config, cache).expect("Failed to build service context"));
    let jobs: Arc<dyn ScanJobRepository> = Arc::new(InMemoryScanJobRepository::new());
    Arc::new(AppState::with_parts(config, services, jobs))
}

pub fn token_for(user_id: Uuid) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token")
}

/// 轮询任务直到终态
pub async fn wait_for_terminal(state: &AppState, id: Uuid) -> ScanJob {
    for _ in 0..200 {
        if let Some(job) = state.jobs.get(id).await.expect("repository read") {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("scan job {} did not finish in time", id);
}
