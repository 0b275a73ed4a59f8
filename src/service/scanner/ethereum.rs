//! Ethereum 扫描器
//!
//! JSON-RPC（Infura 或自定义端点）并发取余额与 nonce；配置了 Etherscan key 时再拉完整交易列表，
//! 计算按月交易量和余额曲线。增强失败不影响基础结果。

use std::{collections::BTreeMap, str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::header::HeaderMap;
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ChainScanner;
use crate::{
    domain::{
        provider_result::{BalancePoint, ProviderResult, ResultSummary, VolumeBucket},
        scan_job::ScanKind,
    },
    infrastructure::{cache::scan_cache_key, upstream::ProviderError},
    service::provider_context::{ServiceContext, ETHERSCAN, INFURA},
    utils::{
        chain_normalizer::{self, ChainIdentifier},
        AddressValidator,
    },
};

const CHAIN: &ChainIdentifier = &chain_normalizer::ETHEREUM;
const NETWORK: &str = "ethereum";
const WEI_DECIMALS: u32 = 18;
const NO_TRANSACTIONS: &str = "No transactions found";

pub struct EthereumScanner {
    ctx: Arc<ServiceContext>,
}

impl EthereumScanner {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// 单个 JSON-RPC 调用，返回 `result`（缺失视为 `0x0`）
    async fn rpc_call(&self, rpc: &str, id: u32, method: &str, address: &str) -> Result<String, ProviderError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": [address, "latest"],
        });

        let http = &self.ctx.http;
        let payload = &payload;
        // 带 error 对象的 200 响应也算一次失败
        self.ctx
            .infura
            .call(move || async move {
                let body = http.post_json(INFURA, rpc, payload).await?;
                rpc_result(&body, method)
            })
            .await
    }

    async fn fetch_txlist(&self, api_key: &str, address: &str) -> Result<Vec<EtherscanTx>, ProviderError> {
        let url = format!(
            "{}/api",
            self.ctx.providers.etherscan_base_url.trim_end_matches('/')
        );
        let query = [
            ("module", "account"),
            ("action", "txlist"),
            ("address", address),
            ("startblock", "0"),
            ("endblock", "99999999"),
            ("sort", "asc"),
            ("apikey", api_key),
        ];

        let http = &self.ctx.http;
        let url = url.as_str();
        let query = &query[..];
        let body = self
            .ctx
            .etherscan
            .call(move || async move { http.get_json(ETHERSCAN, url, query, HeaderMap::new()).await })
            .await?;

        parse_txlist(&body)
    }
}

#[async_trait]
impl ChainScanner for EthereumScanner {
    fn chain(&self) -> &'static str {
        CHAIN.canonical_name
    }

    async fn scan_address(
        &self,
        address: &str,
        _compare_providers: bool,
    ) -> Result<ProviderResult, ProviderError> {
        if !AddressValidator::validate_eth(address) {
            return Err(ProviderError::InvalidAddress);
        }
        let checksum_valid = AddressValidator::eip55_status(address);
        if checksum_valid == Some(false) {
            tracing::warn!(chain = CHAIN.canonical_name, "address casing does not match its EIP-55 checksum");
        }

        let cache_key = scan_cache_key(
            CHAIN.short_name,
            NETWORK,
            ScanKind::Address.cache_segment(),
            address,
            false,
        );
        if let Some(cached) = self.ctx.cache.get::<ProviderResult>(&cache_key).await {
            tracing::debug!(chain = CHAIN.canonical_name, "address scan served from cache");
            return Ok(cached);
        }

        let rpc = self
            .ctx
            .providers
            .ethereum_rpc_endpoint()
            .ok_or(ProviderError::NotConfigured("INFURA_KEY"))?;

        let (balance_hex, nonce_hex) = tokio::join!(
            self.rpc_call(&rpc, 1, "eth_getBalance", address),
            self.rpc_call(&rpc, 2, "eth_getTransactionCount", address),
        );
        let balance_hex = balance_hex?;
        let nonce_hex = nonce_hex?;

        let balance_wei = parse_hex_quantity(&balance_hex)?;
        let nonce = parse_hex_quantity(&nonce_hex)?;

        // nonce 只统计发出的交易
        let mut result = ProviderResult {
            summary: ResultSummary {
                addresses_scanned: 1,
                total_transactions: u64::try_from(nonce).unwrap_or(u64::MAX),
                total_received: None,
                total_sent: None,
                current_balance: Decimal::from_u128(balance_wei)
                    .map(wei_to_eth)
                    .unwrap_or(balance_wei as f64 / 1e18),
                unit: CHAIN.symbol.into(),
                currency: CHAIN.symbol.into(),
            },
            addresses_scanned: vec![address.to_string()],
            ..Default::default()
        };
        result.providers.insert(
            INFURA.to_string(),
            json!({
                "balance_wei": balance_wei.to_string(),
                "nonce": nonce.to_string(),
                "checksum_valid": checksum_valid,
            }),
        );

        if let Some(api_key) = self.ctx.providers.etherscan_api_key.as_deref() {
            match self.fetch_txlist(api_key, address).await {
                Ok(txs) => {
                    let history = build_history(&txs, address);
                    result.summary.total_transactions = txs.len() as u64;
                    result.summary.total_received = Some(wei_to_eth(history.received_wei));
                    result.summary.total_sent = Some(wei_to_eth(history.sent_wei));
                    result.balance_over_time = history.balance_over_time;
                    result.tx_volume_over_time = history.tx_volume_over_time;
                    result
                        .providers
                        .insert(ETHERSCAN.to_string(), json!({ "transactions": txs.len() }));
                }
                Err(e) => {
                    tracing::warn!(provider = ETHERSCAN, error = %e, "enrichment failed; returning baseline result");
                    result
                        .providers
                        .insert(ETHERSCAN.to_string(), json!({ "error": e.to_string() }));
                }
            }
        }

        self.ctx.cache.set(&cache_key, &result).await;
        Ok(result)
    }

    async fn scan_xpub(
        &self,
        _xpub: &str,
        _compare_providers: bool,
    ) -> Result<ProviderResult, ProviderError> {
        Ok(ProviderResult::unsupported("xpub not supported on Ethereum"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 换算与交易历史
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-RPC 响应里的 `result`（缺失视为 `0x0`），带 `error` 对象时失败
fn rpc_result(body: &Value, method: &str) -> Result<String, ProviderError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        return Err(ProviderError::UpstreamShape {
            provider: INFURA,
            detail: format!("{} returned error: {}", method, err),
        });
    }
    Ok(body
        .get("result")
        .and_then(Value::as_str)
        .unwrap_or("0x0")
        .to_string())
}

/// `0x` 前缀的十六进制数量
fn parse_hex_quantity(s: &str) -> Result<u128, ProviderError> {
    let digits = s.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ProviderError::Decode {
        provider: INFURA,
        message: format!("invalid hex quantity {:?}: {}", s, e),
    })
}

fn wei_to_eth(wei: Decimal) -> f64 {
    let divisor = Decimal::from(10u64.pow(WEI_DECIMALS));
    wei.checked_div(divisor)
        .and_then(|eth| eth.normalize().to_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EtherscanTx {
    pub time_stamp: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub is_error: String,
}

fn parse_txlist(body: &Value) -> Result<Vec<EtherscanTx>, ProviderError> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    if status != "1" {
        let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
        if message == NO_TRANSACTIONS {
            return Ok(Vec::new());
        }
        return Err(ProviderError::UpstreamShape {
            provider: ETHERSCAN,
            detail: format!("status {:?}: {}", status, message),
        });
    }

    let list = body.get("result").cloned().unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(list).map_err(|e| ProviderError::Decode {
        provider: ETHERSCAN,
        message: e.to_string(),
    })
}

fn decimal_field(s: &str) -> Decimal {
    Decimal::from_str(s.trim()).unwrap_or(Decimal::ZERO)
}

pub(crate) struct TxHistory {
    pub balance_over_time: Vec<BalancePoint>,
    pub tx_volume_over_time: Vec<VolumeBucket>,
    pub received_wei: Decimal,
    pub sent_wei: Decimal,
}

/// 按时间顺序累计余额；只计成功的交易，自转账同时计入收入和支出
pub(crate) fn build_history(txs: &[EtherscanTx], address: &str) -> TxHistory {
    let me = address.to_ascii_lowercase();
    let mut monthly: BTreeMap<String, u64> = BTreeMap::new();
    let mut points = Vec::new();
    let mut balance = Decimal::ZERO;
    let mut received = Decimal::ZERO;
    let mut sent = Decimal::ZERO;

    for tx in txs {
        let Some(ts) = tx
            .time_stamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        else {
            continue;
        };
        *monthly.entry(ts.format("%Y-%m").to_string()).or_default() += 1;

        if tx.is_error != "0" {
            continue;
        }

        let value = decimal_field(&tx.value);
        if tx.to.eq_ignore_ascii_case(&me) {
            balance += value;
            received += value;
        }
        if tx.from.eq_ignore_ascii_case(&me) {
            let fee = decimal_field(&tx.gas_used)
                .checked_mul(decimal_field(&tx.gas_price))
                .unwrap_or(Decimal::ZERO);
            balance -= value + fee;
            sent += value;
        }
        points.push(BalancePoint {
            timestamp: ts.to_rfc3339(),
            balance: wei_to_eth(balance),
        });
    }

    TxHistory {
        balance_over_time: points,
        tx_volume_over_time: monthly
            .into_iter()
            .map(|(period, count)| VolumeBucket { period, count })
            .collect(),
        received_wei: received,
        sent_wei: sent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    const ME: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";
    const OTHER: &str = "0x2b5ad5c4795c026514f8317c7a215e218dccd6cf";

    fn tx(ts: i64, from: &str, to: &str, value: &str, is_error: &str) -> EtherscanTx {
        EtherscanTx {
            time_stamp: ts.to_string(),
            from: from.into(),
            to: to.into(),
            value: value.into(),
            gas_used: "21000".into(),
            gas_price: "1000000000".into(),
            is_error: is_error.into(),
        }
    }

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0xde0b6b3a7640000").unwrap(), 1_000_000_000_000_000_000);
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn test_rpc_result() {
        let ok = json!({ "jsonrpc": "2.0", "id": 1, "result": "0x2" });
        assert_eq!(rpc_result(&ok, "eth_getTransactionCount").unwrap(), "0x2");

        let missing = json!({ "jsonrpc": "2.0", "id": 1, "error": null });
        assert_eq!(rpc_result(&missing, "eth_getBalance").unwrap(), "0x0");

        let limited = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32005, "message": "rate limited" } });
        assert!(matches!(
            rpc_result(&limited, "eth_getBalance"),
            Err(ProviderError::UpstreamShape { .. })
        ));
    }

    #[test]
    fn test_wei_to_eth() {
        assert!(approx(wei_to_eth(Decimal::from(1_500_000_000_000_000_000u64)), 1.5));
        assert_eq!(wei_to_eth(Decimal::ZERO), 0.0);
    }

    #[test]
    fn test_history_credits_debits_and_skips_failed() {
        // 2024-01-15, 2024-01-20, 2024-02-01
        let txs = vec![
            tx(1_705_276_800, OTHER, ME, "2000000000000000000", "0"),
            tx(1_705_708_800, ME, OTHER, "500000000000000000", "0"),
            tx(1_706_745_600, OTHER, ME, "9000000000000000000", "1"),
        ];
        let h = build_history(&txs, &ME.to_uppercase().replace("0X", "0x"));

        assert_eq!(h.balance_over_time.len(), 2);
        assert!(approx(h.balance_over_time[0].balance, 2.0));
        // 2 - 0.5 - 21000 * 1 gwei
        assert!(approx(h.balance_over_time[1].balance, 1.499979));
        assert!(h.balance_over_time[0].timestamp.starts_with("2024-01-15T"));

        assert_eq!(
            h.tx_volume_over_time,
            vec![
                VolumeBucket { period: "2024-01".into(), count: 2 },
                VolumeBucket { period: "2024-02".into(), count: 1 },
            ]
        );
        assert!(approx(wei_to_eth(h.received_wei), 2.0));
        assert!(approx(wei_to_eth(h.sent_wei), 0.5));
    }

    #[test]
    fn test_self_send_counts_both_ways() {
        let txs = vec![
            tx(1_705_276_800, OTHER, ME, "1000000000000000000", "0"),
            tx(1_705_276_900, ME, ME, "1000000000000000000", "0"),
        ];
        let h = build_history(&txs, ME);
        // 自转账只损失手续费
        assert!(approx(h.balance_over_time[1].balance, 0.999979));
    }

    #[test]
    fn test_txlist_status_handling() {
        let empty = json!({ "status": "0", "message": "No transactions found", "result": [] });
        assert!(parse_txlist(&empty).unwrap().is_empty());

        let limited = json!({ "status": "0", "message": "NOTOK", "result": "Max rate limit reached" });
        assert!(matches!(
            parse_txlist(&limited),
            Err(ProviderError::UpstreamShape { .. })
        ));

        let ok = json!({ "status": "1", "message": "OK", "result": [{
            "timeStamp": "1705276800", "from": OTHER, "to": ME, "value": "1",
            "gasUsed": "21000", "gasPrice": "1", "isError": "0", "hash": "0xabc"
        }]});
        let txs = parse_txlist(&ok).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].is_error, "0");
    }

    fn scanner() -> EthereumScanner {
        let mut config = crate::config::Config::default();
        // 端口 9 不会有服务，任何网络调用都会失败
        config.providers.ethereum_rpc_url = Some("http://127.0.0.1:9/rpc".into());
        let ctx = ServiceContext::with_cache(
            &config,
            crate::infrastructure::cache::ScanCache::memory(std::time::Duration::from_secs(5)),
        )
        .unwrap();
        EthereumScanner::new(Arc::new(ctx))
    }

    #[tokio::test]
    async fn test_xpub_is_structured_unsupported() {
        let r = scanner().scan_xpub("xpub661MyMwAqRbc", false).await.unwrap();
        assert!(r.is_unsupported());
        assert_eq!(r.error.as_deref(), Some("xpub not supported on Ethereum"));
        assert!(r.addresses_scanned.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_rpc() {
        let s = scanner();
        for bad in [
            "0x1234",
            "7e5f4552091a69125d5dfcb7b8c2659029395bdf00",
            "0x7E5F4552091A69125d5DfCb7b8C2659029395BZZ",
        ] {
            assert!(matches!(
                s.scan_address(bad, false).await,
                Err(ProviderError::InvalidAddress)
            ));
        }
        assert_eq!(s.ctx.infura.snapshot().consecutive_failures, 0);
    }
}
