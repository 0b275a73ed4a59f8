//! Bitcoin 扫描器
//!
//! 主数据源 Blockchair（地址 / xpub 仪表盘），可选 Tatum 逐地址对比余额。
//! 金额统一从 satoshi 换算为 BTC。

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::{json, Value};

use super::ChainScanner;
use crate::{
    domain::{
        provider_result::{AddressEntry, ProviderResult, ResultSummary},
        scan_job::ScanKind,
    },
    error::ErrorClass,
    infrastructure::{cache::scan_cache_key, upstream::ProviderError},
    service::provider_context::{ServiceContext, BLOCKCHAIR, TATUM},
    utils::chain_normalizer::{self, ChainIdentifier},
};

pub const SATOSHI: f64 = 100_000_000.0;
const CHAIN: &ChainIdentifier = &chain_normalizer::BITCOIN;
const NETWORK: &str = "bitcoin";

pub struct BitcoinScanner {
    ctx: Arc<ServiceContext>,
}

impl BitcoinScanner {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    fn dashboard_url(&self, kind: &str, id: &str) -> String {
        format!(
            "{}/bitcoin/dashboards/{}/{}",
            self.ctx.providers.blockchair_base_url.trim_end_matches('/'),
            kind,
            id
        )
    }

    /// Blockchair GET（带并发限制、熔断、重试）
    async fn fetch_dashboard(&self, kind: &str, id: &str, limit: Option<usize>) -> Result<Value, ProviderError> {
        let url = self.dashboard_url(kind, id);
        let limit = limit.map(|l| l.to_string());

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(key) = self.ctx.providers.blockchair_api_key.as_deref() {
            query.push(("key", key));
        }
        if let Some(limit) = limit.as_deref() {
            query.push(("limit", limit));
        }

        let http = &self.ctx.http;
        let url = url.as_str();
        let query = query.as_slice();
        self.ctx
            .blockchair
            .call(move || async move { http.get_json(BLOCKCHAIR, url, query, HeaderMap::new()).await })
            .await
    }

    /// 对比数据源：逐地址查询余额，单个地址失败只记录在该地址上
    async fn compare_with_tatum(&self, candidates: &[String]) -> Option<Value> {
        let api_key = self.ctx.providers.tatum_api_key.as_deref()?;
        let header = match HeaderValue::from_str(api_key) {
            Ok(h) => h,
            Err(_) => {
                tracing::warn!(provider = TATUM, "API key is not a valid header value; comparison skipped");
                return None;
            }
        };

        let limit = self.ctx.providers.tatum_max_lookups;
        let probes = candidates
            .iter()
            .take(limit)
            .map(|address| self.probe_tatum(address, header.clone()));
        let details: Vec<TatumBalance> = futures::future::join_all(probes).await;

        let with_unspent = details
            .iter()
            .filter(|d| d.balance.map(|b| b > 0.0).unwrap_or(false))
            .count();
        tracing::debug!(
            provider = TATUM,
            checked = details.len(),
            with_unspent,
            "comparison provider finished"
        );

        Some(json!({
            "addresses_checked": details.len(),
            "addresses_with_unspent": with_unspent,
            "details": details.iter().map(TatumBalance::to_json).collect::<Vec<_>>(),
        }))
    }

    async fn probe_tatum(&self, address: &str, api_key: HeaderValue) -> TatumBalance {
        let url = format!(
            "{}/v3/bitcoin/address/balance/{}",
            self.ctx.providers.tatum_base_url.trim_end_matches('/'),
            address
        );
        let http = &self.ctx.http;
        let url = url.as_str();
        let api_key = &api_key;

        let outcome = self
            .ctx
            .tatum
            .call(move || async move {
                let mut headers = HeaderMap::new();
                headers.insert("x-api-key", api_key.clone());
                http.get_json(TATUM, url, &[], headers).await
            })
            .await
            .and_then(|body| parse_tatum_balance(&body));

        match outcome {
            Ok((incoming, outgoing)) => TatumBalance {
                address: address.to_string(),
                balance: (incoming - outgoing).to_f64(),
                incoming: incoming.to_f64(),
                outgoing: outgoing.to_f64(),
                error: None,
            },
            Err(e) => {
                tracing::warn!(
                    provider = TATUM,
                    class = ErrorClass::Partial.as_str(),
                    error = %e,
                    "comparison lookup failed for address"
                );
                TatumBalance {
                    address: address.to_string(),
                    balance: None,
                    incoming: None,
                    outgoing: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn comparison_enabled(&self, compare_providers: bool) -> bool {
        compare_providers && self.ctx.providers.tatum_api_key.is_some()
    }
}

#[async_trait]
impl ChainScanner for BitcoinScanner {
    fn chain(&self) -> &'static str {
        CHAIN.canonical_name
    }

    async fn scan_address(
        &self,
        address: &str,
        compare_providers: bool,
    ) -> Result<ProviderResult, ProviderError> {
        let compare = self.comparison_enabled(compare_providers);
        let cache_key = scan_cache_key(
            CHAIN.short_name,
            NETWORK,
            ScanKind::Address.cache_segment(),
            address,
            compare,
        );
        if let Some(cached) = self.ctx.cache.get::<ProviderResult>(&cache_key).await {
            tracing::debug!(chain = CHAIN.canonical_name, "address scan served from cache");
            return Ok(cached);
        }

        let body = self.fetch_dashboard("address", address, None).await?;
        let mut result = parse_address_dashboard(&body, address)?;

        if compare {
            if let Some(tatum) = self.compare_with_tatum(&[address.to_string()]).await {
                result.providers.insert(TATUM.to_string(), tatum);
            }
        }

        self.ctx.cache.set(&cache_key, &result).await;
        Ok(result)
    }

    async fn scan_xpub(
        &self,
        xpub: &str,
        compare_providers: bool,
    ) -> Result<ProviderResult, ProviderError> {
        let compare = self.comparison_enabled(compare_providers);
        let cache_key = scan_cache_key(
            CHAIN.short_name,
            NETWORK,
            ScanKind::Xpub.cache_segment(),
            xpub,
            compare,
        );
        if let Some(cached) = self.ctx.cache.get::<ProviderResult>(&cache_key).await {
            tracing::debug!(chain = CHAIN.canonical_name, "xpub scan served from cache");
            return Ok(cached);
        }

        let limit = self.ctx.providers.blockchair_xpub_limit;
        let body = self.fetch_dashboard("xpub", xpub, Some(limit)).await?;
        let dashboard = parse_xpub_dashboard(&body, xpub)?;
        if dashboard.from_checked_paths {
            tracing::warn!(
                provider = BLOCKCHAIR,
                addresses = dashboard.result.addresses_scanned.len(),
                "xpub aggregate missing; rebuilt address list from checked paths"
            );
        }

        let mut result = dashboard.result;
        if compare {
            if let Some(tatum) = self.compare_with_tatum(&dashboard.candidates).await {
                result.providers.insert(TATUM.to_string(), tatum);
            }
        }

        self.ctx.cache.set(&cache_key, &result).await;
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 响应解析
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TatumBalance {
    address: String,
    balance: Option<f64>,
    incoming: Option<f64>,
    outgoing: Option<f64>,
    error: Option<String>,
}

impl TatumBalance {
    fn to_json(&self) -> Value {
        match &self.error {
            Some(error) => json!({ "address": self.address, "error": error }),
            None => json!({
                "address": self.address,
                "balance": self.balance,
                "incoming": self.incoming,
                "outgoing": self.outgoing,
            }),
        }
    }
}

/// 解析后的 xpub 仪表盘
#[derive(Debug)]
pub(crate) struct XpubDashboard {
    pub result: ProviderResult,
    /// 对比数据源要查询的地址：有余额或有未花费输出的地址，兜底模式下为全部地址
    pub candidates: Vec<String>,
    pub from_checked_paths: bool,
}

/// 数字或数字字符串，缺失为 0
fn int_field(v: &Value, key: &str) -> u64 {
    match v.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn sats_to_btc(sats: u64) -> f64 {
    sats as f64 / SATOSHI
}

fn summary_json(summary: &ResultSummary) -> Value {
    serde_json::to_value(summary).unwrap_or(Value::Null)
}

pub(crate) fn parse_address_dashboard(body: &Value, address: &str) -> Result<ProviderResult, ProviderError> {
    let data = body.get("data").ok_or_else(|| ProviderError::UpstreamShape {
        provider: BLOCKCHAIR,
        detail: "missing data object".into(),
    })?;
    let info = data
        .get(address)
        .and_then(|entry| entry.get("address"))
        .cloned()
        .unwrap_or(Value::Null);

    let summary = ResultSummary {
        addresses_scanned: 1,
        total_transactions: int_field(&info, "transaction_count"),
        total_received: Some(sats_to_btc(int_field(&info, "received"))),
        total_sent: Some(sats_to_btc(int_field(&info, "spent"))),
        current_balance: sats_to_btc(int_field(&info, "balance")),
        unit: CHAIN.symbol.into(),
        currency: CHAIN.symbol.into(),
    };

    let mut result = ProviderResult {
        addresses_scanned: vec![address.to_string()],
        ..Default::default()
    };
    result
        .providers
        .insert(BLOCKCHAIR.to_string(), summary_json(&summary));
    result.summary = summary;
    Ok(result)
}

/// 单个地址条目，兼容 `{address: "...", ...}` 与 `{address: {address: "...", ...}}`
fn parse_address_entry(item: &Value) -> Option<(AddressEntry, u64, u64)> {
    let (address, fields) = match item.get("address") {
        Some(Value::String(a)) => (a.clone(), item),
        Some(nested @ Value::Object(_)) => (nested.get("address")?.as_str()?.to_string(), nested),
        _ => return None,
    };
    if address.is_empty() {
        return None;
    }

    let path = fields
        .get("path")
        .or_else(|| item.get("path"))
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    let balance_sats = int_field(fields, "balance");
    let utxo_count = fields
        .get("utxo")
        .and_then(Value::as_array)
        .map(|u| u.len() as u64)
        .unwrap_or_else(|| int_field(fields, "unspent_output_count"));

    let entry = AddressEntry {
        chain: path.as_deref().and_then(branch_of_path).map(str::to_string),
        path,
        address,
        balance: sats_to_btc(balance_sats),
        transaction_count: int_field(fields, "transaction_count"),
    };
    Some((entry, balance_sats, utxo_count))
}

/// `0/…` 为收款地址，`1/…` 为找零地址
fn branch_of_path(path: &str) -> Option<&'static str> {
    if path.starts_with("0/") {
        Some("external")
    } else if path.starts_with("1/") {
        Some("change")
    } else {
        None
    }
}

/// `context.checked` 兜底：字符串 `"<path>:<address>"`、纯地址，或带 `address` 字段的对象
fn parse_checked_paths(checked: &[Value]) -> Vec<AddressEntry> {
    checked
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => {
                let (path, address) = match s.rsplit_once(':') {
                    Some((p, a)) => (Some(p.to_string()), a.to_string()),
                    None => (None, s.clone()),
                };
                Some(AddressEntry {
                    chain: path.as_deref().and_then(branch_of_path).map(str::to_string),
                    path,
                    address,
                    balance: 0.0,
                    transaction_count: 0,
                })
            }
            Value::Object(_) => parse_address_entry(item).map(|(entry, _, _)| entry),
            _ => None,
        })
        .filter(|e| !e.address.is_empty())
        .collect()
}

pub(crate) fn parse_xpub_dashboard(body: &Value, xpub: &str) -> Result<XpubDashboard, ProviderError> {
    let entry = body.get("data").and_then(|d| d.get(xpub));

    if let Some(agg) = entry.and_then(|e| e.get("xpub")).filter(|v| v.is_object()) {
        let parsed: Vec<(AddressEntry, u64, u64)> = entry
            .and_then(|e| e.get("addresses"))
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(parse_address_entry).collect())
            .unwrap_or_default();

        let addresses: Vec<String> = parsed.iter().map(|(e, _, _)| e.address.clone()).collect();
        let candidates = parsed
            .iter()
            .filter(|(_, balance, utxos)| *balance > 0 || *utxos > 0)
            .map(|(e, _, _)| e.address.clone())
            .collect();

        let mut tx_count = int_field(agg, "transaction_count");
        if tx_count == 0 && !parsed.is_empty() {
            tx_count = parsed.iter().map(|(e, _, _)| e.transaction_count).sum();
        }
        let received = int_field(agg, "received");
        let spent = int_field(agg, "spent");
        let addresses_scanned = if addresses.is_empty() {
            int_field(agg, "address_count")
        } else {
            addresses.len() as u64
        };

        let summary = ResultSummary {
            addresses_scanned,
            total_transactions: tx_count,
            total_received: (received > 0).then(|| sats_to_btc(received)),
            total_sent: (spent > 0).then(|| sats_to_btc(spent)),
            current_balance: sats_to_btc(int_field(agg, "balance")),
            unit: CHAIN.symbol.into(),
            currency: CHAIN.symbol.into(),
        };

        let mut result = ProviderResult {
            addresses_scanned: addresses,
            address_details: parsed.into_iter().map(|(e, _, _)| e).collect(),
            ..Default::default()
        };
        result
            .providers
            .insert(BLOCKCHAIR.to_string(), summary_json(&summary));
        result.summary = summary;

        return Ok(XpubDashboard {
            result,
            candidates,
            from_checked_paths: false,
        });
    }

    let checked = body
        .get("context")
        .and_then(|c| c.get("checked"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::UpstreamShape {
            provider: BLOCKCHAIR,
            detail: "xpub aggregate and checked paths both missing".into(),
        })?;

    let details = parse_checked_paths(checked);
    let addresses: Vec<String> = details.iter().map(|e| e.address.clone()).collect();
    let summary = ResultSummary {
        addresses_scanned: addresses.len() as u64,
        unit: CHAIN.symbol.into(),
        currency: CHAIN.symbol.into(),
        ..Default::default()
    };

    let mut result = ProviderResult {
        addresses_scanned: addresses.clone(),
        address_details: details,
        ..Default::default()
    };
    result
        .providers
        .insert(BLOCKCHAIR.to_string(), summary_json(&summary));
    result.summary = summary;

    Ok(XpubDashboard {
        result,
        candidates: addresses,
        from_checked_paths: true,
    })
}

/// Tatum 余额：`incoming` / `outgoing` 为十进制 BTC（字符串或数字）
fn parse_tatum_balance(body: &Value) -> Result<(Decimal, Decimal), ProviderError> {
    let field = |key: &str| -> Result<Decimal, ProviderError> {
        let raw = match body.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            None | Some(Value::Null) => return Ok(Decimal::ZERO),
            Some(other) => other.to_string(),
        };
        Decimal::from_str(raw.trim()).map_err(|e| ProviderError::Decode {
            provider: TATUM,
            message: format!("{}: {}", key, e),
        })
    };
    Ok((field("incoming")?, field("outgoing")?))
}
