//! 扫描结果模型
//!
//! 所有链的扫描器输出同一结构：汇总、地址列表、时间序列与各数据源的原始明细。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultSummary {
    pub addresses_scanned: u64,
    pub total_transactions: u64,
    pub total_received: Option<f64>,
    pub total_sent: Option<f64>,
    pub current_balance: f64,
    pub unit: String,
    pub currency: String,
}

/// 扩展公钥下的单个地址
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AddressEntry {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// external / change，由路径首段推断
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub transaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BalancePoint {
    /// RFC-3339
    pub timestamp: String,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VolumeBucket {
    /// YYYY-MM
    pub period: String,
    pub count: u64,
}

/// ypub/zpub → xpub 的转换记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct XpubNormalization {
    pub original: String,
    pub original_prefix: String,
    pub normalized_xpub: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpub_normalization: Option<XpubNormalization>,
}

/// 扫描结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProviderResult {
    pub summary: ResultSummary,
    pub addresses_scanned: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address_details: Vec<AddressEntry>,
    #[serde(default)]
    pub balance_over_time: Vec<BalancePoint>,
    #[serde(default)]
    pub tx_volume_over_time: Vec<VolumeBucket>,
    /// 数据源名称 → 该数据源自己的汇总或明细
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schema(value_type = Object)]
    pub providers: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResultMeta>,
    /// 链不支持该扫描类型时的说明；此时其余字段为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderResult {
    /// 结构化的"不支持"结果（不是错误）
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_unsupported(&self) -> bool {
        self.error.is_some()
    }

    pub fn record_normalization(&mut self, info: XpubNormalization) {
        self.meta
            .get_or_insert_with(ResultMeta::default)
            .xpub_normalization = Some(info);
    }
}
