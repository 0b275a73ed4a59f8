//! 密钥派生引擎
//!
//! 十六进制种子 → secp256k1 私钥 → 公钥（压缩/非压缩）→ 深度 0 的扩展密钥与链上地址。
//! 纯函数：同一输入永远得到同一快照。

use bitcoin::hashes::{hash160, Hash};
use k256::{elliptic_curve::sec1::ToEncodedPoint, SecretKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;
use utoipa::ToSchema;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::{
    codec::{self, ExtKeyFamily, BTC_P2PKH_VERSION},
    extended_key::ExtendedKey,
};

/// secp256k1 群的阶 N（大端）
pub const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

const MAX_HEX_LEN: usize = 64;

/// 派生错误
///
/// 前三种是调用方输入错误（400），`Crypto` 是底层库失败（500）。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    #[error("invalid hex characters")]
    InvalidHex,
    #[error("hex longer than 64 chars")]
    TooLong,
    #[error("invalid private key range for secp256k1")]
    OutOfRange,
    #[error("key derivation failed: {0}")]
    Crypto(String),
}

impl DeriveError {
    pub fn is_input_error(&self) -> bool {
        !matches!(self, DeriveError::Crypto(_))
    }
}

/// 标准化十六进制：去掉 0x 前缀、转小写、校验字符与长度、左补零到 64 位
pub fn normalize_hex(input: &str) -> Result<String, DeriveError> {
    let lowered = input.trim().to_ascii_lowercase();
    let body = lowered.strip_prefix("0x").unwrap_or(&lowered);

    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DeriveError::InvalidHex);
    }
    if body.len() > MAX_HEX_LEN {
        return Err(DeriveError::TooLong);
    }
    Ok(format!("{:0>64}", body))
}

/// 合法的 secp256k1 私钥标量：1 ≤ k < N
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Scalar([u8; 32]);

impl Scalar {
    pub fn from_hex(input: &str) -> Result<Self, DeriveError> {
        let hex64 = normalize_hex(input)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&hex64, &mut bytes).map_err(|_| DeriveError::InvalidHex)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, DeriveError> {
        // 大端字节序下的字典序比较即数值比较
        if bytes == [0u8; 32] || bytes >= SECP256K1_ORDER {
            return Err(DeriveError::OutOfRange);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scalar(<redacted>)")
    }
}

/// 由标量派生的密钥材料
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub private_key: [u8; 32],
    pub public_key_compressed: [u8; 33],
    pub public_key_uncompressed: [u8; 65],
}

impl KeyMaterial {
    pub fn from_scalar(scalar: &Scalar) -> Result<Self, DeriveError> {
        let secret = SecretKey::from_slice(scalar.as_bytes())
            .map_err(|e| DeriveError::Crypto(e.to_string()))?;
        let public = secret.public_key();

        let compressed = public.to_encoded_point(true);
        let uncompressed = public.to_encoded_point(false);

        let public_key_compressed: [u8; 33] = compressed
            .as_bytes()
            .try_into()
            .map_err(|_| DeriveError::Crypto("unexpected compressed point length".into()))?;
        let public_key_uncompressed: [u8; 65] = uncompressed
            .as_bytes()
            .try_into()
            .map_err(|_| DeriveError::Crypto("unexpected uncompressed point length".into()))?;

        Ok(Self {
            private_key: *scalar.as_bytes(),
            public_key_compressed,
            public_key_uncompressed,
        })
    }
}

/// 派生快照（POST derive 的响应体）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DerivedSnapshot {
    pub xprv: String,
    pub xpub: String,
    pub ypub: String,
    pub zpub: String,
    pub btc_address: String,
    pub eth_address: String,
}

/// 深度 0 的扩展密钥（xprv 与三种公钥族）
pub fn master_extended_keys(keys: &KeyMaterial) -> [(ExtKeyFamily, String); 4] {
    let mut xprv_data = [0u8; 33];
    xprv_data[1..].copy_from_slice(&keys.private_key);
    let xprv = ExtendedKey::master_placeholder(ExtKeyFamily::Xprv, xprv_data).encode();
    xprv_data.zeroize();

    let public = |family| {
        ExtendedKey::master_placeholder(family, keys.public_key_compressed).encode()
    };

    [
        (ExtKeyFamily::Xprv, xprv),
        (ExtKeyFamily::Xpub, public(ExtKeyFamily::Xpub)),
        (ExtKeyFamily::Ypub, public(ExtKeyFamily::Ypub)),
        (ExtKeyFamily::Zpub, public(ExtKeyFamily::Zpub)),
    ]
}

/// Bitcoin 主网 P2PKH 地址：base58check(0x00 ‖ RIPEMD160(SHA256(compressed_pubkey)))
pub fn btc_p2pkh_address(public_key_compressed: &[u8; 33]) -> String {
    let h160 = hash160::Hash::hash(public_key_compressed).to_byte_array();
    let mut payload = [0u8; 21];
    payload[0] = BTC_P2PKH_VERSION;
    payload[1..].copy_from_slice(&h160);
    codec::base58check_encode(&payload)
}

/// Ethereum 地址：Keccak256(x ‖ y) 的后 20 字节，EIP-55 大小写校验
pub fn eth_address(public_key_uncompressed: &[u8; 65]) -> String {
    let hash = Keccak256::digest(&public_key_uncompressed[1..]);
    let lower = hex::encode(&hash[12..]);
    format!("0x{}", eip55_checksum(&lower))
}

/// 对 40 位小写十六进制应用 EIP-55：哈希对应半字节 ≥ 8 时该位字母大写
pub fn eip55_checksum(lower_hex: &str) -> String {
    let hash = Keccak256::digest(lower_hex.as_bytes());
    lower_hex
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

/// 从十六进制种子生成完整快照
pub fn snapshot_from_hex(input: &str) -> Result<DerivedSnapshot, DeriveError> {
    let scalar = Scalar::from_hex(input)?;
    let keys = KeyMaterial::from_scalar(&scalar)?;

    let [(_, xprv), (_, xpub), (_, ypub), (_, zpub)] = master_extended_keys(&keys);

    Ok(DerivedSnapshot {
        xprv,
        xpub,
        ypub,
        zpub,
        btc_address: btc_p2pkh_address(&keys.public_key_compressed),
        eth_address: eth_address(&keys.public_key_uncompressed),
    })
}
