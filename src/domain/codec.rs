//! 编码原语
//!
//! base58 / base58check 编解码、双重哈希校验和、扩展密钥版本字节表。
//! 派生引擎与扫描路径共用这一层，不依赖任何网络或运行时状态。

use sha2::{Digest, Sha256};
use thiserror::Error;

/// 校验和长度（字节）
pub const CHECKSUM_LEN: usize = 4;

/// 编解码错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Invalid base58 character")]
    InvalidBase58,
    #[error("Payload too short for checksum: {0} bytes")]
    TooShort(usize),
    #[error("Checksum mismatch")]
    ChecksumMismatch,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 版本字节表（仅主网）
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 扩展密钥族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtKeyFamily {
    Xprv,
    Xpub,
    Yprv,
    Ypub,
    Zprv,
    Zpub,
}

impl ExtKeyFamily {
    /// 版本字节（大端）
    pub const fn version_bytes(self) -> [u8; 4] {
        match self {
            ExtKeyFamily::Xprv => [0x04, 0x88, 0xAD, 0xE4],
            ExtKeyFamily::Xpub => [0x04, 0x88, 0xB2, 0x1E],
            ExtKeyFamily::Yprv => [0x04, 0x9D, 0x78, 0x78],
            ExtKeyFamily::Ypub => [0x04, 0x9D, 0x7C, 0xB2],
            ExtKeyFamily::Zprv => [0x04, 0xB2, 0x43, 0x0C],
            ExtKeyFamily::Zpub => [0x04, 0xB2, 0x47, 0x46],
        }
    }

    /// 编码后字符串的前缀
    pub const fn prefix(self) -> &'static str {
        match self {
            ExtKeyFamily::Xprv => "xprv",
            ExtKeyFamily::Xpub => "xpub",
            ExtKeyFamily::Yprv => "yprv",
            ExtKeyFamily::Ypub => "ypub",
            ExtKeyFamily::Zprv => "zprv",
            ExtKeyFamily::Zpub => "zpub",
        }
    }

    pub const fn is_public(self) -> bool {
        matches!(
            self,
            ExtKeyFamily::Xpub | ExtKeyFamily::Ypub | ExtKeyFamily::Zpub
        )
    }

    pub fn from_version_bytes(version: [u8; 4]) -> Option<Self> {
        Self::all().into_iter().find(|f| f.version_bytes() == version)
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::all().into_iter().find(|f| f.prefix() == prefix)
    }

    pub const fn all() -> [ExtKeyFamily; 6] {
        [
            ExtKeyFamily::Xprv,
            ExtKeyFamily::Xpub,
            ExtKeyFamily::Yprv,
            ExtKeyFamily::Ypub,
            ExtKeyFamily::Zprv,
            ExtKeyFamily::Zpub,
        ]
    }
}

/// 测试网扩展密钥前缀：一律拒绝，不做转换
pub const TESTNET_PREFIXES: [&str; 6] = ["tprv", "tpub", "uprv", "upub", "vprv", "vpub"];

/// Bitcoin 主网 P2PKH 版本字节
pub const BTC_P2PKH_VERSION: u8 = 0x00;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 编解码
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// base58 编码（Bitcoin 字母表，前导 0x00 映射为前导 '1'）
pub fn base58_encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// base58 解码
pub fn base58_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    bs58::decode(s)
        .into_vec()
        .map_err(|_| CodecError::InvalidBase58)
}

/// SHA256(SHA256(data))
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// 追加 4 字节校验和后 base58 编码
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = double_sha256(payload);
    let mut buf = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    base58_encode(&buf)
}

/// base58 解码并校验尾部 4 字节，返回去掉校验和的负载
pub fn base58check_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    let mut raw = base58_decode(s)?;
    if raw.len() < CHECKSUM_LEN {
        return Err(CodecError::TooShort(raw.len()));
    }
    let split = raw.len() - CHECKSUM_LEN;
    let expected = double_sha256(&raw[..split]);
    if raw[split..] != expected[..CHECKSUM_LEN] {
        return Err(CodecError::ChecksumMismatch);
    }
    raw.truncate(split);
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base58_leading_zeros() {
        assert_eq!(base58_encode(&[]), "");
        assert_eq!(base58_encode(&[0, 0]), "11");
        assert_eq!(base58_encode(&[0, 1]), "12");
        assert_eq!(base58_decode("11").unwrap(), vec![0, 0]);
        assert_eq!(base58_decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_base58_roundtrip_edge_cases() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0; 32],
            vec![0, 0, 0, 0xff, 0x01],
            vec![0xff; 40],
            (0u8..=255).collect(),
        ];
        for bytes in cases {
            assert_eq!(base58_decode(&base58_encode(&bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn test_base58_rejects_ambiguous_chars() {
        for bad in ["0", "O", "I", "l", "abc0"] {
            assert_eq!(base58_decode(bad), Err(CodecError::InvalidBase58));
        }
    }

    #[test]
    fn test_base58check_detects_corruption() {
        let encoded = base58check_encode(b"hello world");
        assert_eq!(base58check_decode(&encoded).unwrap(), b"hello world");

        // 修改最后一个字符，校验和必然失配
        let mut chars: Vec<char> = encoded.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '2' { '3' } else { '2' };
        let corrupted: String = chars.into_iter().collect();
        assert!(matches!(
            base58check_decode(&corrupted),
            Err(CodecError::ChecksumMismatch) | Err(CodecError::InvalidBase58)
        ));
    }

    #[test]
    fn test_base58check_too_short() {
        assert_eq!(base58check_decode("1"), Err(CodecError::TooShort(1)));
    }

    #[test]
    fn test_version_table() {
        for family in ExtKeyFamily::all() {
            assert_eq!(
                ExtKeyFamily::from_version_bytes(family.version_bytes()),
                Some(family)
            );
            assert_eq!(ExtKeyFamily::from_prefix(family.prefix()), Some(family));
        }
        assert!(ExtKeyFamily::Zpub.is_public());
        assert!(!ExtKeyFamily::Xprv.is_public());
        assert_eq!(ExtKeyFamily::from_prefix("tpub"), None);
    }
}
