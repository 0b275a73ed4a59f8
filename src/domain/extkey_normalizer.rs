//! 扩展公钥标准化
//!
//! 只处理公钥族：ypub/zpub 通过替换版本字节转换为 xpub，xpub 原样返回。
//! 测试网前缀（tpub/upub/vpub 及其私钥族）一律拒绝，从不静默转换。

use thiserror::Error;

use crate::domain::{
    codec::{self, CodecError, ExtKeyFamily, TESTNET_PREFIXES},
    extended_key::{ExtendedKey, ExtendedKeyError, EXTENDED_KEY_LEN},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtKeyError {
    #[error("Testnet extended keys are not supported")]
    UnsupportedNetwork,
    #[error("Unsupported extended public key prefix '{0}'; expected xpub/ypub/zpub")]
    UnsupportedPrefix(String),
    #[error("Invalid extended key: {0}")]
    Malformed(String),
}

impl From<CodecError> for ExtKeyError {
    fn from(e: CodecError) -> Self {
        ExtKeyError::Malformed(e.to_string())
    }
}

impl From<ExtendedKeyError> for ExtKeyError {
    fn from(e: ExtendedKeyError) -> Self {
        ExtKeyError::Malformed(e.to_string())
    }
}

/// 取前 4 个字符作为前缀（不足 4 个字符时返回全部）
pub fn detect_prefix(s: &str) -> &str {
    match s.char_indices().nth(4) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn is_testnet(s: &str) -> bool {
    TESTNET_PREFIXES.contains(&detect_prefix(s))
}

/// 是否形如主网扩展公钥（xpub/ypub/zpub），大小写不敏感
pub fn looks_like_mainnet_xpub_family(s: &str) -> bool {
    matches!(
        detect_prefix(s).to_ascii_lowercase().as_str(),
        "xpub" | "ypub" | "zpub"
    )
}

/// 标准化为 xpub
pub fn convert_to_xpub(ext_pub: &str) -> Result<String, ExtKeyError> {
    if is_testnet(ext_pub) {
        return Err(ExtKeyError::UnsupportedNetwork);
    }

    match ExtKeyFamily::from_prefix(detect_prefix(ext_pub)) {
        Some(ExtKeyFamily::Xpub) => Ok(ext_pub.to_string()),
        Some(ExtKeyFamily::Ypub) | Some(ExtKeyFamily::Zpub) => {
            swap_version(ext_pub, ExtKeyFamily::Xpub)
        }
        _ => Err(ExtKeyError::UnsupportedPrefix(
            detect_prefix(ext_pub).to_string(),
        )),
    }
}

/// 替换版本字节并重新计算校验和
fn swap_version(ext: &str, target: ExtKeyFamily) -> Result<String, ExtKeyError> {
    let payload = codec::base58check_decode(ext)?;
    if payload.len() < EXTENDED_KEY_LEN {
        return Err(ExtendedKeyError::InvalidLength(payload.len()).into());
    }
    let mut key = ExtendedKey::from_bytes(&payload[..EXTENDED_KEY_LEN])?;
    key.version = target.version_bytes();
    Ok(key.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 私钥 = 1、链码全零的根密钥
    const XPUB_ONE: &str = "xpub661MyMwAqRbcEYS8w7XLSVeEsBXy79zSzH1J8vCdxAZningWLdN3zgtU6QzvJsNBNF5QPBBBg1yVF2LKrcfGdJq86PeLWDMUCYatZPzQu8R";
    const YPUB_ONE: &str = "ypub6QqdH2c5z7965qdFmUJxeajk39gR3mywuPXWvK6XLAwfmtVjbHXcckYc7cxWJn26mtCD8emk8gL38JwtaK5HRYWixjLm68AxUGeXwvkxrFF";
    const ZPUB_ONE: &str = "zpub6jftahH18ngZw8pNbq6arfqFD7przPySpW3jhhzQiBKYpzJxqwhBEpCk8pv6Jgg2BXK1t8NJbLgb1bZTJ1VJDnCKq53Bg2zSjziBLZ7HLSy";

    #[test]
    fn test_detect_prefix() {
        assert_eq!(detect_prefix(XPUB_ONE), "xpub");
        assert_eq!(detect_prefix("ab"), "ab");
        assert_eq!(detect_prefix(""), "");
    }

    #[test]
    fn test_xpub_unchanged() {
        assert_eq!(convert_to_xpub(XPUB_ONE).unwrap(), XPUB_ONE);
    }

    #[test]
    fn test_ypub_zpub_to_xpub() {
        assert_eq!(convert_to_xpub(YPUB_ONE).unwrap(), XPUB_ONE);
        assert_eq!(convert_to_xpub(ZPUB_ONE).unwrap(), XPUB_ONE);
        // 结果可以通过校验和验证
        assert!(ExtendedKey::decode(&convert_to_xpub(ZPUB_ONE).unwrap()).is_ok());
    }

    #[test]
    fn test_testnet_rejected_before_transform() {
        for prefix in TESTNET_PREFIXES {
            let input = format!("{}6D4BDPcP2GT577Vvch3R8wDkScZWzQzMMUm3PWbmWvVJrZwQY4VUNgqFJPMM3No2dFDFGTsxxpG5uJh7n7epu4trkrX7x7DogT5Uv6fcLW5", prefix);
            assert_eq!(convert_to_xpub(&input), Err(ExtKeyError::UnsupportedNetwork));
            assert!(is_testnet(&input));
        }
    }

    #[test]
    fn test_private_and_unknown_prefixes_rejected() {
        assert!(matches!(
            convert_to_xpub("xprv9s21ZrQH143K24Mfq5zL5MhWK9hUhhGbd45hLXo2Pq2oqzMMo63oStZzF93Y5wvzdUayhgkkFoicQZcP3y52uPPxFnfoLZB21TeqtDeZVxb"),
            Err(ExtKeyError::UnsupportedPrefix(p)) if p == "xprv"
        ));
        assert!(matches!(
            convert_to_xpub("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"),
            Err(ExtKeyError::UnsupportedPrefix(_))
        ));
    }

    #[test]
    fn test_corrupted_ypub_is_malformed() {
        let mut corrupted = YPUB_ONE.to_string();
        corrupted.pop();
        corrupted.push('G');
        assert!(matches!(
            convert_to_xpub(&corrupted),
            Err(ExtKeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_looks_like_xpub_family() {
        assert!(looks_like_mainnet_xpub_family(YPUB_ONE));
        assert!(looks_like_mainnet_xpub_family("ZPUBxyz"));
        assert!(!looks_like_mainnet_xpub_family("tpubxyz"));
        assert!(!looks_like_mainnet_xpub_family("0x1234"));
    }
}
