//! 地址验证模块

use crate::domain::derivation::eip55_checksum;

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 形如以太坊地址（`0x` + 42 个字符），自动识别链时使用，不校验字符集
    pub fn looks_like_eth(input: &str) -> bool {
        input.starts_with("0x") && input.len() == 42
    }

    /// 验证以太坊地址格式：`0x` + 40 个十六进制字符，不校验大小写
    pub fn validate_eth(address: &str) -> bool {
        address
            .strip_prefix("0x")
            .map(|hex_part| hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false)
    }

    /// 混合大小写地址的 EIP-55 校验结果；全小写或全大写视为未带校验和，返回 None
    pub fn eip55_status(address: &str) -> Option<bool> {
        let hex_part = address.strip_prefix("0x")?;
        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        (has_lower && has_upper).then(|| Self::verify_eip55_checksum(address))
    }

    /// 验证 EIP-55 Checksum
    /// https://eips.ethereum.org/EIPS/eip-55
    pub fn verify_eip55_checksum(address: &str) -> bool {
        let Some(hex_part) = address.strip_prefix("0x") else {
            return false;
        };
        eip55_checksum(&hex_part.to_ascii_lowercase()) == hex_part
    }
}
