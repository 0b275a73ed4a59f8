//! BIP32 风格扩展密钥的序列化结构
//!
//! 布局：version(4) ‖ depth(1) ‖ parent_fingerprint(4) ‖ child_number(4) ‖ chain_code(32) ‖
//! key_data(33)，再追加 double-SHA256 的前 4 字节作为校验和，整体 base58 编码。

use thiserror::Error;

use crate::domain::codec::{self, CodecError, ExtKeyFamily};

/// 不含校验和的序列化长度
pub const EXTENDED_KEY_LEN: usize = 78;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtendedKeyError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Invalid extended key length: {0} bytes")]
    InvalidLength(usize),
}

/// 扩展密钥
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedKey {
    pub version: [u8; 4],
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_number: u32,
    pub chain_code: [u8; 32],
    pub key_data: [u8; 33],
}

impl ExtendedKey {
    /// 深度 0 的根密钥：父指纹、子序号全零，链码为固定的全零占位值。
    ///
    /// 这样得到的 xprv/xpub 只是私钥的另一种编码，不能当作可花费的 HD 根使用。
    pub fn master_placeholder(family: ExtKeyFamily, key_data: [u8; 33]) -> Self {
        Self {
            version: family.version_bytes(),
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code: [0u8; 32],
            key_data,
        }
    }

    pub fn family(&self) -> Option<ExtKeyFamily> {
        ExtKeyFamily::from_version_bytes(self.version)
    }

    /// 序列化为 78 字节（不含校验和）
    pub fn to_bytes(&self) -> [u8; EXTENDED_KEY_LEN] {
        let mut out = [0u8; EXTENDED_KEY_LEN];
        out[0..4].copy_from_slice(&self.version);
        out[4] = self.depth;
        out[5..9].copy_from_slice(&self.parent_fingerprint);
        out[9..13].copy_from_slice(&self.child_number.to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        out[45..78].copy_from_slice(&self.key_data);
        out
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ExtendedKeyError> {
        if raw.len() != EXTENDED_KEY_LEN {
            return Err(ExtendedKeyError::InvalidLength(raw.len()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&raw[0..4]);
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&raw[5..9]);
        let mut child = [0u8; 4];
        child.copy_from_slice(&raw[9..13]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&raw[13..45]);
        let mut key_data = [0u8; 33];
        key_data.copy_from_slice(&raw[45..78]);

        Ok(Self {
            version,
            depth: raw[4],
            parent_fingerprint,
            child_number: u32::from_be_bytes(child),
            chain_code,
            key_data,
        })
    }

    /// base58check 编码
    pub fn encode(&self) -> String {
        codec::base58check_encode(&self.to_bytes())
    }

    /// base58check 解码（校验和失配返回 `CodecError::ChecksumMismatch`）
    pub fn decode(s: &str) -> Result<Self, ExtendedKeyError> {
        let payload = codec::base58check_decode(s)?;
        Self::from_bytes(&payload)
    }
}
