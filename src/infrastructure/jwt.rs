//! JWT 校验
//!
//! 令牌由外部身份服务签发（HS256），这里只负责验签并取出 `sub` 作为用户 ID。

use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub exp: i64,    // Expiration time
    #[serde(default)]
    pub iat: i64, // Issued at
}

impl Claims {
    /// 获取用户 ID（UUID）
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {}", e))
    }
}

/// JWT 校验器
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 10; // 允许10秒时钟偏差
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// 验证 token 并返回用户 ID
    pub fn verify(&self, token: &str) -> Result<Uuid> {
        tracing::debug!(token_len = token.len(), "JWT: starting verification");

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::warn!(error = %e, "JWT: token verification failed");
            anyhow!("Token verification failed: {}", e)
        })?;

        data.claims.user_id()
    }
}
