//! JWT token management
//!
//! Provides token generation and validation for the admin control API.

use crate::error::{GatewayError, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// 管理端会话声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// 固定为 `admin`
    pub sub: String,
    /// 签发时间（Unix 秒）
    pub iat: i64,
    /// 过期时间（Unix 秒）
    pub exp: i64,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expires_in: i64,
}

impl JwtManager {
    /// Create new JWT manager (HS256)
    #[must_use]
    pub fn new(secret: &str, expires_in: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 30; // 30 seconds tolerance

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expires_in,
        }
    }

    /// Generate an admin session token
    pub fn generate_token(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AdminClaims {
            sub: "admin".to_string(),
            iat: now,
            exp: now + self.expires_in,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::internal_with_source("Token 生成失败", e))
    }

    /// Validate a token and return its claims
    pub fn validate_token(&self, token: &str) -> Result<AdminClaims> {
        decode::<AdminClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| GatewayError::auth_invalid(format!("Token 无效: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let manager = JwtManager::new("test-secret", 3600);
        let token = manager.generate_token().expect("生成");
        let claims = manager.validate_token(&token).expect("验证");
        assert_eq!(claims.sub, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = JwtManager::new("secret-a", 3600);
        let other = JwtManager::new("secret-b", 3600);
        let token = manager.generate_token().expect("生成");
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new("test-secret", -120);
        let token = manager.generate_token().expect("生成");
        assert!(manager.validate_token(&token).is_err());
    }
}
