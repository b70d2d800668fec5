//! 出站 JWT 生成和验证模块（锚点平台认证）

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CoreError, CoreResult};

/// 出站 token 的 subject
pub const TOKEN_SUBJECT: &str = "disbursement-core";

const MIN_SECRET_LEN: usize = 12;
const MIN_EXPIRATION_MS: i64 = 5000;

/// JWT Claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject
    pub jti: String, // 锚点平台交易 ID
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

pub struct JwtManager {
    secret: Zeroizing<Vec<u8>>,
    expiration_ms: i64,
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("expiration_ms", &self.expiration_ms)
            .finish_non_exhaustive()
    }
}

impl JwtManager {
    pub fn new(secret: &str, expiration_ms: i64) -> CoreResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CoreError::validation(format!(
                "secret is required to have at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        if expiration_ms < MIN_EXPIRATION_MS {
            return Err(CoreError::validation(format!(
                "expiration milliseconds is required to be at least {}",
                MIN_EXPIRATION_MS
            )));
        }
        Ok(Self {
            secret: Zeroizing::new(secret.as_bytes().to_vec()),
            expiration_ms,
        })
    }

    /// 生成带交易 ID 的默认 token
    pub fn generate_default_token(&self, transaction_id: &str) -> CoreResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: TOKEN_SUBJECT.to_string(),
            jti: transaction_id.to_string(),
            exp: (now + Duration::milliseconds(self.expiration_ms)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| CoreError::authentication(format!("failed to encode token: {}", e)))
    }

    pub fn parse_default_token_claims(&self, token: &str) -> CoreResult<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 10; // 允许10秒时钟偏差

        let data = decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(|e| {
                tracing::warn!("JWT: token verification failed: {}", e);
                CoreError::authentication(format!("token verification failed: {}", e))
            })?;

        if data.claims.sub != TOKEN_SUBJECT {
            return Err(CoreError::authentication("invalid token subject"));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validation() {
        let err = JwtManager::new("short", 5000).unwrap_err();
        assert_eq!(err.to_string(), "secret is required to have at least 12 characters");

        let err = JwtManager::new("1234567890ab", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expiration milliseconds is required to be at least 5000"
        );

        assert!(JwtManager::new("1234567890ab", 5000).is_ok());
    }

    #[test]
    fn test_generate_and_parse_default_token() {
        let manager = JwtManager::new("1234567890ab", 5000).unwrap();
        let token = manager.generate_default_token("test-transaction-id").unwrap();

        let claims = manager.parse_default_token_claims(&token).unwrap();
        assert_eq!(claims.jti, "test-transaction-id");
        assert_eq!(claims.sub, TOKEN_SUBJECT);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_parse_with_other_secret_fails() {
        let manager = JwtManager::new("1234567890ab", 5000).unwrap();
        let other = JwtManager::new("ba0987654321", 5000).unwrap();
        let token = manager.generate_default_token("tx").unwrap();

        let err = other.parse_default_token_claims(&token).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Authentication);
    }
}
