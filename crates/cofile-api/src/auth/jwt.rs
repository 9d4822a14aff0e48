//! HS256 bearer tokens
//!
//! Identity is issued elsewhere; this service only needs to verify tokens signed
//! with the shared secret. `issue_token` exists for operators and tests.

use crate::auth::models::{Caller, JwtClaims, UserRole};
use chrono::{Duration, Utc};
use cofile_core::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue_token(
        &self,
        user_id: Uuid,
        role: UserRole,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            role: role.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Caller, AppError> {
        let data = decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;
        let role = data
            .claims
            .role
            .parse()
            .map_err(|e: anyhow::Error| AppError::Unauthorized(e.to_string()))?;
        Ok(Caller {
            user_id: data.claims.sub,
            role,
        })
    }
}
