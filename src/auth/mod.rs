use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::database::models::User;

pub mod password;

pub use password::{check_password_strength, hash_password, verify_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub token_type: TokenType,
    pub jti: String,
    pub user_id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn for_user(user: &User, token_type: TokenType, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token_type,
            jti: Uuid::new_v4().simple().to_string(),
            user_id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            role: user.role.as_str().to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn expires_at(&self) -> chrono::DateTime<Utc> {
        chrono::DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT secret")]
    InvalidSecret,

    #[error("Token is invalid or expired")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("Expected a {expected:?} token")]
    WrongTokenType { expected: TokenType },

    #[error("Token is blacklisted")]
    Blacklisted,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Access/refresh pair handed out at login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Signs and validates HS256 tokens with the configured lifetimes
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(security: &SecurityConfig) -> Self {
        Self {
            secret: security.jwt_secret.clone(),
            access_ttl: Duration::minutes(security.access_token_minutes),
            refresh_ttl: Duration::minutes(security.refresh_token_minutes),
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access: self.issue(user, TokenType::Access)?,
            refresh: self.issue(user, TokenType::Refresh)?,
        })
    }

    pub fn issue(&self, user: &User, token_type: TokenType) -> Result<String, JwtError> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        self.sign(&Claims::for_user(user, token_type, ttl))
    }

    /// Signs arbitrary claims; used for tests that need already-expired tokens.
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        if self.secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }

        let encoding_key = EncodingKey::from_secret(self.secret.as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &encoding_key)
            .map_err(|e| JwtError::TokenGeneration(e.to_string()))
    }

    /// Validate signature, expiry and token type
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        if self.secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }

        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(JwtError::Invalid)?;

        if token_data.claims.token_type != expected {
            return Err(JwtError::WrongTokenType { expected });
        }

        Ok(token_data.claims)
    }
}

/// Short digest used to correlate tokens in logs without printing them
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}
