//! Reads the payload of an access token without checking its signature.
//!
//! The client never holds the signing secret; it only needs the expiry and
//! the user hints the server puts in the claims.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub token_type: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub role: String,
    pub exp: i64,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    /// True when the token is expired or will be within `skew`
    pub fn expires_within(&self, skew: std::time::Duration, now: DateTime<Utc>) -> bool {
        let skew = Duration::from_std(skew).unwrap_or_else(|_| Duration::zero());
        self.exp <= (now + skew).timestamp()
    }
}

pub fn decode_unverified(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(exp: i64) -> String {
        encode(
            &Header::default(),
            &json!({ "token_type": "access", "user_id": 7, "email": "dpo@example.com", "role": "dpo", "exp": exp }),
            &EncodingKey::from_secret(b"server-only"),
        )
        .unwrap()
    }

    #[test]
    fn decodes_without_the_secret() {
        let claims = decode_unverified(&token(Utc::now().timestamp() + 300)).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.role, "dpo");
        assert!(!claims.is_expired(Utc::now()));
    }

    #[test]
    fn expiry_and_skew() {
        let now = Utc::now();
        let claims = decode_unverified(&token(now.timestamp() + 20)).unwrap();
        assert!(!claims.is_expired(now));
        assert!(claims.expires_within(std::time::Duration::from_secs(30), now));
        assert!(!claims.expires_within(std::time::Duration::from_secs(5), now));

        let old = decode_unverified(&token(now.timestamp() - 1)).unwrap();
        assert!(old.is_expired(now));
    }

    #[test]
    fn garbage_is_none() {
        assert!(decode_unverified("not-a-jwt").is_none());
    }
}
