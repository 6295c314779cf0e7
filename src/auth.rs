use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::todo::OwnerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Access denied. No token provided.")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("token generation failed: {0}")]
    Issue(#[from] jsonwebtoken::errors::Error),
    #[error("token lifetime out of range")]
    Lifetime,
}

/// HS256 keys derived from the shared secret, plus the lifetime of issued tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        // No clock tolerance: a token is dead the second its `exp` passes.
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, AuthError> {
        let expires_at = Utc::now().checked_add_signed(self.ttl).ok_or(AuthError::Lifetime)?;
        self.issue_expiring(user_id, expires_at)
    }

    pub fn issue_expiring(&self, user_id: &str, expires_at: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims { user_id: user_id.to_string(), exp: expires_at.timestamp(), iat: Utc::now().timestamp() };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Checks signature and expiry and returns the owner the token was issued for.
    pub fn verify(&self, token: &str) -> Result<OwnerId, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            AuthError::InvalidToken
        })?;
        if data.claims.user_id.is_empty() { return Err(AuthError::InvalidToken); }
        Ok(OwnerId(data.claims.user_id))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if token.is_empty() { return Err(AuthError::MissingToken); }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys { JwtKeys::new("test-secret", Duration::hours(1)) }

    #[test]
    fn issued_token_verifies_to_owner() {
        let keys = keys();
        let token = keys.issue("user-42").unwrap();
        assert_eq!(keys.verify(&token).unwrap(), OwnerId::new("user-42"));
    }

    #[test]
    fn wrong_secret_and_expiry_are_invalid() {
        let token = keys().issue("u").unwrap();
        let other = JwtKeys::new("another-secret", Duration::hours(1));
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));

        let expired = keys().issue_expiring("u", Utc::now() - Duration::hours(2)).unwrap();
        assert!(matches!(keys().verify(&expired), Err(AuthError::InvalidToken)));
        assert!(matches!(keys().verify("not.a.jwt"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn token_expired_seconds_ago_is_invalid() {
        let keys = keys();
        let token = keys.issue_expiring("alice", Utc::now() - Duration::seconds(5)).unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn lifetime_past_the_calendar_is_an_error() {
        let keys = JwtKeys::new("test-secret", Duration::try_hours(2_500_000_000).unwrap());
        assert!(matches!(keys.issue("u"), Err(AuthError::Lifetime)));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(matches!(bearer_token(None), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Bearer ")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("   ")), Err(AuthError::MissingToken)));
    }
}
