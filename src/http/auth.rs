use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::auth::{bearer_token, AuthError, JwtKeys};
use crate::domain::todo::OwnerId;
use crate::http::types::ApiError;

/// Caller identity resolved from the bearer token. Rejects with 401 before
/// any handler body runs.
#[derive(Debug, Clone)]
pub struct AuthUser(pub OwnerId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<JwtKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().map_err(|_| AuthError::InvalidToken))
            .transpose()?;
        let token = bearer_token(header)?;
        let keys = Arc::<JwtKeys>::from_ref(state);
        Ok(AuthUser(keys.verify(token)?))
    }
}
