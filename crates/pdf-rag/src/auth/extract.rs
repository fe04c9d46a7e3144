//! Bearer token extractor

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use std::sync::Arc;

use crate::error::{AuthError, Error};

use super::token::{Claims, TokenService};

/// The authenticated caller. Handlers taking this argument never run for
/// requests without a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub claims: Claims,
}

/// Token after the scheme in `Authorization: <scheme> <token>`
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (_, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = Arc::<TokenService>::from_ref(state);
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;

        // Expired and malformed access tokens get the same answer.
        let claims = tokens.verify_access(token).map_err(|e| {
            tracing::debug!("Rejected access token: {}", e);
            AuthError::Invalid
        })?;

        Ok(AuthUser {
            id: claims.id.clone(),
            claims,
        })
    }
}
