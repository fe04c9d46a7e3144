//! HS256 JSON web tokens

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use ring::hmac;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

/// Token payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User id
    pub id: String,
    /// Issued at, unix seconds
    pub iat: i64,
    /// Expiry, unix seconds
    pub exp: i64,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

fn encode_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}

fn decode_json<T: DeserializeOwned>(segment: &str) -> std::result::Result<T, AuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::Invalid)?;
    serde_json::from_slice(&raw).map_err(|_| AuthError::Invalid)
}

/// Issues and checks tokens for one secret and lifetime
pub struct TokenSigner {
    key: hmac::Key,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &str) -> Result<(String, Claims)> {
        self.issue_at(subject, Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now` (unix seconds)
    pub fn issue_at(&self, subject: &str, now: i64) -> Result<(String, Claims)> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            id: subject.to_string(),
            iat: now,
            exp: now + self.ttl.num_seconds(),
        };

        let signing_input = format!("{}.{}", encode_json(&header)?, encode_json(&claims)?);
        let signature = hmac::sign(&self.key, signing_input.as_bytes());
        let token = format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.as_ref())
        );

        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Check signature, algorithm and expiry. A well-signed token past its
    /// `exp` is `Expired`; anything else wrong is `Invalid`.
    pub fn verify_at(&self, token: &str, now: i64) -> std::result::Result<Claims, AuthError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthError::Invalid);
        };

        let signing_input = &token[..header.len() + 1 + payload.len()];
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Invalid)?;
        hmac::verify(&self.key, signing_input.as_bytes(), &signature)
            .map_err(|_| AuthError::Invalid)?;

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(AuthError::Invalid);
        }

        let claims: Claims = decode_json(payload)?;
        if claims.exp <= now {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

/// Newly issued access + refresh tokens
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_claims: Claims,
}

/// Access and refresh signers, each with its own secret
pub struct TokenService {
    access: TokenSigner,
    refresh: TokenSigner,
}

impl TokenService {
    pub fn new(access: TokenSigner, refresh: TokenSigner) -> Self {
        Self { access, refresh }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            TokenSigner::new(
                &config.access_secret,
                Duration::minutes(config.access_ttl_minutes as i64),
            ),
            TokenSigner::new(
                &config.refresh_secret,
                Duration::days(config.refresh_ttl_days as i64),
            ),
        )
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl()
    }

    pub fn issue_pair(&self, user_id: &str) -> Result<TokenPair> {
        let (access_token, _) = self.access.issue(user_id)?;
        let (refresh_token, refresh_claims) = self.refresh.issue(user_id)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_claims,
        })
    }

    /// Exchange a refresh token for a new access token
    pub fn refresh(&self, refresh_token: &str) -> Result<(String, Claims)> {
        self.refresh_at(refresh_token, Utc::now().timestamp())
    }

    pub fn refresh_at(&self, refresh_token: &str, now: i64) -> Result<(String, Claims)> {
        let claims = self
            .refresh
            .verify_at(refresh_token, now)
            .map_err(|e| match e {
                AuthError::Expired => AuthError::RefreshExpired,
                other => other,
            })?;
        self.access.issue_at(&claims.id, now)
    }

    pub fn verify_access(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        self.access.verify(token)
    }
}
