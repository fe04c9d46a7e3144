//! Authentication: password accounts, HS256 access/refresh tokens, bearer
//! extraction for protected routes

pub mod cookie;
mod extract;
mod password;
mod store;
mod token;

pub use extract::AuthUser;
pub use password::{PasswordHasher, DEFAULT_ITERATIONS};
pub use store::{User, UserStore};
pub use token::{Claims, TokenPair, TokenService, TokenSigner};

use chrono::Utc;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::config::AuthConfig;
use crate::error::{AuthError, Error, Result};
use crate::types::auth::{LoginRequest, RefreshResponse, RegisterRequest, SessionResponse};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

/// Session plus the refresh token to set as a cookie
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub body: SessionResponse,
    pub refresh_token: String,
}

/// Account registration, login and token refresh
pub struct AuthService {
    users: UserStore,
    tokens: Arc<TokenService>,
    hasher: PasswordHasher,
}

impl AuthService {
    pub fn new(users: UserStore, tokens: Arc<TokenService>, hasher: PasswordHasher) -> Self {
        Self {
            users,
            tokens,
            hasher,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Ok(Self::new(
            UserStore::new(&config.database_path)?,
            Arc::new(TokenService::from_config(config)),
            PasswordHasher::default(),
        ))
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Create an account and sign it in
    pub async fn register(&self, request: RegisterRequest) -> Result<IssuedSession> {
        let email = request.email.trim().to_lowercase();
        if !email_regex().is_match(&email) {
            return Err(Error::validation("A valid email address is required"));
        }
        if request.password.is_empty() {
            return Err(Error::validation("Password is required"));
        }
        if self.users.find_by_email(&email)?.is_some() {
            return Err(AuthError::EmailTaken.into());
        }

        let name = request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let hasher = self.hasher.clone();
        let password = request.password;
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))??;

        let user = self.users.create_user(&name, &email, &hash)?;
        tracing::info!("Registered user {}", user.id);
        self.session(&user)
    }

    /// Check credentials and sign in. Unknown email and wrong password are
    /// indistinguishable to the caller.
    pub async fn login(&self, request: LoginRequest) -> Result<IssuedSession> {
        let email = request.email.trim().to_lowercase();
        let user = self
            .users
            .find_by_email(&email)?
            .ok_or(AuthError::InvalidCredentials)?;

        let hasher = self.hasher.clone();
        let stored = user.password_hash.clone();
        let password = request.password;
        let valid = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?;

        if !valid {
            return Err(AuthError::InvalidCredentials.into());
        }
        self.session(&user)
    }

    /// New access token for the refresh cookie value, if any
    pub fn refresh(&self, refresh_token: Option<&str>) -> Result<RefreshResponse> {
        let token = refresh_token.ok_or(AuthError::MissingToken)?;
        let (access_token, _) = self.tokens.refresh(token)?;
        Ok(RefreshResponse { access_token })
    }

    fn session(&self, user: &User) -> Result<IssuedSession> {
        let pair = self.tokens.issue_pair(&user.id)?;
        let expiration_time = pair.refresh_claims.exp * 1000 - Utc::now().timestamp_millis();

        Ok(IssuedSession {
            body: SessionResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token.clone(),
                expiration_time,
                name: user.name.clone(),
            },
            refresh_token: pair.refresh_token,
        })
    }
}
