//! Application state for the RAG server

use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::{AuthService, TokenService};
use crate::config::RagConfig;
use crate::engine::RagEngine;
use crate::error::Result;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Retrieval + generation
    engine: Arc<RagEngine>,
    /// Account and token handling
    auth: Arc<AuthService>,
}

impl AppState {
    /// Create new application state. Loads the embedding model and opens the
    /// user database; the index itself is prepared later.
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!(
            "Initializing application state (embeddings: {}, llm: {:?} {})",
            config.embeddings.model,
            config.llm.backend,
            config.llm.generate_model
        );

        let engine = Arc::new(RagEngine::from_config(&config).await?);
        let auth = Arc::new(AuthService::from_config(&config.auth)?);
        tracing::info!("User database at {}", config.auth.database_path.display());

        Ok(Self::from_parts(config, engine, auth))
    }

    /// Assemble state from already constructed services
    pub fn from_parts(config: RagConfig, engine: Arc<RagEngine>, auth: Arc<AuthService>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine,
                auth,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &Arc<RagEngine> {
        &self.inner.engine
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.inner.auth
    }

    /// Whether the index is loaded and queries can be answered
    pub fn is_ready(&self) -> bool {
        self.inner.engine.pipeline().is_ready()
    }
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(state.inner.auth.tokens())
    }
}
