//! API routes for the RAG server

pub mod auth;
pub mod chat;

use axum::{routing::post, Router};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Accounts and tokens
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        // Question answering
        .route("/pdf/chat", post(chat::chat))
}
