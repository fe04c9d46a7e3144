//! Account endpoints

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};

use crate::auth::cookie::{self, REFRESH_COOKIE};
use crate::auth::IssuedSession;
use crate::error::Result;
use crate::server::state::AppState;
use crate::types::auth::{LoginRequest, MessageResponse, RefreshResponse, RegisterRequest};

fn with_refresh_cookie(state: &AppState, session: IssuedSession) -> impl IntoResponse {
    let cookie = cookie::refresh_cookie(
        &session.refresh_token,
        state.auth().tokens().refresh_ttl(),
        state.config().auth.secure_cookies,
    );
    ([(header::SET_COOKIE, cookie)], Json(session.body))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let session = state.auth().register(request).await?;
    Ok(with_refresh_cookie(&state, session))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let session = state.auth().login(request).await?;
    Ok(with_refresh_cookie(&state, session))
}

/// POST /api/auth/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>> {
    let token = cookie::read_cookie(&headers, REFRESH_COOKIE);
    Ok(Json(state.auth().refresh(token.as_deref())?))
}

/// POST /api/auth/logout
pub async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, cookie::clear_refresh_cookie())],
        Json(MessageResponse {
            msg: "Logged out successfully".to_string(),
        }),
    )
}
