//! Streaming question answering

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::generation::Fragment;
use crate::server::state::AppState;
use crate::types::QueryRequest;

fn fragment_event(fragment: Fragment) -> Event {
    match fragment {
        // SSE field values may not carry bare carriage returns.
        Fragment::Text(text) => Event::default().data(text.replace('\r', "")),
        Fragment::Failed(message) => Event::default()
            .event("error")
            .data(message.replace('\r', "")),
    }
}

/// POST /api/pdf/chat - answer a question from the indexed PDFs as SSE
pub async fn chat(
    user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let query = request.validated()?;
    tracing::info!("Query from {}: \"{}\"", user.id, query);

    let fragments = state.engine().ask(query).await?;
    let stream = fragments.map(|fragment| Ok::<_, Infallible>(fragment_event(fragment)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
