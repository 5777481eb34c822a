//! `GET /api/stream`: the live update stream as server-sent events.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::StreamExt;

use crate::error::Result;
use crate::live;
use crate::state::AppState;

/// Open a live stream. The first message is always the `initial` snapshot.
pub async fn stream(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let live = live::open(state.store.as_ref(), &state.hub).await?;

    let events = live.map(|payload| Ok::<_, Infallible>(Event::default().data(&*payload)));
    let sse = Sse::new(events).keep_alive(KeepAlive::default());

    Ok(([(header::CONNECTION, "keep-alive")], sse))
}
