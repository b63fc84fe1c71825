//! HTTP API v1: queue status for dashboards.
//!
//! Endpoints:
//!
//! - `GET /v1/queue`         current queue snapshot
//! - `GET /v1/queue/events`  SSE stream of deduplicated status changes
//!
//! SSE events carry `id` = resumption token, `event` = `queue_status` and the
//! snapshot as JSON data. There is no backlog, so a `Last-Event-ID` header on
//! reconnect is accepted and ignored.

use axum::{
    Router,
    extract::State,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tracing::debug;

use markwright_queue::{QueueStatus, StatusEvent};

use crate::SharedState;

/// SSE event name for queue status changes.
pub const QUEUE_STATUS_EVENT: &str = "queue_status";

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/queue", get(queue_status_handler))
        .route("/queue/events", get(queue_events_handler))
        .with_state(state)
}

async fn queue_status_handler(State(state): State<SharedState>) -> Json<QueueStatus> {
    Json(state.queue.status())
}

async fn queue_events_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.broadcaster.subscribe();
    debug!(
        subscribers = state.broadcaster.subscriber_count(),
        "Queue status subscriber attached"
    );
    let stream = subscription.into_stream().map(|event| Ok(to_sse(&event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(event: &StatusEvent) -> SseEvent {
    let data = serde_json::to_string(&event.status).unwrap_or_default();
    SseEvent::default()
        .id(event.token.to_string())
        .event(QUEUE_STATUS_EVENT)
        .data(data)
}
