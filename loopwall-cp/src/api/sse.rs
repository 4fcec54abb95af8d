//! Server-Sent Events (SSE) push channel
//!
//! One stream per connected player, filtered to its display from the shared
//! broadcast bus. Push reduces latency after admin actions; it is never the
//! source of truth — the pull channel recovers anything missed.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::server::AppContext;
use crate::api::{error_response, ApiError};
use crate::db::displays;

/// GET /displays/:display_id/events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Unknown displays get a 404 instead of a silent empty stream
    displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    debug!("New SSE client connected for display {}", display_id);

    let rx = ctx.state.subscribe_events();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.display_id() == display_id => {
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        let event_type = event.event_type();
                        debug!("Broadcasting SSE event: {}", event_type);
                        Some(Ok(Event::default().event(event_type).data(json)))
                    }
                    Err(e) => {
                        warn!("Failed to serialize event: {}", e);
                        None
                    }
                }
            }
            // Events for other displays are filtered out
            Ok(_) => None,
            Err(e) => {
                // BroadcastStream error (lagged or closed)
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
