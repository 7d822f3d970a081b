//! Server-Sent Events for real-time snapshot updates

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::session::SessionSnapshot;
use crate::AppState;

/// SSE event name for snapshot updates
pub const SNAPSHOT_EVENT: &str = "snapshot";

/// Create an SSE stream of session snapshots.
///
/// The current snapshot is sent first so a new client renders immediately.
pub async fn create_snapshot_stream(
    app_state: Arc<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = app_state.subscribe();
    let current = app_state.get_snapshot().await;

    let updates = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(snapshot) => Some(snapshot),
        Err(_) => None, // Skip lagged messages
    });

    let stream = tokio_stream::iter(vec![current])
        .chain(updates)
        .filter_map(|snapshot| snapshot_to_event(&snapshot).map(Ok));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Convert a snapshot to an SSE event
fn snapshot_to_event(snapshot: &SessionSnapshot) -> Option<Event> {
    match Event::default().event(SNAPSHOT_EVENT).json_data(snapshot) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Failed to encode snapshot event: {}", e);
            None
        }
    }
}
