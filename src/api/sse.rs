//! Server-Sent Events support

use crate::state_machine::ClientEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Convert a relay's event channel to an SSE response.
///
/// Dropping the response (client gone) drops the receiver, which the relay
/// observes as a disconnect.
pub fn sse_stream(
    events: mpsc::Receiver<ClientEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(events).map(|event| Ok(client_event_to_axum(&event)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn client_event_to_axum(event: &ClientEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize client event");
        r#"{"type":"error","payload":"internal serialization error"}"#.to_string()
    });
    Event::default().event(event.event_name()).data(data)
}
