//! Live feed of newly captured requests over Server-Sent Events
//!
//! The handshake goes out as soon as the response starts; the connection's
//! own reader on the request log is opened after it. Each log entry then
//! becomes one `data:` event whose `id:` is the entry's log id, so a client
//! can resume with `lastID`. Dropping the response (client gone) drops the
//! reader and its connection.

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use hooklog_proto::{FeedFrame, StreamCursor};
use hooklog_store::{FeedReader, RecordStore, StoreError};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::models::StreamQuery;
use crate::AppState;

/// Interval between keep-alive comments
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Body of the `error` event sent before the feed ends
pub const STREAM_FAILED: &str = r#"{"error":"Stream failed"}"#;

enum FeedPhase {
    Opening(Arc<dyn RecordStore>, StreamCursor),
    Reading(Box<dyn FeedReader>),
    Failed(StoreError),
    Done,
}

/// Live feed of new requests
#[utoipa::path(
    get,
    path = "/api/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "text/event-stream of captured requests", content_type = "text/event-stream", body = String),
        (status = 303, description = "No valid session, redirect to /login")
    ),
    tag = "records"
)]
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let cursor = StreamCursor::new(query.last_id.unwrap_or_default());
    info!("Live feed client connected (lastID={})", cursor);

    let phase = FeedPhase::Opening(state.store.clone(), cursor);

    let handshake = stream::once(async {
        Ok::<_, Infallible>(Event::default().data(FeedFrame::Handshake.encode()))
    });
    let entries = stream::unfold((phase, state.stream_block), |(phase, block)| async move {
        next_event(phase, block)
            .await
            .map(|(event, phase)| (Ok(event), (phase, block)))
    });

    Sse::new(handshake.chain(entries)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// Advance the feed until there is an event to send
async fn next_event(mut phase: FeedPhase, block: Duration) -> Option<(Event, FeedPhase)> {
    loop {
        match phase {
            FeedPhase::Done => return None,
            FeedPhase::Opening(store, cursor) => {
                phase = match store.open_feed(cursor).await {
                    Ok(reader) => {
                        debug!("Live feed reader opened at {}", reader.position());
                        FeedPhase::Reading(reader)
                    }
                    Err(e) => FeedPhase::Failed(e),
                };
            }
            FeedPhase::Failed(e) => {
                error!("Live feed failed: {}", e);
                return Some((failure_event(), FeedPhase::Done));
            }
            FeedPhase::Reading(mut reader) => match reader.next(block).await {
                Ok(None) => phase = FeedPhase::Reading(reader),
                Ok(Some(entry)) => match FeedFrame::from_fields(&entry.fields) {
                    Some(frame) => {
                        let event = Event::default().id(entry.id).data(frame.encode());
                        return Some((event, FeedPhase::Reading(reader)));
                    }
                    None => {
                        debug!("Skipping log entry {} with too few fields", entry.id);
                        phase = FeedPhase::Reading(reader);
                    }
                },
                Err(e) => phase = FeedPhase::Failed(e),
            },
        }
    }
}

fn failure_event() -> Event {
    Event::default().event("error").data(STREAM_FAILED)
}
