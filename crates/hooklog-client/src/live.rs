//! Live feed driver
//!
//! Runs the [`FeedMachine`] over real connections: opens `/api/stream`
//! from the persisted cursor, parses events, saves the cursor after every
//! record and reconnects with backoff until cancelled.

use futures::StreamExt;
use hooklog_proto::{RequestRecord, StreamCursor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffConfig;
use crate::client::{ClientError, DashboardClient};
use crate::cursor::CursorStore;
use crate::feed::{FeedMachine, FeedMessage};

/// What the driver reports to its consumer
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    /// The feed is open
    Connected,
    /// A new record arrived
    Record(RequestRecord),
    /// A frame could not be used; the connection stays up
    BadFrame(String),
    /// The connection dropped; next attempt after `retry_in`
    Disconnected { reason: String, retry_in: Duration },
    /// The server rejected the session; no more attempts
    Unauthorized,
    /// The driver stopped
    Closed,
}

enum SessionEnd {
    /// Connection lost or refused
    Failed(String),
    Unauthorized,
    /// Nobody is listening for updates any more
    ReceiverGone,
}

/// Keeps a live feed connection up and forwards what it carries
pub struct LiveFeed {
    client: DashboardClient,
    cursors: Arc<dyn CursorStore>,
    backoff: BackoffConfig,
}

impl LiveFeed {
    pub fn new(client: DashboardClient, cursors: Arc<dyn CursorStore>) -> Self {
        Self {
            client,
            cursors,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn spawn(
        self,
        updates: mpsc::Sender<LiveUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(updates, cancel))
    }

    /// Run until cancelled, the session is rejected or `updates` is closed
    pub async fn run(self, updates: mpsc::Sender<LiveUpdate>, cancel: CancellationToken) {
        let cursor = self.cursors.load().unwrap_or_else(|e| {
            warn!("Failed to load cursor, starting from latest: {}", e);
            StreamCursor::latest()
        });
        let mut machine = FeedMachine::new(cursor, self.backoff.clone());

        loop {
            info!("Connecting to live feed (lastID={})", machine.cursor());

            let end = tokio::select! {
                _ = cancel.cancelled() => break,
                end = self.connection(&mut machine, &updates) => end,
            };

            let reason = match end {
                SessionEnd::Failed(reason) => reason,
                SessionEnd::Unauthorized => {
                    warn!("Live feed rejected: session invalid");
                    let _ = updates.send(LiveUpdate::Unauthorized).await;
                    break;
                }
                SessionEnd::ReceiverGone => break,
            };

            let retry_in = match machine.failed() {
                Ok(delay) => delay,
                Err(e) => {
                    warn!("Live feed state error: {}", e);
                    break;
                }
            };
            warn!(
                "Live feed disconnected ({}), retrying in {}ms",
                reason,
                retry_in.as_millis()
            );
            let notice = LiveUpdate::Disconnected { reason, retry_in };
            if updates.send(notice).await.is_err() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(retry_in) => {}
            }
            if let Err(e) = machine.retry_due() {
                warn!("Live feed state error: {}", e);
                break;
            }
        }

        machine.teardown();
        info!("Live feed closed");
        let _ = updates.send(LiveUpdate::Closed).await;
    }

    /// One connection, from open until it drops
    async fn connection(
        &self,
        machine: &mut FeedMachine,
        updates: &mpsc::Sender<LiveUpdate>,
    ) -> SessionEnd {
        let response = match self.client.open_stream(machine.cursor()).await {
            Ok(response) => response,
            Err(ClientError::Unauthorized) => return SessionEnd::Unauthorized,
            Err(e) => return SessionEnd::Failed(e.to_string()),
        };

        if let Err(e) = machine.opened() {
            return SessionEnd::Failed(e.to_string());
        }
        if updates.send(LiveUpdate::Connected).await.is_err() {
            return SessionEnd::ReceiverGone;
        }

        let mut parser = crate::sse::SseParser::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return SessionEnd::Failed(e.to_string()),
            };
            parser.push(&chunk);

            while let Some(event) = parser.next_event() {
                if event.event == "error" {
                    return SessionEnd::Failed(format!("server error event: {}", event.data));
                }

                let update = match machine.on_message(event.id.as_deref(), &event.data) {
                    Ok(FeedMessage::Handshake) => {
                        debug!("Live feed handshake received");
                        continue;
                    }
                    Ok(FeedMessage::Record(record)) => {
                        if let Err(e) = self.cursors.save(machine.cursor()) {
                            warn!("Failed to save cursor {}: {}", machine.cursor(), e);
                        }
                        LiveUpdate::Record(record)
                    }
                    Err(e) => {
                        warn!("Unusable live feed frame: {}", e);
                        LiveUpdate::BadFrame(e.to_string())
                    }
                };

                if updates.send(update).await.is_err() {
                    return SessionEnd::ReceiverGone;
                }
            }
        }

        SessionEnd::Failed("stream ended".to_string())
    }
}
