//! Connection state machine for the live feed
//!
//! ```text
//! Connecting --opened--> Connected --message--> Connected
//!     |                      |
//!   failed                 failed
//!     v                      v
//!   Backoff --retry due--> Connecting          any --teardown--> Closed
//! ```

use hooklog_proto::{
    parse_record_key, CapturedRequest, FeedFrame, FrameError, RequestRecord, StreamCursor,
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::backoff::{Backoff, BackoffConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Backoff,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Backoff => "error-backoff",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    Opened,
    Message,
    Failed,
    RetryDue,
    Teardown,
}

/// Next state for `event` in `state`, or `None` if the transition is not allowed
pub fn transition(state: ConnectionState, event: FeedEvent) -> Option<ConnectionState> {
    use ConnectionState as S;
    use FeedEvent as E;

    match (state, event) {
        (_, E::Teardown) => Some(S::Closed),
        (S::Connecting, E::Opened) => Some(S::Connected),
        (S::Connecting, E::Failed) => Some(S::Backoff),
        (S::Connected, E::Message) => Some(S::Connected),
        (S::Connected, E::Failed) => Some(S::Backoff),
        (S::Backoff, E::RetryDue) => Some(S::Connecting),
        _ => None,
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FeedError {
    #[error("{event:?} is not allowed while {state}")]
    InvalidTransition {
        state: ConnectionState,
        event: FeedEvent,
    },

    #[error("bad frame: {0}")]
    Frame(#[from] FrameError),

    #[error("bad record key {0:?}")]
    RecordKey(String),

    #[error("bad record {key}: {reason}")]
    Record { key: String, reason: String },
}

/// A successfully handled feed message
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Handshake,
    Record(RequestRecord),
}

/// Feed connection state, reconnect delays and resume position
#[derive(Debug, Clone)]
pub struct FeedMachine {
    state: ConnectionState,
    backoff: Backoff,
    cursor: StreamCursor,
}

impl FeedMachine {
    pub fn new(cursor: StreamCursor, backoff: BackoffConfig) -> Self {
        Self {
            state: ConnectionState::Connecting,
            backoff: Backoff::new(backoff),
            cursor,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Where a (re)connect resumes from
    pub fn cursor(&self) -> &StreamCursor {
        &self.cursor
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    fn apply(&mut self, event: FeedEvent) -> Result<ConnectionState, FeedError> {
        let next = transition(self.state, event).ok_or(FeedError::InvalidTransition {
            state: self.state,
            event,
        })?;
        debug!("Feed {} -> {} on {:?}", self.state, next, event);
        self.state = next;
        Ok(next)
    }

    /// The connection opened; the backoff starts over
    pub fn opened(&mut self) -> Result<(), FeedError> {
        self.apply(FeedEvent::Opened)?;
        self.backoff.reset();
        Ok(())
    }

    /// The connection failed; returns how long to wait before retrying
    pub fn failed(&mut self) -> Result<Duration, FeedError> {
        self.apply(FeedEvent::Failed)?;
        Ok(self.backoff.next_delay())
    }

    pub fn retry_due(&mut self) -> Result<(), FeedError> {
        self.apply(FeedEvent::RetryDue).map(|_| ())
    }

    pub fn teardown(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Handle one `data:` payload.
    ///
    /// A record moves the cursor to `event_id`, or to the frame key when the
    /// event carries no id. Errors about the frame itself leave the state and
    /// the cursor as they were.
    pub fn on_message(
        &mut self,
        event_id: Option<&str>,
        data: &str,
    ) -> Result<FeedMessage, FeedError> {
        if transition(self.state, FeedEvent::Message).is_none() {
            return Err(FeedError::InvalidTransition {
                state: self.state,
                event: FeedEvent::Message,
            });
        }

        match FeedFrame::parse(data)? {
            FeedFrame::Handshake => Ok(FeedMessage::Handshake),
            FeedFrame::Record { key, payload } => {
                let record_key =
                    parse_record_key(&key).ok_or_else(|| FeedError::RecordKey(key.clone()))?;
                let request =
                    CapturedRequest::from_json(&payload).map_err(|e| FeedError::Record {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;

                let position = event_id
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .unwrap_or(key.as_str());
                self.cursor = StreamCursor::new(position);
                Ok(FeedMessage::Record(RequestRecord::new(record_key, request)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::{Closed, Connected, Connecting};
    use FeedEvent::{Failed, Message, Opened, RetryDue, Teardown};

    const PAYLOAD: &str = r#"{"method":"GET","path":"/x","timestamp":"2025-01-01T00:00:00Z"}"#;

    fn record_frame(key: &str) -> String {
        FeedFrame::Record {
            key: key.to_string(),
            payload: PAYLOAD.to_string(),
        }
        .encode()
    }

    fn connected() -> FeedMachine {
        let mut machine = FeedMachine::new(StreamCursor::latest(), BackoffConfig::default());
        machine.opened().unwrap();
        machine
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(Connecting, Opened), Some(Connected));
        assert_eq!(transition(Connecting, Failed), Some(ConnectionState::Backoff));
        assert_eq!(transition(Connected, Message), Some(Connected));
        assert_eq!(transition(Connected, Failed), Some(ConnectionState::Backoff));
        assert_eq!(transition(ConnectionState::Backoff, RetryDue), Some(Connecting));
        for state in [Connecting, Connected, ConnectionState::Backoff, Closed] {
            assert_eq!(transition(state, Teardown), Some(Closed));
        }

        assert_eq!(transition(Connecting, Message), None);
        assert_eq!(transition(ConnectionState::Backoff, Opened), None);
        assert_eq!(transition(Connected, RetryDue), None);
        assert_eq!(transition(Closed, Opened), None);
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let mut machine = connected();
        let err = machine.retry_due().unwrap_err();

        assert!(matches!(err, FeedError::InvalidTransition { .. }));
        assert_eq!(machine.state(), Connected);
    }

    #[test]
    fn test_backoff_grows_and_resets_on_open() {
        let mut machine = FeedMachine::new(StreamCursor::latest(), BackoffConfig::default());

        assert_eq!(machine.failed().unwrap(), Duration::from_millis(1000));
        machine.retry_due().unwrap();
        assert_eq!(machine.failed().unwrap(), Duration::from_millis(2000));
        machine.retry_due().unwrap();
        machine.opened().unwrap();
        assert_eq!(machine.failed().unwrap(), Duration::from_millis(1000));
    }

    #[test]
    fn test_record_moves_cursor_to_event_id() {
        let mut machine = connected();

        let message = machine
            .on_message(Some("1700000000000-0"), &record_frame("42"))
            .unwrap();
        match message {
            FeedMessage::Record(record) => assert_eq!(record.key, 42),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(machine.cursor().as_str(), "1700000000000-0");
        assert_eq!(machine.state(), Connected);
    }

    #[test]
    fn test_cursor_falls_back_to_frame_key() {
        let mut machine = connected();
        machine.on_message(None, &record_frame("42")).unwrap();

        assert_eq!(machine.cursor().as_str(), "42");
    }

    #[test]
    fn test_handshake_is_ignored() {
        let mut machine = connected();
        let message = machine
            .on_message(None, &FeedFrame::Handshake.encode())
            .unwrap();

        assert_eq!(message, FeedMessage::Handshake);
        assert!(machine.cursor().is_latest());
    }

    #[test]
    fn test_bad_frames_keep_connection_and_cursor() {
        let mut machine = connected();

        assert!(matches!(
            machine.on_message(Some("1-0"), "not json"),
            Err(FeedError::Frame(_))
        ));
        assert!(matches!(
            machine.on_message(Some("1-0"), r#"{"abc":"{}"}"#),
            Err(FeedError::RecordKey(_))
        ));
        assert!(matches!(
            machine.on_message(Some("1-0"), r#"{"7":"not a record"}"#),
            Err(FeedError::Record { .. })
        ));

        assert_eq!(machine.state(), Connected);
        assert!(machine.cursor().is_latest());
    }

    #[test]
    fn test_message_before_open_is_rejected() {
        let mut machine = FeedMachine::new(StreamCursor::latest(), BackoffConfig::default());

        assert!(machine.on_message(None, &record_frame("1")).is_err());
        assert_eq!(machine.state(), Connecting);
    }
}
