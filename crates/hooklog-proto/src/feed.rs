//! Live feed envelope and stream cursor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Value of the `message` field in the first event of every feed
pub const HANDSHAKE_MESSAGE: &str = "Connected!";

/// Position in the append-only request log.
///
/// Holds the log's native entry id. `$` means "only entries appended after
/// the reader opens".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamCursor(String);

impl StreamCursor {
    pub const LATEST: &'static str = "$";

    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.trim().is_empty() {
            Self::latest()
        } else {
            Self(id.trim().to_string())
        }
    }

    pub fn latest() -> Self {
        Self(Self::LATEST.to_string())
    }

    pub fn is_latest(&self) -> bool {
        self.0 == Self::LATEST
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StreamCursor {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for StreamCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamCursor {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame carries no string entry")]
    Empty,
}

/// One event carried by the live feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    /// Sent once when the feed opens
    Handshake,
    /// `key` is the record key, `payload` the record document as JSON text
    Record { key: String, payload: String },
}

impl FeedFrame {
    /// Build a record frame from the ordered fields of a log entry.
    ///
    /// The first field's value becomes the key and the second field's value
    /// the payload. Entries with fewer than two fields yield `None`.
    pub fn from_fields(fields: &[(String, String)]) -> Option<Self> {
        match fields {
            [(_, key), (_, payload), ..] => Some(FeedFrame::Record {
                key: key.clone(),
                payload: payload.clone(),
            }),
            _ => None,
        }
    }

    /// Encode as the single-line JSON carried in an SSE `data:` field
    pub fn encode(&self) -> String {
        let mut object = serde_json::Map::with_capacity(1);
        match self {
            FeedFrame::Handshake => {
                object.insert(
                    "message".to_string(),
                    serde_json::Value::String(HANDSHAKE_MESSAGE.to_string()),
                );
            }
            FeedFrame::Record { key, payload } => {
                object.insert(key.clone(), serde_json::Value::String(payload.clone()));
            }
        }
        serde_json::Value::Object(object).to_string()
    }

    pub fn parse(data: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value =
            serde_json::from_str(data).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let object = value.as_object().ok_or(FrameError::NotAnObject)?;

        if object.get("message").and_then(|m| m.as_str()) == Some(HANDSHAKE_MESSAGE) {
            return Ok(FeedFrame::Handshake);
        }

        object
            .iter()
            .find_map(|(key, value)| {
                value.as_str().map(|payload| FeedFrame::Record {
                    key: key.clone(),
                    payload: payload.to_string(),
                })
            })
            .ok_or(FrameError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cursor_defaults_to_latest() {
        assert!(StreamCursor::default().is_latest());
        assert!(StreamCursor::new("  ").is_latest());
        assert_eq!("1700000000000-0".parse::<StreamCursor>().unwrap().as_str(), "1700000000000-0");
        assert_eq!(StreamCursor::latest().to_string(), "$");
    }

    #[test]
    fn test_handshake_round_trip() {
        let encoded = FeedFrame::Handshake.encode();
        assert_eq!(encoded, r#"{"message":"Connected!"}"#);
        assert_eq!(FeedFrame::parse(&encoded).unwrap(), FeedFrame::Handshake);
    }

    #[test]
    fn test_record_frame_from_log_fields() {
        let frame = FeedFrame::from_fields(&fields(&[
            ("key", "1700000000000"),
            ("value", "{\"method\":\"GET\"}"),
            ("id", "abc"),
        ]))
        .unwrap();

        assert_eq!(
            frame,
            FeedFrame::Record {
                key: "1700000000000".to_string(),
                payload: "{\"method\":\"GET\"}".to_string(),
            }
        );
        assert!(FeedFrame::from_fields(&fields(&[("key", "1")])).is_none());
        assert!(FeedFrame::from_fields(&[]).is_none());
    }

    #[test]
    fn test_encoded_frame_is_single_line() {
        let frame = FeedFrame::Record {
            key: "7".to_string(),
            payload: "{\"body\":\"line one\nline two\r\n\"}".to_string(),
        };
        let encoded = frame.encode();

        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('\r'));
        assert_eq!(FeedFrame::parse(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_other_message_is_a_record() {
        let frame = FeedFrame::parse(r#"{"message":"hello"}"#).unwrap();
        assert!(matches!(frame, FeedFrame::Record { ref key, .. } if key == "message"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            FeedFrame::parse("not json"),
            Err(FrameError::InvalidJson(_))
        ));
        assert_eq!(FeedFrame::parse("[1,2]"), Err(FrameError::NotAnObject));
        assert_eq!(FeedFrame::parse("{}"), Err(FrameError::Empty));
        assert_eq!(FeedFrame::parse(r#"{"a":1}"#), Err(FrameError::Empty));
    }
}
