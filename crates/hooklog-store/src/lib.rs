//! Store gateway for captured request records
//!
//! The [`RecordStore`] trait is the only way the rest of the system touches
//! the key-value store. Two engines implement it:
//!
//! - [`RedisStore`]: Redis with the JSON and search modules, a small pool of
//!   multiplexed connections plus one dedicated connection per live feed
//! - [`MemoryStore`]: an in-process engine with the same semantics, used for
//!   development and tests
//!
//! # Example
//!
//! ```ignore
//! use hooklog_store::{scan_all, MemoryStore, RecordStore, SCAN_PAGE_SIZE};
//!
//! let store = MemoryStore::new();
//! let keys = scan_all(&store, SCAN_PAGE_SIZE).await?;
//! ```

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod scan;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};
pub use scan::{load_records, scan_all, HistoryLoad, SCAN_PAGE_SIZE};

use async_trait::async_trait;
use hooklog_proto::StreamCursor;
use std::collections::BTreeMap;
use std::time::Duration;

/// Value kind of a store key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    String,
    Json,
    Hash,
    Stream,
    Other,
}

impl KeyKind {
    /// Map a `TYPE` reply onto a kind
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "string" => KeyKind::String,
            "ReJSON-RL" | "json" => KeyKind::Json,
            "hash" => KeyKind::Hash,
            "stream" => KeyKind::Stream,
            _ => KeyKind::Other,
        }
    }

    /// Kinds that may hold a request document
    pub fn is_document(&self) -> bool {
        matches!(self, KeyKind::String | KeyKind::Json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedKey {
    pub key: String,
    pub kind: KeyKind,
}

/// One page of a keyspace scan. A cursor of 0 ends the scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub offset: usize,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, offset: usize, limit: usize) -> Self {
        Self {
            query: query.into(),
            offset,
            limit,
        }
    }
}

/// Index hit: the indexed key and the document as JSON text
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Total matches reported by the index
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// One entry of the append-only log with its ordered fields
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<(String, String)>,
}

/// Sequential reader over the request log.
///
/// Dropping the reader releases whatever connection it holds.
#[async_trait]
pub trait FeedReader: Send {
    /// Read the next entry after the current position, waiting at most `block`.
    ///
    /// Returns `Ok(None)` on timeout. The position advances past every
    /// returned entry.
    async fn next(&mut self, block: Duration) -> Result<Option<StreamEntry>, StoreError>;

    /// Current position; never `$` once the reader is open
    fn position(&self) -> &StreamCursor;
}

/// Access to captured records, page definitions and the request log
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Engine name for logs and health output
    fn name(&self) -> &'static str;

    /// One bounded scan step starting at `cursor`
    async fn scan(&self, cursor: u64, count: usize) -> Result<ScanPage, StoreError>;

    /// Kind of each key, in input order
    async fn key_kinds(&self, keys: &[String]) -> Result<Vec<KeyKind>, StoreError>;

    /// Raw document text for each key, `None` when absent
    async fn fetch_documents(&self, keys: &[TypedKey]) -> Result<Vec<Option<String>>, StoreError>;

    /// Remove keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, StoreError>;

    /// All page definitions as raw JSON text, keyed by endpoint
    async fn pages(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Upsert a page definition
    async fn put_page(&self, endpoint: &str, page: &str) -> Result<(), StoreError>;

    /// Delete then rewrite a page definition atomically
    async fn replace_page(&self, endpoint: &str, page: &str) -> Result<(), StoreError>;

    async fn delete_page(&self, endpoint: &str) -> Result<u64, StoreError>;

    /// Open a reader positioned at `from`; `$` resolves to the current end of the log
    async fn open_feed(&self, from: StreamCursor) -> Result<Box<dyn FeedReader>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Parse a `<millis>-<seq>` log id; a bare number means sequence 0
pub(crate) fn parse_stream_id(id: &str) -> Option<(u64, u64)> {
    match id.split_once('-') {
        Some((ms, seq)) => Some((ms.parse().ok()?, seq.parse().ok()?)),
        None => Some((id.parse().ok()?, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_kind_from_type_name() {
        assert_eq!(KeyKind::from_type_name("string"), KeyKind::String);
        assert_eq!(KeyKind::from_type_name("ReJSON-RL"), KeyKind::Json);
        assert_eq!(KeyKind::from_type_name("stream"), KeyKind::Stream);
        assert_eq!(KeyKind::from_type_name("zset"), KeyKind::Other);

        assert!(KeyKind::Json.is_document());
        assert!(!KeyKind::Hash.is_document());
        assert!(!KeyKind::Stream.is_document());
    }

    #[test]
    fn test_parse_stream_id() {
        assert_eq!(parse_stream_id("1700000000000-3"), Some((1700000000000, 3)));
        assert_eq!(parse_stream_id("42"), Some((42, 0)));
        assert_eq!(parse_stream_id("$"), None);
        assert_eq!(parse_stream_id("1-x"), None);
    }
}
