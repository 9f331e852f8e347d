//! In-process store engine
//!
//! Keeps the same key layout as the Redis deployment: one JSON document per
//! record key, the request log under [`STREAM_KEY`] and page definitions in
//! the [`PAGES_KEY`] hash. `insert_record` plays the capture service's part.

use async_trait::async_trait;
use hooklog_proto::{
    index_field, FieldKind, IndexField, RequestRecord, StreamCursor, INDEX_FIELDS, PAGES_KEY,
    STREAM_KEY,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    parse_stream_id, FeedReader, KeyKind, RecordStore, ScanPage, SearchHit, SearchPage,
    SearchQuery, StoreError, StreamEntry, TypedKey,
};

type StreamId = (u64, u64);

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Json(String),
    Hash(BTreeMap<String, String>),
    Stream(Vec<(StreamId, Vec<(String, String)>)>),
}

impl Value {
    fn kind(&self) -> KeyKind {
        match self {
            Value::String(_) => KeyKind::String,
            Value::Json(_) => KeyKind::Json,
            Value::Hash(_) => KeyKind::Hash,
            Value::Stream(_) => KeyKind::Stream,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Value>,
    last_id: StreamId,
}

/// In-memory [`RecordStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    appended: Arc<Notify>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a connection error until reset
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        self.appended.notify_waiters();
    }

    /// Store a record document and append it to the request log.
    ///
    /// Returns the log id of the appended entry.
    pub fn insert_record(&self, record: &RequestRecord) -> Result<String, StoreError> {
        self.check()?;
        let key = record.key.to_string();
        let document = serde_json::to_string(&record.request)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        self.lock()
            .entries
            .insert(key.clone(), Value::Json(document.clone()));
        self.append_entry(vec![
            ("key".to_string(), key.clone()),
            ("value".to_string(), document),
            ("id".to_string(), key),
        ])
    }

    /// Store a raw JSON document without touching the log
    pub fn set_document(&self, key: &str, document: &str) {
        self.lock()
            .entries
            .insert(key.to_string(), Value::Json(document.to_string()));
    }

    /// Store a plain string value
    pub fn set_string(&self, key: &str, value: &str) {
        self.lock()
            .entries
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    /// Append an entry with arbitrary ordered fields to the request log
    pub fn append_entry(&self, fields: Vec<(String, String)>) -> Result<String, StoreError> {
        self.check()?;
        let id = {
            let mut inner = self.lock();
            let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
            let id = if now > inner.last_id.0 {
                (now, 0)
            } else {
                (inner.last_id.0, inner.last_id.1 + 1)
            };
            inner.last_id = id;

            let stream = inner
                .entries
                .entry(STREAM_KEY.to_string())
                .or_insert_with(|| Value::Stream(Vec::new()));
            match stream {
                Value::Stream(entries) => entries.push((id, fields)),
                _ => {
                    return Err(StoreError::Command(format!(
                        "WRONGTYPE {} does not hold a stream",
                        STREAM_KEY
                    )))
                }
            }
            id
        };

        self.appended.notify_waiters();
        Ok(format_stream_id(id))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Connection("store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn with_pages<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, StoreError> {
        let mut inner = self.lock();
        let value = inner
            .entries
            .entry(PAGES_KEY.to_string())
            .or_insert_with(|| Value::Hash(BTreeMap::new()));
        let result = match value {
            Value::Hash(fields) => f(fields),
            _ => {
                return Err(StoreError::Command(format!(
                    "WRONGTYPE {} does not hold a hash",
                    PAGES_KEY
                )))
            }
        };
        if matches!(inner.entries.get(PAGES_KEY), Some(Value::Hash(fields)) if fields.is_empty()) {
            inner.entries.remove(PAGES_KEY);
        }
        Ok(result)
    }

    fn last_stream_id(&self) -> StreamId {
        match self.lock().entries.get(STREAM_KEY) {
            Some(Value::Stream(entries)) => entries.last().map(|(id, _)| *id).unwrap_or((0, 0)),
            _ => (0, 0),
        }
    }

    fn entry_after(&self, position: StreamId) -> Option<(StreamId, Vec<(String, String)>)> {
        match self.lock().entries.get(STREAM_KEY) {
            Some(Value::Stream(entries)) => entries
                .iter()
                .find(|(id, _)| *id > position)
                .map(|(id, fields)| (*id, fields.clone())),
            _ => None,
        }
    }
}

fn format_stream_id(id: StreamId) -> String {
    format!("{}-{}", id.0, id.1)
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn scan(&self, cursor: u64, count: usize) -> Result<ScanPage, StoreError> {
        self.check()?;
        let inner = self.lock();
        let start = cursor as usize;
        let keys: Vec<String> = inner
            .entries
            .keys()
            .skip(start)
            .take(count.max(1))
            .cloned()
            .collect();
        let end = start + keys.len();
        let cursor = if end >= inner.entries.len() {
            0
        } else {
            end as u64
        };
        Ok(ScanPage { cursor, keys })
    }

    async fn key_kinds(&self, keys: &[String]) -> Result<Vec<KeyKind>, StoreError> {
        self.check()?;
        let inner = self.lock();
        Ok(keys
            .iter()
            .map(|key| {
                inner
                    .entries
                    .get(key)
                    .map(Value::kind)
                    .unwrap_or(KeyKind::Other)
            })
            .collect())
    }

    async fn fetch_documents(&self, keys: &[TypedKey]) -> Result<Vec<Option<String>>, StoreError> {
        self.check()?;
        let inner = self.lock();
        Ok(keys
            .iter()
            .map(|typed| match inner.entries.get(&typed.key) {
                Some(Value::String(text)) | Some(Value::Json(text)) => Some(text.clone()),
                _ => None,
            })
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check()?;
        let mut inner = self.lock();
        let removed = keys
            .iter()
            .filter(|key| inner.entries.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, StoreError> {
        self.check()?;
        let terms = parse_query(&query.query)?;
        let inner = self.lock();

        let mut matches: Vec<(String, &String)> = inner
            .entries
            .iter()
            .filter_map(|(key, value)| match value {
                Value::Json(document) => Some((key.clone(), document)),
                _ => None,
            })
            .filter(|(_, document)| {
                serde_json::from_str::<serde_json::Value>(document)
                    .map(|doc| terms.iter().all(|term| term.matches(&doc)))
                    .unwrap_or(false)
            })
            .collect();

        // Newest first: numeric keys descending, others after
        matches.sort_by(|(a, _), (b, _)| {
            let a_num = a.parse::<i64>().ok();
            let b_num = b.parse::<i64>().ok();
            b_num.cmp(&a_num).then_with(|| a.cmp(b))
        });

        let total = matches.len() as u64;
        let hits = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(id, document)| SearchHit {
                id,
                document: document.clone(),
            })
            .collect();

        Ok(SearchPage { total, hits })
    }

    async fn pages(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.check()?;
        match self.lock().entries.get(PAGES_KEY) {
            Some(Value::Hash(fields)) => Ok(fields.clone()),
            Some(_) => Err(StoreError::Command(format!(
                "WRONGTYPE {} does not hold a hash",
                PAGES_KEY
            ))),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn put_page(&self, endpoint: &str, page: &str) -> Result<(), StoreError> {
        self.check()?;
        self.with_pages(|fields| {
            fields.insert(endpoint.to_string(), page.to_string());
        })
    }

    async fn replace_page(&self, endpoint: &str, page: &str) -> Result<(), StoreError> {
        self.check()?;
        self.with_pages(|fields| {
            fields.remove(endpoint);
            fields.insert(endpoint.to_string(), page.to_string());
        })
    }

    async fn delete_page(&self, endpoint: &str) -> Result<u64, StoreError> {
        self.check()?;
        self.with_pages(|fields| fields.remove(endpoint).map(|_| 1).unwrap_or(0))
    }

    async fn open_feed(&self, from: StreamCursor) -> Result<Box<dyn FeedReader>, StoreError> {
        self.check()?;
        let position = if from.is_latest() {
            self.last_stream_id()
        } else {
            parse_stream_id(from.as_str()).ok_or_else(|| {
                StoreError::Command(format!("Invalid stream ID: {}", from.as_str()))
            })?
        };
        debug!("Memory feed opened at {}", format_stream_id(position));

        Ok(Box::new(MemoryFeedReader {
            store: self.clone(),
            position,
            cursor: StreamCursor::new(format_stream_id(position)),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

struct MemoryFeedReader {
    store: MemoryStore,
    position: StreamId,
    cursor: StreamCursor,
}

#[async_trait]
impl FeedReader for MemoryFeedReader {
    async fn next(&mut self, block: Duration) -> Result<Option<StreamEntry>, StoreError> {
        let deadline = Instant::now() + block;
        loop {
            let notified = self.store.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.store.check()?;
            if let Some((id, fields)) = self.store.entry_after(self.position) {
                self.position = id;
                self.cursor = StreamCursor::new(format_stream_id(id));
                return Ok(Some(StreamEntry {
                    id: format_stream_id(id),
                    fields,
                }));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    fn position(&self) -> &StreamCursor {
        &self.cursor
    }
}

#[derive(Debug, PartialEq)]
struct Term {
    /// `None` searches every indexed text field
    field: Option<&'static IndexField>,
    text: String,
    prefix: bool,
}

impl Term {
    fn matches(&self, doc: &serde_json::Value) -> bool {
        let needle = self.text.to_lowercase();
        match self.field {
            Some(field) if !field.is_searchable() => false,
            Some(field) => {
                let values = field_values(doc, field.path);
                match field.kind {
                    FieldKind::Tag => needle.split('|').map(str::trim).any(|tag| {
                        values.iter().any(|value| {
                            let value = value.to_lowercase();
                            if self.prefix {
                                value.starts_with(tag)
                            } else {
                                value == tag
                            }
                        })
                    }),
                    FieldKind::Text | FieldKind::Numeric => values
                        .iter()
                        .any(|value| value.to_lowercase().contains(&needle)),
                }
            }
            None => INDEX_FIELDS
                .iter()
                .filter(|field| field.kind == FieldKind::Text && field.is_searchable())
                .flat_map(|field| field_values(doc, field.path))
                .any(|value| value.to_lowercase().contains(&needle)),
        }
    }
}

/// Values a JSON path points at, as text. Arrays yield one value per element.
///
/// Handles the path forms the index schema uses: `$.a.b` and `$.a['Key']`.
fn field_values(doc: &serde_json::Value, path: &str) -> Vec<String> {
    let Some(mut rest) = path.strip_prefix("$.") else {
        return Vec::new();
    };

    let mut node = doc;
    while !rest.is_empty() {
        let (segment, tail) = if let Some(quoted) = rest.strip_prefix("['") {
            match quoted.split_once("']") {
                Some(split) => split,
                None => return Vec::new(),
            }
        } else {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            rest.split_at(end)
        };
        node = match node.get(segment) {
            Some(next) => next,
            None => return Vec::new(),
        };
        rest = tail.strip_prefix('.').unwrap_or(tail);
    }

    let text = |value: &serde_json::Value| match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    };
    match node {
        serde_json::Value::Array(items) => items.iter().filter_map(text).collect(),
        other => text(other).into_iter().collect(),
    }
}

/// Parse a search expression into AND-ed terms.
///
/// Supports bare words, quoted phrases, `@field:value` scoping, grouping
/// parentheses and trailing `*` wildcards. `*` alone matches everything.
fn parse_query(query: &str) -> Result<Vec<Term>, StoreError> {
    let query = query.trim();
    if query.is_empty() || query == "*" {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut chars = query.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => current.push(ch),
                    None => {
                        return Err(StoreError::Query(
                            "Syntax error: unterminated quote".to_string(),
                        ))
                    }
                }
            },
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                depth += if c == '(' { 1 } else { -1 };
                if depth < 0 {
                    return Err(StoreError::Query(
                        "Syntax error: unbalanced parenthesis".to_string(),
                    ));
                }
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    if depth != 0 {
        return Err(StoreError::Query(
            "Syntax error: unbalanced parenthesis".to_string(),
        ));
    }

    let mut terms = Vec::new();
    for token in tokens {
        let (field, text) = match token.strip_prefix('@') {
            Some(scoped) => {
                let (name, value) = scoped.split_once(':').ok_or_else(|| {
                    StoreError::Query(format!("Syntax error near '{}'", token))
                })?;
                let field = index_field(name)
                    .ok_or_else(|| StoreError::Query(format!("Unknown field '{}'", name)))?;
                let value = value.trim_start_matches('{').trim_end_matches('}');
                if value.is_empty() {
                    return Err(StoreError::Query(format!(
                        "Syntax error: empty value for '@{}'",
                        name
                    )));
                }
                (Some(field), value.to_string())
            }
            None => (None, token),
        };

        let prefix = text.ends_with('*');
        let text = text.trim_matches('*').to_string();
        if text.is_empty() && field.is_none() {
            continue;
        }
        terms.push(Term {
            field,
            text,
            prefix,
        });
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hooklog_proto::CapturedRequest;

    fn record(key: i64, method: &str, path: &str) -> RequestRecord {
        let request = CapturedRequest::from_json(&format!(
            r#"{{"method":"{}","path":"{}","useragent":"curl/8","timestamp":"2025-01-01T00:00:00Z"}}"#,
            method, path
        ))
        .unwrap();
        RequestRecord::new(key, request)
    }

    #[tokio::test]
    async fn test_scan_pages_until_cursor_returns_to_zero() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.set_string(&format!("k{}", i), "v");
        }

        let first = store.scan(0, 2).await.unwrap();
        assert_eq!(first.keys, vec!["k0", "k1"]);
        assert_eq!(first.cursor, 2);

        let second = store.scan(first.cursor, 2).await.unwrap();
        let last = store.scan(second.cursor, 2).await.unwrap();
        assert_eq!(last.keys, vec!["k4"]);
        assert_eq!(last.cursor, 0);
    }

    #[tokio::test]
    async fn test_insert_record_writes_document_and_log() {
        let store = MemoryStore::new();
        store.insert_record(&record(10, "GET", "/a")).unwrap();

        let kinds = store
            .key_kinds(&["10".to_string(), STREAM_KEY.to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(kinds, vec![KeyKind::Json, KeyKind::Stream, KeyKind::Other]);

        let docs = store
            .fetch_documents(&[TypedKey {
                key: "10".to_string(),
                kind: KeyKind::Json,
            }])
            .await
            .unwrap();
        assert!(docs[0].as_deref().unwrap().contains("\"GET\""));
    }

    #[tokio::test]
    async fn test_feed_from_latest_skips_existing_entries() {
        let store = MemoryStore::new();
        store.insert_record(&record(1, "GET", "/old")).unwrap();

        let mut reader = store.open_feed(StreamCursor::latest()).await.unwrap();
        assert!(!reader.position().is_latest());
        assert!(reader
            .next(Duration::from_millis(20))
            .await
            .unwrap()
            .is_none());

        store.insert_record(&record(2, "GET", "/new")).unwrap();
        let entry = reader
            .next(Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.fields[0], ("key".to_string(), "2".to_string()));
        assert_eq!(reader.position().as_str(), entry.id);
    }

    #[tokio::test]
    async fn test_feed_wakes_blocked_reader() {
        let store = MemoryStore::new();
        let mut reader = store.open_feed(StreamCursor::latest()).await.unwrap();

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.insert_record(&record(3, "POST", "/hook")).unwrap();
        });

        let entry = reader.next(Duration::from_secs(2)).await.unwrap();
        assert!(entry.is_some());
    }

    #[tokio::test]
    async fn test_feed_resumes_after_cursor() {
        let store = MemoryStore::new();
        let first = store.insert_record(&record(1, "GET", "/1")).unwrap();
        store.insert_record(&record(2, "GET", "/2")).unwrap();

        let mut reader = store.open_feed(StreamCursor::new(first)).await.unwrap();
        let entry = reader
            .next(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.fields[0].1, "2");
    }

    #[tokio::test]
    async fn test_invalid_cursor_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.open_feed(StreamCursor::new("abc")).await.is_err());
    }

    #[tokio::test]
    async fn test_offline_store_fails_reads() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.scan(0, 10).await.unwrap_err();
        assert!(err.is_connection());
        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_search_terms_and_fields() {
        let store = MemoryStore::new();
        store.insert_record(&record(1, "GET", "/index.html")).unwrap();
        store.insert_record(&record(2, "POST", "/hook")).unwrap();
        store.insert_record(&record(3, "POST", "/login")).unwrap();

        let all = store.search(&SearchQuery::new("*", 0, 10)).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.hits[0].id, "3");

        let posts = store
            .search(&SearchQuery::new("@method:post", 0, 1))
            .await
            .unwrap();
        assert_eq!(posts.total, 2);
        assert_eq!(posts.hits.len(), 1);

        let scoped = store
            .search(&SearchQuery::new("@method:POST hook", 0, 10))
            .await
            .unwrap();
        assert_eq!(scoped.total, 1);
        assert_eq!(scoped.hits[0].id, "2");

        let none = store
            .search(&SearchQuery::new("nothing-matches", 0, 10))
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }

    #[tokio::test]
    async fn test_search_follows_index_schema() {
        let store = MemoryStore::new();
        store.set_document(
            "1",
            r#"{"remoteaddr":"10.0.0.5","method":"POST","path":"/collect",
                "headers":{"Content-Type":["application/json"],"User-Agent":["Firefox/120"]},
                "report":{"gpu":"ANGLE (Apple M1)","lang":"it-IT","uri":"https://shop.example/cart"},
                "body":"c2VjcmV0","timestamp":"2025-01-01T00:00:01Z"}"#,
        );
        store.set_document(
            "2",
            r#"{"remoteaddr":"10.0.0.6","method":"GET","path":"/","headers":{},
                "timestamp":"2025-01-01T00:00:02Z"}"#,
        );

        let count = |q: &'static str| {
            let store = store.clone();
            async move { store.search(&SearchQuery::new(q, 0, 10)).await.unwrap().total }
        };

        // Tags match whole values, any of the alternatives
        assert_eq!(count("@method:{GET}").await, 1);
        assert_eq!(count("@method:{GET|POST}").await, 2);
        assert_eq!(count("@method:{GE}").await, 0);
        assert_eq!(count("@ip:{10.0.0.5}").await, 1);
        assert_eq!(count("@header_content_type:{application/json}").await, 1);
        assert_eq!(count("@report_lang:{it-IT}").await, 1);
        assert_eq!(count("@report_gpu:{ANGLE*}").await, 1);

        // Text fields match on contained words
        assert_eq!(count("@report_uri:shop").await, 1);
        assert_eq!(count("@header_user_agent:firefox").await, 1);
        assert_eq!(count("@path:collect").await, 1);

        // Bodies are stored but not searchable
        assert_eq!(count("c2VjcmV0").await, 0);
        assert_eq!(count("@body_text:c2VjcmV0").await, 0);
    }

    #[test]
    fn test_query_syntax_errors() {
        assert!(parse_query("(GET").is_err());
        assert!(parse_query("GET)").is_err());
        assert!(parse_query("\"open").is_err());
        assert!(parse_query("@method").is_err());
        assert!(parse_query("@nosuch:1").is_err());
        assert!(parse_query("@address:1").is_err());
        assert!(parse_query("@method:").is_err());
        assert_eq!(parse_query("  ").unwrap(), Vec::new());
        assert_eq!(parse_query("(GET) hoo*").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pages_upsert_replace_delete() {
        let store = MemoryStore::new();
        store.put_page("a", r#"{"statusCode":200}"#).await.unwrap();
        store.put_page("a", r#"{"statusCode":201}"#).await.unwrap();
        store.replace_page("b", r#"{"statusCode":404}"#).await.unwrap();

        let pages = store.pages().await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages["a"], r#"{"statusCode":201}"#);

        assert_eq!(store.delete_page("a").await.unwrap(), 1);
        assert_eq!(store.delete_page("a").await.unwrap(), 0);
        assert_eq!(store.delete_page("b").await.unwrap(), 1);
        assert!(store.pages().await.unwrap().is_empty());
    }
}
