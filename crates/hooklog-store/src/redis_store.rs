//! Redis gateway
//!
//! Requires the JSON and search modules for documents and the full-text
//! index. Request handlers share a small fixed pool of multiplexed
//! connections; every live feed opens its own connection so a blocking
//! `XREAD` never holds up the pool.

use async_trait::async_trait;
use hooklog_proto::index::schema_args;
use hooklog_proto::{StreamCursor, PAGES_KEY, SEARCH_INDEX, STREAM_KEY};
use rand::Rng;
use redis::aio::MultiplexedConnection;
use redis::{Client, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    FeedReader, KeyKind, RecordStore, ScanPage, SearchHit, SearchPage, SearchQuery, StoreError,
    StreamEntry, TypedKey,
};

/// Redis gateway configuration
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Connection URL, e.g. `redis://:password@localhost:6379/0`
    pub url: String,
    /// Number of pooled connections shared by request handlers
    pub pool_size: usize,
    /// Timeout for opening each connection
    pub connect_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 5,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// [`RecordStore`] backed by Redis
pub struct RedisStore {
    client: Client,
    pool: Vec<MultiplexedConnection>,
    connect_timeout: Duration,
}

impl RedisStore {
    /// Open the pool, check the server answers and make sure the index exists
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        let size = config.pool_size.max(1);
        let mut pool = Vec::with_capacity(size);
        for _ in 0..size {
            pool.push(open_connection(&client, config.connect_timeout).await?);
        }

        let store = Self {
            client,
            pool,
            connect_timeout: config.connect_timeout,
        };
        store.ping().await?;
        store.ensure_index().await;

        info!("Connected to Redis with {} pooled connections", size);
        Ok(store)
    }

    fn connection(&self) -> MultiplexedConnection {
        let index = rand::thread_rng().gen_range(0..self.pool.len());
        self.pool[index].clone()
    }

    /// Create the request index with the capture service's schema; an
    /// existing index is left alone
    async fn ensure_index(&self) {
        let mut conn = self.connection();
        let result: redis::RedisResult<()> = create_index_cmd().query_async(&mut conn).await;
        match result {
            Ok(()) => info!("Created search index {}", SEARCH_INDEX),
            Err(e) if e.to_string().contains("Index already exists") => {
                debug!("Search index {} already exists", SEARCH_INDEX)
            }
            Err(e) if e.to_string().to_lowercase().contains("unknown command") => {
                warn!("Search module not loaded, search will fail: {}", e)
            }
            Err(e) => warn!("Failed to create search index {}: {}", SEARCH_INDEX, e),
        }
    }
}

fn create_index_cmd() -> redis::Cmd {
    let mut cmd = redis::cmd("FT.CREATE");
    cmd.arg(SEARCH_INDEX)
        .arg("ON")
        .arg("JSON")
        .arg("SCHEMA")
        .arg(schema_args());
    cmd
}

async fn open_connection(
    client: &Client,
    timeout: Duration,
) -> Result<MultiplexedConnection, StoreError> {
    tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|_| StoreError::Connection("timed out connecting to Redis".to_string()))?
        .map_err(StoreError::from)
}

#[async_trait]
impl RecordStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn scan(&self, cursor: u64, count: usize) -> Result<ScanPage, StoreError> {
        let mut conn = self.connection();
        let (cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(ScanPage { cursor, keys })
    }

    async fn key_kinds(&self, keys: &[String]) -> Result<Vec<KeyKind>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("TYPE").arg(key);
        }
        let names: Vec<String> = pipe.query_async(&mut conn).await?;
        Ok(names.iter().map(|n| KeyKind::from_type_name(n)).collect())
    }

    async fn fetch_documents(&self, keys: &[TypedKey]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection();
        let mut pipe = redis::pipe();
        for typed in keys {
            match typed.kind {
                KeyKind::Json => pipe.cmd("JSON.GET").arg(&typed.key),
                _ => pipe.cmd("GET").arg(&typed.key),
            };
        }
        let documents: Vec<Option<String>> = pipe.query_async(&mut conn).await?;
        Ok(documents)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection();
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, StoreError> {
        let mut conn = self.connection();
        let reply: Value = redis::cmd("FT.SEARCH")
            .arg(SEARCH_INDEX)
            .arg(&query.query)
            .arg("LIMIT")
            .arg(query.offset)
            .arg(query.limit)
            .arg("RETURN")
            .arg(1)
            .arg("$")
            .query_async(&mut conn)
            .await?;
        parse_search_reply(reply)
    }

    async fn pages(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let mut conn = self.connection();
        let pages: BTreeMap<String, String> = redis::cmd("HGETALL")
            .arg(PAGES_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(pages)
    }

    async fn put_page(&self, endpoint: &str, page: &str) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let _: i64 = redis::cmd("HSET")
            .arg(PAGES_KEY)
            .arg(endpoint)
            .arg(page)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn replace_page(&self, endpoint: &str, page: &str) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let () = redis::pipe()
            .atomic()
            .cmd("HDEL")
            .arg(PAGES_KEY)
            .arg(endpoint)
            .ignore()
            .cmd("HSET")
            .arg(PAGES_KEY)
            .arg(endpoint)
            .arg(page)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_page(&self, endpoint: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection();
        let removed: u64 = redis::cmd("HDEL")
            .arg(PAGES_KEY)
            .arg(endpoint)
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn open_feed(&self, from: StreamCursor) -> Result<Box<dyn FeedReader>, StoreError> {
        let mut conn = open_connection(&self.client, self.connect_timeout).await?;

        let cursor = if from.is_latest() {
            let last: Vec<(String, Vec<String>)> = redis::cmd("XREVRANGE")
                .arg(STREAM_KEY)
                .arg("+")
                .arg("-")
                .arg("COUNT")
                .arg(1)
                .query_async(&mut conn)
                .await?;
            StreamCursor::new(
                last.into_iter()
                    .next()
                    .map(|(id, _)| id)
                    .unwrap_or_else(|| "0-0".to_string()),
            )
        } else {
            from
        };
        debug!("Redis feed opened at {}", cursor);

        Ok(Box::new(RedisFeedReader { conn, cursor }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

type XReadReply = Option<Vec<(String, Vec<(String, Vec<String>)>)>>;

struct RedisFeedReader {
    conn: MultiplexedConnection,
    cursor: StreamCursor,
}

#[async_trait]
impl FeedReader for RedisFeedReader {
    async fn next(&mut self, block: Duration) -> Result<Option<StreamEntry>, StoreError> {
        // BLOCK 0 waits forever
        let block_ms = block.as_millis().max(1) as u64;
        let reply: XReadReply = redis::cmd("XREAD")
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(STREAM_KEY)
            .arg(self.cursor.as_str())
            .query_async(&mut self.conn)
            .await?;

        let entry = reply
            .into_iter()
            .flatten()
            .flat_map(|(_, entries)| entries)
            .next();

        Ok(entry.map(|(id, flat)| {
            self.cursor = StreamCursor::new(id.clone());
            StreamEntry {
                id,
                fields: pair_fields(flat),
            }
        }))
    }

    fn position(&self) -> &StreamCursor {
        &self.cursor
    }
}

fn pair_fields(flat: Vec<String>) -> Vec<(String, String)> {
    let mut iter = flat.into_iter();
    let mut fields = Vec::new();
    while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
        fields.push((name, value));
    }
    fields
}

/// Decode `[total, id, [field, value, ...], id, [...], ...]`
fn parse_search_reply(reply: Value) -> Result<SearchPage, StoreError> {
    let items = match reply {
        Value::Array(items) => items,
        other => {
            return Err(StoreError::Decode(format!(
                "unexpected search reply: {:?}",
                other
            )))
        }
    };

    let mut iter = items.into_iter();
    let total: u64 = match iter.next() {
        Some(value) => redis::from_redis_value(&value)?,
        None => 0,
    };

    let mut hits = Vec::new();
    while let Some(id) = iter.next() {
        let id: String = redis::from_redis_value(&id)?;
        let fields = iter
            .next()
            .ok_or_else(|| StoreError::Decode(format!("search hit {} has no fields", id)))?;
        let fields: Vec<String> = redis::from_redis_value(&fields)?;
        let document = pair_fields(fields)
            .into_iter()
            .find(|(name, _)| name == "$")
            .map(|(_, document)| document)
            .ok_or_else(|| StoreError::Decode(format!("search hit {} has no document", id)))?;
        hits.push(SearchHit { id, document });
    }

    Ok(SearchPage { total, hits })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_search_reply() {
        let reply = Value::Array(vec![
            Value::Int(7),
            bulk("1700000000001"),
            Value::Array(vec![bulk("$"), bulk(r#"{"method":"GET"}"#)]),
            bulk("request:1700000000000"),
            Value::Array(vec![bulk("$"), bulk(r#"{"method":"POST"}"#)]),
        ]);

        let page = parse_search_reply(reply).unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.hits.len(), 2);
        assert_eq!(page.hits[1].id, "request:1700000000000");
        assert_eq!(page.hits[1].document, r#"{"method":"POST"}"#);
    }

    #[test]
    fn test_create_index_uses_capture_schema() {
        let args: Vec<String> = create_index_cmd()
            .args_iter()
            .filter_map(|arg| match arg {
                redis::Arg::Simple(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                redis::Arg::Cursor => None,
            })
            .collect();

        assert_eq!(
            &args[..9],
            &[
                "FT.CREATE",
                "idx:complete_requests",
                "ON",
                "JSON",
                "SCHEMA",
                "$.remoteaddr",
                "AS",
                "ip",
                "TAG"
            ]
        );
        assert!(args
            .windows(4)
            .any(|w| w == ["$.method", "AS", "method", "TAG"]));
        assert!(args
            .windows(4)
            .any(|w| w == ["$.report.gpu", "AS", "report_gpu", "TAG"]));
        assert_eq!(args.last().map(String::as_str), Some("NOINDEX"));
    }

    #[test]
    fn test_parse_empty_search_reply() {
        let page = parse_search_reply(Value::Array(vec![Value::Int(0)])).unwrap();
        assert_eq!(page, SearchPage::default());
    }

    #[test]
    fn test_parse_search_reply_rejects_missing_document() {
        let reply = Value::Array(vec![Value::Int(1), bulk("1")]);
        assert!(matches!(
            parse_search_reply(reply),
            Err(StoreError::Decode(_))
        ));
        assert!(parse_search_reply(Value::Nil).is_err());
    }

    #[test]
    fn test_pair_fields_drops_trailing_name() {
        let fields = pair_fields(vec![
            "key".to_string(),
            "1".to_string(),
            "value".to_string(),
            "{}".to_string(),
            "id".to_string(),
        ]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1], ("value".to_string(), "{}".to_string()));
    }
}
