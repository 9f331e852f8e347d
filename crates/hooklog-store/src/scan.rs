//! Bounded keyspace enumeration

use hooklog_proto::{parse_record_key, CapturedRequest, RequestRecord};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::{RecordStore, StoreError, TypedKey};

/// Keys requested per scan step
pub const SCAN_PAGE_SIZE: usize = 100;

/// Enumerate every key with repeated bounded scans.
///
/// Keys reported more than once by the engine are returned once.
pub async fn scan_all(store: &dyn RecordStore, count: usize) -> Result<Vec<String>, StoreError> {
    let mut cursor = 0u64;
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    let mut steps = 0usize;

    loop {
        let page = store.scan(cursor, count.max(1)).await?;
        steps += 1;
        for key in page.keys {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        if page.cursor == 0 {
            break;
        }
        cursor = page.cursor;
    }

    debug!("Scanned {} keys in {} steps", keys.len(), steps);
    Ok(keys)
}

/// Result of loading the full history
#[derive(Debug, Default)]
pub struct HistoryLoad {
    /// Parsed records, newest first
    pub records: Vec<RequestRecord>,
    /// Document keys that were skipped (bad key or invalid document)
    pub skipped: usize,
}

/// Load every request document in the store.
///
/// Only string and JSON keys are considered. Keys that are not integers and
/// documents that fail to parse are skipped with a warning; any store error
/// aborts the whole load.
pub async fn load_records(store: &dyn RecordStore) -> Result<HistoryLoad, StoreError> {
    let keys = scan_all(store, SCAN_PAGE_SIZE).await?;
    let mut load = HistoryLoad::default();

    for chunk in keys.chunks(SCAN_PAGE_SIZE) {
        let kinds = store.key_kinds(chunk).await?;
        let typed: Vec<TypedKey> = chunk
            .iter()
            .zip(kinds)
            .filter(|(_, kind)| kind.is_document())
            .map(|(key, kind)| TypedKey {
                key: key.clone(),
                kind,
            })
            .collect();
        if typed.is_empty() {
            continue;
        }

        let documents = store.fetch_documents(&typed).await?;
        for (typed_key, document) in typed.iter().zip(documents) {
            let Some(document) = document else {
                debug!("Key {} vanished before fetch", typed_key.key);
                continue;
            };
            let Some(key) = parse_record_key(&typed_key.key) else {
                warn!("Skipping non-numeric key {}", typed_key.key);
                load.skipped += 1;
                continue;
            };
            match CapturedRequest::from_json(&document) {
                Ok(request) => load.records.push(RequestRecord::new(key, request)),
                Err(e) => {
                    warn!("Skipping invalid document {}: {}", typed_key.key, e);
                    load.skipped += 1;
                }
            }
        }
    }

    load.records.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| b.key.cmp(&a.key))
    });
    Ok(load)
}
