//! History loading against the in-memory engine

use hooklog_proto::{CapturedRequest, RequestRecord, PAGES_KEY, STREAM_KEY};
use hooklog_store::{load_records, scan_all, MemoryStore, RecordStore, SCAN_PAGE_SIZE};

fn record(key: i64, ts: &str) -> RequestRecord {
    let request = CapturedRequest::from_json(&format!(
        r#"{{"method":"GET","path":"/{}","timestamp":"{}"}}"#,
        key, ts
    ))
    .unwrap();
    RequestRecord::new(key, request)
}

#[tokio::test]
async fn test_scan_all_visits_every_key_across_pages() {
    let store = MemoryStore::new();
    for i in 0..250 {
        store.set_string(&format!("key-{:03}", i), "x");
    }

    let keys = scan_all(&store, SCAN_PAGE_SIZE).await.unwrap();
    assert_eq!(keys.len(), 250);

    let small_pages = scan_all(&store, 7).await.unwrap();
    assert_eq!(small_pages, keys);
}

#[tokio::test]
async fn test_scan_all_on_empty_store() {
    let store = MemoryStore::new();
    assert!(scan_all(&store, SCAN_PAGE_SIZE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_records_keeps_documents_only() {
    let store = MemoryStore::new();
    store.insert_record(&record(1, "2025-01-01T00:00:01Z")).unwrap();
    store.insert_record(&record(2, "2025-01-01T00:00:02Z")).unwrap();
    store.put_page("landing", r#"{"statusCode":200}"#).await.unwrap();

    let load = load_records(&store).await.unwrap();

    // The log and the page hash are not documents
    let keys = scan_all(&store, SCAN_PAGE_SIZE).await.unwrap();
    assert!(keys.contains(&STREAM_KEY.to_string()));
    assert!(keys.contains(&PAGES_KEY.to_string()));

    assert_eq!(load.skipped, 0);
    let loaded: Vec<i64> = load.records.iter().map(|r| r.key).collect();
    assert_eq!(loaded, vec![2, 1]);
}

#[tokio::test]
async fn test_load_records_skips_bad_keys_and_documents() {
    let store = MemoryStore::new();
    store.insert_record(&record(5, "2025-01-01T00:00:05Z")).unwrap();
    store.set_document("not-a-number", r#"{"timestamp":"2025-01-01T00:00:00Z"}"#);
    store.set_document("6", r#"{"method":"GET"}"#);
    store.set_string("7", "plain text");

    let load = load_records(&store).await.unwrap();
    assert_eq!(load.records.len(), 1);
    assert_eq!(load.records[0].key, 5);
    assert_eq!(load.skipped, 3);
}

#[tokio::test]
async fn test_load_records_orders_ties_by_key() {
    let store = MemoryStore::new();
    for key in [10, 30, 20] {
        store.insert_record(&record(key, "2025-01-01T00:00:00Z")).unwrap();
    }

    let load = load_records(&store).await.unwrap();
    let keys: Vec<i64> = load.records.iter().map(|r| r.key).collect();
    assert_eq!(keys, vec![30, 20, 10]);
}

#[tokio::test]
async fn test_load_records_fails_whole_on_store_error() {
    let store = MemoryStore::new();
    store.insert_record(&record(1, "2025-01-01T00:00:01Z")).unwrap();
    store.set_offline(true);

    assert!(load_records(&store).await.is_err());
}

#[tokio::test]
async fn test_delete_counts_existing_keys() {
    let store = MemoryStore::new();
    store.insert_record(&record(1, "2025-01-01T00:00:01Z")).unwrap();

    assert_eq!(store.delete(&["1".to_string()]).await.unwrap(), 1);
    assert_eq!(store.delete(&["1".to_string()]).await.unwrap(), 0);
    assert_eq!(store.delete(&[]).await.unwrap(), 0);
}
