//! End-to-end sync tests
//!
//! HTTP source against wiremock, in-memory document store, file checkpoint in
//! a temp directory.

use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use ordersync_engine::checkpoint::{CheckpointManager, CheckpointStore, FileCheckpointStore};
use ordersync_engine::config::{SourceConfig, SyncSettings};
use ordersync_engine::source::HttpOrderSource;
use ordersync_engine::store::MemoryDocumentStore;
use ordersync_engine::{SyncError, SyncOrchestrator};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const ORDERS_PATH: &str = "/admin/api/2024-04/orders.json";

/// Orders up to this id are older than the rewind window
const LAST_OLD_ID: u64 = 200;

fn created_at(id: u64, now: DateTime<Utc>) -> DateTime<Utc> {
    let anchor = if id <= LAST_OLD_ID {
        now - Months::new(7)
    } else {
        now - Months::new(1)
    };
    anchor + ChronoDuration::minutes(id as i64)
}

fn order(id: u64, now: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "order_number": 1000 + id,
        "created_at": created_at(id, now).to_rfc3339(),
        "cancelled_at": null,
        "total_price": "25.00",
        "financial_status": "paid",
        "customer": { "first_name": "Ada", "last_name": "Lovelace" },
        "shipping_address": { "phone": "+1 555 123 4567" },
        "line_items": [
            { "product_id": 9, "title": "Teapot", "sku": "TP-9", "quantity": 1, "current_quantity": 1 }
        ]
    })
}

fn page(ids: std::ops::RangeInclusive<u64>, now: DateTime<Utc>) -> Value {
    json!({ "orders": ids.map(|id| order(id, now)).collect::<Vec<_>>() })
}

struct Harness {
    _dir: TempDir,
    checkpoint_path: std::path::PathBuf,
    store: Arc<MemoryDocumentStore>,
    sync: SyncOrchestrator,
}

fn harness(server: &MockServer) -> Harness {
    let dir = TempDir::new().unwrap();
    let checkpoint_path = dir.path().join("checkpoint.json");

    let source = Arc::new(
        HttpOrderSource::new(&SourceConfig {
            base_url: server.uri(),
            api_version: "2024-04".to_string(),
            access_token: None,
            timeout_secs: 5,
        })
        .unwrap(),
    );
    let store = Arc::new(MemoryDocumentStore::new());
    let checkpoint = CheckpointManager::new(
        Arc::new(FileCheckpointStore::new(checkpoint_path.clone())),
        store.clone(),
        0,
        3,
    );
    let sync = SyncOrchestrator::new(source, store.clone(), checkpoint, SyncSettings::default());

    Harness {
        _dir: dir,
        checkpoint_path,
        store,
        sync,
    }
}

#[tokio::test]
async fn test_cycle_syncs_two_pages_and_rewinds_checkpoint() {
    let server = MockServer::start().await;
    let now = Utc::now();

    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("since_id", "0"))
        .and(query_param("limit", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1..=250, now)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("since_id", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(251..=260, now)))
        .expect(1)
        .mount(&server)
        .await;

    let mut h = harness(&server);
    let cycle = h.sync.run_cycle().await.unwrap();

    assert_eq!(cycle.run.fetches, 2);
    assert_eq!(cycle.run.received, 260);
    assert_eq!(cycle.run.normalized, 260);
    assert!(cycle.run.writes >= 1);
    assert_eq!(cycle.run.written, 260);
    assert_eq!(cycle.run.last_id, 260);
    assert_eq!(h.store.len().await, 260);

    assert_eq!(cycle.checkpoint.since_id(), Some(LAST_OLD_ID));
    let stored = FileCheckpointStore::new(h.checkpoint_path.clone()).read().await.unwrap();
    assert_eq!(stored, Some(LAST_OLD_ID));

    let doc = h.store.get("42").await.unwrap();
    assert_eq!(doc["phone"], json!("5551234567"));
    assert_eq!(doc["cancelled"], json!(false));
    assert_eq!(doc["products"][0]["sku"], json!("TP-9"));
}

#[tokio::test]
async fn test_second_cycle_resumes_from_rewound_checkpoint() {
    let server = MockServer::start().await;
    let now = Utc::now();

    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("since_id", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1..=250, now)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("since_id", "250"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(251..=260, now)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("since_id", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(201..=260, now)))
        .expect(1)
        .mount(&server)
        .await;

    let mut h = harness(&server);
    h.sync.run_cycle().await.unwrap();

    let second = h.sync.run_cycle().await.unwrap();
    assert_eq!(second.run.start_id, LAST_OLD_ID);
    assert_eq!(second.run.normalized, 60);
    assert_eq!(h.store.len().await, 260);
}

#[tokio::test]
async fn test_source_outage_leaves_checkpoint_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut h = harness(&server);
    FileCheckpointStore::new(h.checkpoint_path.clone())
        .write(123)
        .await
        .unwrap();

    let err = h.sync.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));

    let stored = FileCheckpointStore::new(h.checkpoint_path.clone()).read().await.unwrap();
    assert_eq!(stored, Some(123));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_corrupt_checkpoint_starts_from_bootstrap() {
    let server = MockServer::start().await;
    let now = Utc::now();

    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("since_id", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1..=3, now)))
        .expect(1)
        .mount(&server)
        .await;

    let mut h = harness(&server);
    std::fs::write(&h.checkpoint_path, "not json").unwrap();

    let cycle = h.sync.run_cycle().await.unwrap();
    assert_eq!(cycle.run.start_id, 0);
    assert_eq!(cycle.run.normalized, 3);
}
