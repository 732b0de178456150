//! Store backend tests: snapshot persistence, synchronous save, and the
//! relational backend's merge-on-upsert.

use pretty_assertions::assert_eq;
use vigil_lib::collector::apply_batch;
use vigil_lib::metrics::{Counter, Gauge};
use vigil_lib::storage::{FileStore, MemoryStore, MetricStore, NameFilter, SqlStore};
use vigil_lib::MetricRecord;

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let store = FileStore::open(&path, true, false).unwrap();
    store.set_gauge("cpu", 0.75).await.unwrap();
    store.add_counter("hits", 12).await.unwrap();
    store.save().await.unwrap();
    drop(store);

    let store = FileStore::open(&path, true, false).unwrap();
    assert_eq!(store.gauge("cpu").await.unwrap().unwrap().value, 0.75);
    assert_eq!(store.counter("hits").await.unwrap().unwrap().value, 12);
}

#[tokio::test]
async fn test_file_store_skip_restore_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let store = FileStore::open(&path, true, false).unwrap();
    store.add_counter("hits", 3).await.unwrap();
    store.save().await.unwrap();
    drop(store);

    let store = FileStore::open(&path, false, false).unwrap();
    assert!(store.counter("hits").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sync_save_flushes_after_every_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");

    let store = FileStore::open(&path, true, true).unwrap();
    apply_batch(&store, &[MetricRecord::counter("hits", 4)])
        .await
        .unwrap();

    // The snapshot is already on disk without an explicit save.
    let reopened = FileStore::open(&path, true, false).unwrap();
    assert_eq!(reopened.counter("hits").await.unwrap().unwrap().value, 4);
}

#[tokio::test]
async fn test_sql_store_accumulates_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let dsn = dir.path().join("metrics.db");
    let dsn = dsn.to_str().unwrap();

    let store = SqlStore::open(dsn).unwrap();
    store.add_counter("hits", 5).await.unwrap();
    store.set_gauge("cpu", 0.5).await.unwrap();
    drop(store);

    let store = SqlStore::open(dsn).unwrap();
    store.add_counter("hits", 3).await.unwrap();
    store.set_gauge("cpu", 0.9).await.unwrap();
    assert_eq!(store.counter("hits").await.unwrap().unwrap().value, 8);
    assert_eq!(store.gauge("cpu").await.unwrap().unwrap().value, 0.9);
}

#[tokio::test]
async fn test_sql_batch_rolls_back_wholesale() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqlStore::open(dir.path().join("metrics.db").to_str().unwrap()).unwrap();

    let counters = vec![
        Counter::new("ok".to_string(), 5),
        Counter::new("".to_string(), 1),
    ];
    assert!(store.insert_batch(&counters, &[]).await.is_err());
    assert!(store.counter("ok").await.unwrap().is_none());
}

#[tokio::test]
async fn test_filtered_listing() {
    let store = MemoryStore::new();
    store.set_gauge("cpu", 0.5).await.unwrap();
    store.set_gauge("mem", 0.8).await.unwrap();
    store.add_counter("hits", 1).await.unwrap();

    let filter = NameFilter::names(["cpu"]);
    let gauges = store.gauges(Some(&filter)).await.unwrap();
    assert_eq!(gauges.len(), 1);
    assert!(gauges.contains_key("cpu"));

    let all = store.gauges(None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counter_adds_are_lossless() {
    let store = std::sync::Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                store.add_counter("hits", 1).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(store.counter("hits").await.unwrap().unwrap().value, 800);
}

#[tokio::test]
async fn test_sql_reset_clears_one_namespace_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqlStore::open(dir.path().join("metrics.db").to_str().unwrap()).unwrap();
    store.add_counter("hits", 2).await.unwrap();
    store.set_gauge("cpu", 0.5).await.unwrap();

    store.reset_counters().await.unwrap();
    assert!(store.counter("hits").await.unwrap().is_none());
    assert!(store.gauge("cpu").await.unwrap().is_some());

    store.reset().await.unwrap();
    assert!(store.gauge("cpu").await.unwrap().is_none());
}

#[tokio::test]
async fn test_gauge_and_counter_namespaces_are_independent() {
    let store = MemoryStore::new();
    store.set_gauge("temp", 1.5).await.unwrap();
    store.add_counter("temp", 7).await.unwrap();

    assert_eq!(store.gauge("temp").await.unwrap().unwrap(), Gauge::new("temp".to_string(), 1.5));
    assert_eq!(store.counter("temp").await.unwrap().unwrap().value, 7);
}
