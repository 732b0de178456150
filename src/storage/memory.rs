//! In-memory metric store.
//!
//! Two independent DashMap namespaces, one per metric kind. Conflicting
//! writes to the same name serialize on the map's shard lock, which gives
//! per-name linearizability without a global lock across the pipeline.

use crate::core::{Result, VigilError};
use crate::metrics::{Counter, Gauge};
use crate::storage::{MetricStore, NameFilter};
use dashmap::DashMap;
use std::collections::HashMap;

/// DashMap-backed store; the default backend and the engine inside the
/// file-backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    gauges: DashMap<String, Gauge>,
    counters: DashMap<String, Counter>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(VigilError::EmptyName);
        }
        Ok(())
    }

    /// Synchronous gauge set, shared with the batch path.
    fn set_gauge_sync(&self, name: &str, value: f64) -> Result<()> {
        Self::check_name(name)?;
        self.gauges
            .entry(name.to_string())
            .and_modify(|g| g.set(value))
            .or_insert_with(|| Gauge::new(name, value));
        Ok(())
    }

    /// Synchronous counter add, shared with the batch path. The entry lock
    /// is held across the whole add, so the negative-delta check and the
    /// accumulation are one atomic step per name.
    fn add_counter_sync(&self, name: &str, delta: i64) -> Result<()> {
        Self::check_name(name)?;
        if delta < 0 {
            return Err(VigilError::NegativeDelta {
                name: name.to_string(),
                delta,
            });
        }
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| Counter::new(name, 0))
            .add(delta)?;
        Ok(())
    }

    /// Replaces both namespaces wholesale; used by snapshot restore.
    pub(crate) fn replace_all(&self, gauges: HashMap<String, Gauge>, counters: HashMap<String, Counter>) {
        self.gauges.clear();
        self.counters.clear();
        for (name, gauge) in gauges {
            self.gauges.insert(name, gauge);
        }
        for (name, counter) in counters {
            self.counters.insert(name, counter);
        }
    }

    /// Copy-on-read dump of both namespaces; used by snapshot save.
    pub(crate) fn dump(&self) -> (HashMap<String, Gauge>, HashMap<String, Counter>) {
        let gauges = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let counters = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        (gauges, counters)
    }
}

#[async_trait::async_trait]
impl MetricStore for MemoryStore {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.set_gauge_sync(name, value)
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.add_counter_sync(name, delta)
    }

    async fn gauge(&self, name: &str) -> Result<Option<Gauge>> {
        Ok(self.gauges.get(name).map(|e| e.value().clone()))
    }

    async fn counter(&self, name: &str) -> Result<Option<Counter>> {
        Ok(self.counters.get(name).map(|e| e.value().clone()))
    }

    async fn gauges(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Gauge>> {
        Ok(self
            .gauges
            .iter()
            .filter(|e| filter.map_or(true, |f| f.contains(e.key())))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    async fn counters(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Counter>> {
        Ok(self
            .counters
            .iter()
            .filter(|e| filter.map_or(true, |f| f.contains(e.key())))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    async fn insert_batch(&self, counters: &[Counter], gauges: &[Gauge]) -> Result<()> {
        // Same-name entries apply in slice order; validation happened at
        // ingest, so a failure here is a caller bug worth surfacing.
        for counter in counters {
            self.add_counter_sync(&counter.name, counter.value)?;
        }
        for gauge in gauges {
            self.set_gauge_sync(&gauge.name, gauge.value)?;
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.gauges.clear();
        self.counters.clear();
        Ok(())
    }

    async fn reset_counters(&self) -> Result<()> {
        self.counters.clear();
        Ok(())
    }

    async fn reset_gauges(&self) -> Result<()> {
        self.gauges.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter_accumulation() {
        let store = MemoryStore::new();
        store.add_counter("hits", 5).await.unwrap();
        store.add_counter("hits", 3).await.unwrap();
        assert_eq!(store.counter("hits").await.unwrap().unwrap().value, 8);
    }

    #[tokio::test]
    async fn test_negative_delta_leaves_counter_unchanged() {
        let store = MemoryStore::new();
        store.add_counter("hits", 5).await.unwrap();
        let err = store.add_counter("hits", -1).await.unwrap_err();
        assert!(matches!(err, VigilError::NegativeDelta { .. }));
        assert_eq!(store.counter("hits").await.unwrap().unwrap().value, 5);
    }

    #[tokio::test]
    async fn test_gauge_last_write_wins() {
        let store = MemoryStore::new();
        store.set_gauge("cpu", 0.1).await.unwrap();
        store.set_gauge("cpu", 0.7).await.unwrap();
        assert_eq!(store.gauge("cpu").await.unwrap().unwrap().value, 0.7);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(store.set_gauge("", 1.0).await, Err(VigilError::EmptyName)));
        assert!(matches!(store.add_counter("", 1).await, Err(VigilError::EmptyName)));
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let store = MemoryStore::new();
        store.set_gauge("load", 1.5).await.unwrap();
        store.add_counter("load", 2).await.unwrap();
        assert_eq!(store.gauge("load").await.unwrap().unwrap().value, 1.5);
        assert_eq!(store.counter("load").await.unwrap().unwrap().value, 2);
    }

    #[tokio::test]
    async fn test_filtered_read_never_widens() {
        let store = MemoryStore::new();
        store.set_gauge("a", 1.0).await.unwrap();
        store.set_gauge("b", 2.0).await.unwrap();
        store.set_gauge("c", 3.0).await.unwrap();

        let filter = NameFilter::names(["a", "c", "zzz"]);
        let gauges = store.gauges(Some(&filter)).await.unwrap();
        assert_eq!(gauges.len(), 2);
        assert!(gauges.contains_key("a"));
        assert!(gauges.contains_key("c"));

        // The read did not mutate anything.
        assert_eq!(store.gauges(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_applies_in_slice_order() {
        let store = MemoryStore::new();
        let counters = vec![Counter::new("hits", 5), Counter::new("hits", 3)];
        let gauges = vec![Gauge::new("cpu", 0.2), Gauge::new("cpu", 0.9)];
        store.insert_batch(&counters, &gauges).await.unwrap();

        assert_eq!(store.counter("hits").await.unwrap().unwrap().value, 8);
        assert_eq!(store.gauge("cpu").await.unwrap().unwrap().value, 0.9);
    }

    #[tokio::test]
    async fn test_reset_scopes() {
        let store = MemoryStore::new();
        store.set_gauge("cpu", 1.0).await.unwrap();
        store.add_counter("hits", 1).await.unwrap();

        store.reset_counters().await.unwrap();
        assert!(store.counter("hits").await.unwrap().is_none());
        assert!(store.gauge("cpu").await.unwrap().is_some());

        store.reset().await.unwrap();
        assert!(store.gauge("cpu").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_no_lost_updates() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store.add_counter("hits", 1).await.unwrap();
                    store.set_gauge("cpu", 1.0).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.counter("hits").await.unwrap().unwrap().value, 800);
        assert_eq!(store.gauge("cpu").await.unwrap().unwrap().value, 1.0);
    }
}
