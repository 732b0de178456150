//! Pluggable metric store backends.
//!
//! One contract, three implementations: in-memory maps, in-memory plus a
//! JSON snapshot file, and a relational upsert backend. The file store is
//! deliberately "memory store plus a save/load capability" rather than a
//! second merge engine.

use crate::core::Result;
use crate::metrics::{Counter, Gauge};
use std::collections::{HashMap, HashSet};

pub mod file;
pub mod memory;
pub mod sql;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Restricts a bulk read to a set of names. Filters never mutate state and
/// never widen the result set.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    names: HashSet<String>,
}

impl NameFilter {
    /// Builds a filter from an iterator of names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Contract every store backend implements.
///
/// Mutation and read for the same name are linearizable; no reader observes
/// a partially-applied batch entry for a name. Returned maps are copies,
/// never aliases of internal storage.
#[async_trait::async_trait]
pub trait MetricStore: Send + Sync {
    /// Replaces the gauge value. Errors only on an empty name.
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Accumulates a counter delta. Errors on an empty name or a negative
    /// delta; a rejected delta leaves the counter unchanged.
    async fn add_counter(&self, name: &str, delta: i64) -> Result<()>;

    /// Point lookup of a gauge.
    async fn gauge(&self, name: &str) -> Result<Option<Gauge>>;

    /// Point lookup of a counter.
    async fn counter(&self, name: &str) -> Result<Option<Counter>>;

    /// Bulk gauge read, optionally restricted to a name set.
    async fn gauges(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Gauge>>;

    /// Bulk counter read, optionally restricted to a name set.
    async fn counters(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Counter>>;

    /// Applies counter deltas and gauge sets as one logical unit.
    ///
    /// Relational backends roll the whole batch back on partial failure;
    /// the in-memory backend applies same-name entries in slice order.
    async fn insert_batch(&self, counters: &[Counter], gauges: &[Gauge]) -> Result<()>;

    /// Clears both namespaces.
    async fn reset(&self) -> Result<()>;

    /// Clears the counter namespace.
    async fn reset_counters(&self) -> Result<()>;

    /// Clears the gauge namespace.
    async fn reset_gauges(&self) -> Result<()>;

    /// Backend connectivity probe. A `NotConnected` error here tells the
    /// caller a fallback backend is worth trying.
    async fn ping(&self) -> Result<()>;

    /// Synchronous persistence hook. No-op for backends without one.
    async fn save(&self) -> Result<()> {
        Ok(())
    }

    /// True when `save` should run after every ingest instead of on a timer.
    fn supports_sync_save(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_filter() {
        let filter = NameFilter::names(["a", "b"]);
        assert!(filter.contains("a"));
        assert!(filter.contains("b"));
        assert!(!filter.contains("c"));
    }
}
