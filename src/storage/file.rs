//! File-backed metric store.
//!
//! Composed as "in-memory store plus a save/load capability": all merge
//! logic stays in [`MemoryStore`], this layer only (de)serializes the whole
//! store as one JSON document. Saves are guarded by a single writer lock so
//! concurrent saves cannot interleave, and the file is fully rewritten on
//! every save.

use crate::core::{Result, VigilError};
use crate::metrics::{Counter, Gauge};
use crate::storage::{MemoryStore, MetricStore, NameFilter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// On-disk snapshot document. Sorted maps keep the serialized bytes stable
/// across save/load cycles.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    gauges: BTreeMap<String, Gauge>,
    counters: BTreeMap<String, Counter>,
}

/// Memory store with whole-document JSON persistence.
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    sync_save: bool,
    // Serializes save sections; never held across a merge.
    save_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a file store. With `restore` set, an existing snapshot file is
    /// loaded; a missing file is not an error on first run.
    pub fn open(path: impl Into<PathBuf>, restore: bool, sync_save: bool) -> Result<Self> {
        let store = Self {
            inner: MemoryStore::new(),
            path: path.into(),
            sync_save,
            save_lock: Mutex::new(()),
        };
        if restore {
            store.load()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot file into the store, replacing current contents.
    pub fn load(&self) -> Result<()> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no snapshot file, starting empty");
                return Ok(());
            },
            Err(e) => return Err(VigilError::Io(e)),
        };
        let doc: SnapshotFile = serde_json::from_slice(&raw)?;
        self.inner.replace_all(
            doc.gauges.into_iter().collect(),
            doc.counters.into_iter().collect(),
        );
        tracing::info!(path = %self.path.display(), "restored metrics snapshot");
        Ok(())
    }

    /// Serializes the whole store and rewrites the snapshot file.
    ///
    /// The store dump happens under the writer lock but before any IO, so
    /// the document is a consistent point-in-time copy.
    pub fn save_snapshot(&self) -> Result<()> {
        let _writer = self.save_lock.lock();
        let (gauges, counters) = self.inner.dump();
        let doc = SnapshotFile {
            gauges: gauges.into_iter().collect(),
            counters: counters.into_iter().collect(),
        };
        let raw = serde_json::to_vec(&doc)?;

        // Write-then-rename keeps a crash from truncating the snapshot.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetricStore for FileStore {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.inner.set_gauge(name, value).await
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.inner.add_counter(name, delta).await
    }

    async fn gauge(&self, name: &str) -> Result<Option<Gauge>> {
        self.inner.gauge(name).await
    }

    async fn counter(&self, name: &str) -> Result<Option<Counter>> {
        self.inner.counter(name).await
    }

    async fn gauges(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Gauge>> {
        self.inner.gauges(filter).await
    }

    async fn counters(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Counter>> {
        self.inner.counters(filter).await
    }

    async fn insert_batch(&self, counters: &[Counter], gauges: &[Gauge]) -> Result<()> {
        self.inner.insert_batch(counters, gauges).await
    }

    async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }

    async fn reset_counters(&self) -> Result<()> {
        self.inner.reset_counters().await
    }

    async fn reset_gauges(&self) -> Result<()> {
        self.inner.reset_gauges().await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        self.save_snapshot()
    }

    fn supports_sync_save(&self) -> bool {
        self.sync_save
    }
}
