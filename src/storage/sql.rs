//! Relational metric store backed by SQLite.
//!
//! Each kind lives in its own table keyed by name and is merged with an
//! upsert: counters accumulate (`value = value + excluded.value`), gauges
//! replace (`value = excluded.value`). Every call runs on the blocking pool
//! behind a short timeout so a stalled backend cannot wedge a request.
//! Batches apply inside one transaction and roll back wholesale on failure.

use crate::core::{Result, VigilError};
use crate::metrics::{Counter, Gauge};
use crate::storage::{MetricStore, NameFilter};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const CALL_TIMEOUT: Duration = Duration::from_secs(3);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metrics_gauge (
    name  TEXT PRIMARY KEY,
    value DOUBLE NOT NULL
);
CREATE TABLE IF NOT EXISTS metrics_counter (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const UPSERT_COUNTER: &str = "INSERT INTO metrics_counter (name, value) VALUES (?1, ?2)
     ON CONFLICT(name) DO UPDATE SET value = value + excluded.value";

const UPSERT_GAUGE: &str = "INSERT INTO metrics_gauge (name, value) VALUES (?1, ?2)
     ON CONFLICT(name) DO UPDATE SET value = excluded.value";

/// SQLite-backed store. The connection sits behind a mutex; concurrency
/// comes from the short-lived blocking tasks, not from parallel statements.
#[derive(Debug)]
pub struct SqlStore {
    conn: Arc<Mutex<Connection>>,
    timeout: Duration,
}

impl SqlStore {
    /// Opens (or creates) the database at `dsn` and ensures the schema.
    /// Open failures surface as `NotConnected` so callers can pick a
    /// fallback backend.
    pub fn open(dsn: &str) -> Result<Self> {
        let conn = Connection::open(dsn)
            .map_err(|e| VigilError::not_connected(format!("open {dsn}: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| VigilError::not_connected(format!("schema init: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            timeout: CALL_TIMEOUT,
        })
    }

    /// Runs a statement batch on the blocking pool, bounded by the per-call
    /// timeout.
    async fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            op(&mut conn)
        });
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(VigilError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Ok(joined) => joined?.map_err(map_sql_error),
        }
    }
}

fn map_sql_error(e: rusqlite::Error) -> VigilError {
    match e {
        rusqlite::Error::SqliteFailure(code, ref msg)
            if matches!(
                code.code,
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            VigilError::not_connected(msg.clone().unwrap_or_else(|| code.to_string()))
        },
        other => VigilError::storage(other.to_string()),
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VigilError::EmptyName);
    }
    Ok(())
}

#[async_trait::async_trait]
impl MetricStore for SqlStore {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        check_name(name)?;
        let name = name.to_string();
        self.call(move |conn| conn.execute(UPSERT_GAUGE, rusqlite::params![name, value]))
            .await?;
        Ok(())
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<()> {
        check_name(name)?;
        if delta < 0 {
            return Err(VigilError::NegativeDelta {
                name: name.to_string(),
                delta,
            });
        }
        let name = name.to_string();
        self.call(move |conn| conn.execute(UPSERT_COUNTER, rusqlite::params![name, delta]))
            .await?;
        Ok(())
    }

    async fn gauge(&self, name: &str) -> Result<Option<Gauge>> {
        let name = name.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare("SELECT name, value FROM metrics_gauge WHERE name = ?1")?;
            let mut rows = stmt.query_map([&name], |row| {
                Ok(Gauge::new(row.get::<_, String>(0)?, row.get(1)?))
            })?;
            rows.next().transpose()
        })
        .await
    }

    async fn counter(&self, name: &str) -> Result<Option<Counter>> {
        let name = name.to_string();
        self.call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT name, value FROM metrics_counter WHERE name = ?1")?;
            let mut rows = stmt.query_map([&name], |row| {
                Ok(Counter::new(row.get::<_, String>(0)?, row.get(1)?))
            })?;
            rows.next().transpose()
        })
        .await
    }

    async fn gauges(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Gauge>> {
        let filter = filter.cloned();
        self.call(move |conn| {
            let mut stmt = conn.prepare("SELECT name, value FROM metrics_gauge")?;
            let rows = stmt.query_map([], |row| {
                Ok(Gauge::new(row.get::<_, String>(0)?, row.get(1)?))
            })?;
            let mut out = HashMap::new();
            for gauge in rows {
                let gauge = gauge?;
                if filter.as_ref().map_or(true, |f| f.contains(&gauge.name)) {
                    out.insert(gauge.name.clone(), gauge);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn counters(&self, filter: Option<&NameFilter>) -> Result<HashMap<String, Counter>> {
        let filter = filter.cloned();
        self.call(move |conn| {
            let mut stmt = conn.prepare("SELECT name, value FROM metrics_counter")?;
            let rows = stmt.query_map([], |row| {
                Ok(Counter::new(row.get::<_, String>(0)?, row.get(1)?))
            })?;
            let mut out = HashMap::new();
            for counter in rows {
                let counter = counter?;
                if filter.as_ref().map_or(true, |f| f.contains(&counter.name)) {
                    out.insert(counter.name.clone(), counter);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn insert_batch(&self, counters: &[Counter], gauges: &[Gauge]) -> Result<()> {
        // Pre-validate so a bad entry never opens a transaction.
        for counter in counters {
            check_name(&counter.name)?;
            if counter.value < 0 {
                return Err(VigilError::NegativeDelta {
                    name: counter.name.clone(),
                    delta: counter.value,
                });
            }
        }
        for gauge in gauges {
            check_name(&gauge.name)?;
        }

        let counters = counters.to_vec();
        let gauges = gauges.to_vec();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            for counter in &counters {
                tx.execute(UPSERT_COUNTER, rusqlite::params![counter.name, counter.value])?;
            }
            for gauge in &gauges {
                tx.execute(UPSERT_GAUGE, rusqlite::params![gauge.name, gauge.value])?;
            }
            tx.commit()
        })
        .await
    }

    async fn reset(&self) -> Result<()> {
        self.call(|conn| {
            conn.execute_batch("DELETE FROM metrics_gauge; DELETE FROM metrics_counter;")
        })
        .await
    }

    async fn reset_counters(&self) -> Result<()> {
        self.call(|conn| conn.execute("DELETE FROM metrics_counter", []).map(|_| ()))
            .await
    }

    async fn reset_gauges(&self) -> Result<()> {
        self.call(|conn| conn.execute("DELETE FROM metrics_gauge", []).map(|_| ()))
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.call(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
            .map_err(|e| match e {
                VigilError::Storage(msg) => VigilError::NotConnected(msg),
                other => other,
            })
    }
}
