//! Batch validation and merge-on-ingest.
//!
//! A batch is validated in full before anything is applied: the first
//! invalid record aborts the whole batch with that record's
//! classification. Valid records are grouped by kind, deduplicated by
//! merge order (counters accumulate in batch order, gauges take the last
//! value), applied as one store batch, and read back post-merge.

use crate::core::{MetricBatch, MetricKind, MetricRecord, Result, VigilError};
use crate::metrics::{Counter, Gauge};
use crate::storage::MetricStore;
use std::collections::HashMap;

/// Applies a wire batch to the store and returns one post-merge record per
/// distinct (name, kind) in the input, in first-seen order.
///
/// When the backend supports synchronous persistence, a save is triggered
/// after a successful apply; save errors are logged, never surfaced.
/// Ingest success is independent of snapshot durability timing.
pub async fn apply_batch(store: &dyn MetricStore, records: &[MetricRecord]) -> Result<MetricBatch> {
    // Validate everything before touching the store.
    for record in records {
        record.validate()?;
    }

    // Group by kind, dedupe same-name entries by merge order.
    let mut counter_order: Vec<String> = Vec::new();
    let mut counter_deltas: HashMap<String, i64> = HashMap::new();
    let mut gauge_order: Vec<String> = Vec::new();
    let mut gauge_values: HashMap<String, f64> = HashMap::new();

    for record in records {
        match record.kind {
            Some(MetricKind::Counter) => {
                let delta = record.delta.unwrap_or_default();
                counter_deltas
                    .entry(record.id.clone())
                    .and_modify(|total| *total += delta)
                    .or_insert_with(|| {
                        counter_order.push(record.id.clone());
                        delta
                    });
            },
            Some(MetricKind::Gauge) => {
                let value = record.value.unwrap_or_default();
                if gauge_values.insert(record.id.clone(), value).is_none() {
                    gauge_order.push(record.id.clone());
                }
            },
            None => unreachable!("validated above"),
        }
    }

    let counters: Vec<Counter> = counter_order
        .iter()
        .map(|name| Counter::new(name.clone(), counter_deltas[name]))
        .collect();
    let gauges: Vec<Gauge> = gauge_order
        .iter()
        .map(|name| Gauge::new(name.clone(), gauge_values[name]))
        .collect();

    store.insert_batch(&counters, &gauges).await?;

    // Read back the post-merge values, one record per distinct identity.
    let mut merged = Vec::with_capacity(counters.len() + gauges.len());
    for name in &counter_order {
        let counter = store
            .counter(name)
            .await?
            .ok_or_else(|| VigilError::NotFound(name.clone()))?;
        merged.push(MetricRecord::counter(name.clone(), counter.value));
    }
    for name in &gauge_order {
        let gauge = store
            .gauge(name)
            .await?
            .ok_or_else(|| VigilError::NotFound(name.clone()))?;
        merged.push(MetricRecord::gauge(name.clone(), gauge.value));
    }

    if store.supports_sync_save() {
        if let Err(error) = store.save().await {
            tracing::error!(error = %error, "synchronous save failed after ingest");
        }
    }

    Ok(merged)
}

/// Applies a single record and returns its post-merge form.
pub async fn apply_record(store: &dyn MetricStore, record: &MetricRecord) -> Result<MetricRecord> {
    let mut merged = apply_batch(store, std::slice::from_ref(record)).await?;
    merged
        .pop()
        .ok_or_else(|| VigilError::storage("merged batch came back empty"))
}
