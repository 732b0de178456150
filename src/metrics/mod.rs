//! Struct-typed metric model and its merge laws.
//!
//! Gauges are latest-wins readings; counters are monotonically
//! non-decreasing accumulators. These two laws are the whole data contract
//! between the agent pipeline and the collector's store, so they live here
//! and nowhere else.

use crate::core::{MetricBatch, MetricRecord, Result, VigilError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A latest-wins float reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    pub name: String,
    pub value: f64,
}

impl Gauge {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Replaces the reading unconditionally. No history is retained.
    pub fn set(&mut self, value: f64) {
        self.value = value;
    }
}

/// A monotonically non-decreasing accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub value: i64,
}

impl Counter {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Accumulates a non-negative delta. A negative delta is rejected and
    /// leaves the counter unchanged; this is a hard invariant, not a clamp.
    pub fn add(&mut self, delta: i64) -> Result<()> {
        if delta < 0 {
            return Err(VigilError::NegativeDelta {
                name: self.name.clone(),
                delta,
            });
        }
        self.value += delta;
        Ok(())
    }
}

/// One sampling tick's worth of metrics, owned by a single pipeline stage
/// at a time. Ownership transfers stage to stage; snapshots are never
/// shared-mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub gauges: HashMap<String, f64>,
    pub counters: HashMap<String, i64>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the tick produced nothing at all.
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    /// Records a gauge reading, replacing any prior value.
    pub fn set_gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }

    /// Accumulates a counter delta within this snapshot.
    pub fn add_counter(&mut self, name: impl Into<String>, delta: i64) {
        *self.counters.entry(name.into()).or_insert(0) += delta;
    }

    /// Folds another snapshot into this one: counters add, gauges take the
    /// other side's value.
    pub fn merge(&mut self, other: Snapshot) {
        for (name, value) in other.gauges {
            self.gauges.insert(name, value);
        }
        for (name, delta) in other.counters {
            *self.counters.entry(name).or_insert(0) += delta;
        }
    }

    /// Converts the snapshot into an outgoing wire batch, one record per
    /// gauge and counter.
    pub fn into_batch(self) -> MetricBatch {
        let mut batch = Vec::with_capacity(self.gauges.len() + self.counters.len());
        for (name, value) in self.gauges {
            batch.push(MetricRecord::gauge(name, value));
        }
        for (name, delta) in self.counters {
            batch.push(MetricRecord::counter(name, delta));
        }
        batch
    }
}
