//! Wire-level metric records shared by both halves of the pipeline.
//!
//! The agent serializes these records into batches; the collector validates
//! them before they ever touch the store. Exactly one of `delta`/`value` is
//! populated in the canonical form, matching the record kind.

use crate::core::{Result, VigilError};
use serde::{Deserialize, Serialize};

/// Kind half of a metric identity. The same name may exist as both a gauge
/// and a counter independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(VigilError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metric sample on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Metric name.
    pub id: String,
    /// Metric kind; `None` models a record that arrived without a type.
    #[serde(rename = "type")]
    pub kind: Option<MetricKind>,
    /// Counter increment. Populated only for counter records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    /// Gauge reading. Populated only for gauge records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    /// Builds a canonical gauge record.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: Some(MetricKind::Gauge),
            delta: None,
            value: Some(value),
        }
    }

    /// Builds a canonical counter record.
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: Some(MetricKind::Counter),
            delta: Some(delta),
            value: None,
        }
    }

    /// Validates the record shape without touching any store.
    ///
    /// Check order is fixed: identifier, then type, then the field the type
    /// requires. The first failure wins and classifies the whole record.
    pub fn validate(&self) -> Result<MetricKind> {
        if self.id.is_empty() {
            return Err(VigilError::MissingId);
        }
        let kind = self.kind.ok_or_else(|| VigilError::MissingKind {
            id: self.id.clone(),
        })?;
        match kind {
            MetricKind::Counter => {
                let delta = self.delta.ok_or(VigilError::MissingField {
                    id: self.id.clone(),
                    kind: "counter",
                    field: "delta",
                })?;
                if delta < 0 {
                    return Err(VigilError::NegativeDelta {
                        name: self.id.clone(),
                        delta,
                    });
                }
            },
            MetricKind::Gauge => {
                if self.value.is_none() {
                    return Err(VigilError::MissingField {
                        id: self.id.clone(),
                        kind: "gauge",
                        field: "value",
                    });
                }
            },
        }
        Ok(kind)
    }
}

/// An ordered batch of wire records. Order matters: same-name counters
/// accumulate in batch order, same-name gauges take the last value.
pub type MetricBatch = Vec<MetricRecord>;
