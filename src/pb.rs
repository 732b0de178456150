//! Generated RPC bindings plus conversions to the wire record model.

#[allow(clippy::all)]
pub mod v1 {
    tonic::include_proto!("vigil.v1");
}

use crate::core::{MetricKind, MetricRecord};

impl From<&MetricRecord> for v1::MetricRecord {
    fn from(record: &MetricRecord) -> Self {
        let kind = match record.kind {
            Some(MetricKind::Gauge) => v1::MetricKind::Gauge,
            Some(MetricKind::Counter) => v1::MetricKind::Counter,
            None => v1::MetricKind::Unspecified,
        };
        v1::MetricRecord {
            id: record.id.clone(),
            kind: kind as i32,
            delta: record.delta,
            value: record.value,
        }
    }
}

impl From<v1::MetricRecord> for MetricRecord {
    fn from(record: v1::MetricRecord) -> Self {
        let kind = match v1::MetricKind::try_from(record.kind) {
            Ok(v1::MetricKind::Gauge) => Some(MetricKind::Gauge),
            Ok(v1::MetricKind::Counter) => Some(MetricKind::Counter),
            // Unknown enum values fail validation downstream, same as a
            // missing type on the JSON surface.
            _ => None,
        };
        MetricRecord {
            id: record.id,
            kind,
            delta: record.delta,
            value: record.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let counter = MetricRecord::counter("hits", 5);
        let wire: v1::MetricRecord = (&counter).into();
        assert_eq!(wire.kind, v1::MetricKind::Counter as i32);
        let back: MetricRecord = wire.into();
        assert_eq!(back, counter);

        let gauge = MetricRecord::gauge("cpu", 0.25);
        let back: MetricRecord = v1::MetricRecord::from(&gauge).into();
        assert_eq!(back, gauge);
    }

    #[test]
    fn test_unspecified_kind_maps_to_none() {
        let wire = v1::MetricRecord {
            id: "x".into(),
            kind: 0,
            delta: None,
            value: None,
        };
        let record: MetricRecord = wire.into();
        assert!(record.kind.is_none());
        assert!(record.validate().is_err());
    }
}
