//! HTTP ingest surface.
//!
//! Path-encoded single forms, JSON single and batch forms, a plain-text
//! read form, a connectivity probe, and an index listing. Handlers stay
//! thin: validation and merge live in [`ingest`](super::ingest), the error
//! taxonomy maps onto status codes here.

use crate::collector::{ingest, middleware, CollectorState};
use crate::core::{MetricKind, MetricRecord, VigilError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::fmt::Write as _;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Builds the collector router with the ingest gate and response layers.
pub fn router(state: CollectorState) -> Router {
    let gate = state.gate.clone();
    Router::new()
        .route("/update/:kind/:name/:value", post(update_path))
        .route("/value/:kind/:name", get(value_path))
        .route("/update/", post(update_json))
        .route("/updates/", post(updates_json))
        .route("/ping", get(ping))
        .route("/", get(index))
        .layer(axum::middleware::from_fn_with_state(gate, middleware::ingest_gate))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Maps the error taxonomy onto response statuses.
pub struct HttpError(VigilError);

impl From<VigilError> for HttpError {
    fn from(error: VigilError) -> Self {
        Self(error)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match self.0.category() {
            "not_found" => StatusCode::NOT_FOUND,
            "validation" => StatusCode::BAD_REQUEST,
            "auth" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(category = self.0.category(), error = %self.0, "request failed");
        } else {
            tracing::debug!(category = self.0.category(), error = %self.0, "request rejected");
        }
        (status, self.0.to_string()).into_response()
    }
}

type HandlerResult<T> = std::result::Result<T, HttpError>;

/// Builds a wire record from the path-encoded form.
fn record_from_path(kind: &str, name: &str, value: &str) -> Result<MetricRecord, VigilError> {
    let kind: MetricKind = kind.parse()?;
    match kind {
        MetricKind::Gauge => {
            let value: f64 = value.parse().map_err(|_| VigilError::MissingField {
                id: name.to_string(),
                kind: "gauge",
                field: "value",
            })?;
            Ok(MetricRecord::gauge(name, value))
        },
        MetricKind::Counter => {
            let delta: i64 = value.parse().map_err(|_| VigilError::MissingField {
                id: name.to_string(),
                kind: "counter",
                field: "delta",
            })?;
            Ok(MetricRecord::counter(name, delta))
        },
    }
}

async fn update_path(
    State(state): State<CollectorState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> HandlerResult<StatusCode> {
    let record = record_from_path(&kind, &name, &value)?;
    ingest::apply_record(state.store.as_ref(), &record).await?;
    Ok(StatusCode::OK)
}

async fn value_path(
    State(state): State<CollectorState>,
    Path((kind, name)): Path<(String, String)>,
) -> HandlerResult<String> {
    let kind: MetricKind = kind.parse().map_err(HttpError::from)?;
    let text = match kind {
        MetricKind::Gauge => {
            let gauge = state
                .store
                .gauge(&name)
                .await?
                .ok_or(VigilError::NotFound(name))?;
            format!("{}", gauge.value)
        },
        MetricKind::Counter => {
            let counter = state
                .store
                .counter(&name)
                .await?
                .ok_or(VigilError::NotFound(name))?;
            format!("{}", counter.value)
        },
    };
    Ok(text)
}

async fn update_json(
    State(state): State<CollectorState>,
    Json(record): Json<MetricRecord>,
) -> HandlerResult<Json<MetricRecord>> {
    let merged = ingest::apply_record(state.store.as_ref(), &record).await?;
    Ok(Json(merged))
}

async fn updates_json(
    State(state): State<CollectorState>,
    Json(records): Json<Vec<MetricRecord>>,
) -> HandlerResult<Json<Vec<MetricRecord>>> {
    let merged = ingest::apply_batch(state.store.as_ref(), &records).await?;
    Ok(Json(merged))
}

async fn ping(State(state): State<CollectorState>) -> HandlerResult<StatusCode> {
    state.store.ping().await?;
    Ok(StatusCode::OK)
}

/// Plain-text listing of every known metric, gauges then counters, sorted
/// by name.
async fn index(State(state): State<CollectorState>) -> HandlerResult<String> {
    let gauges = state.store.gauges(None).await?;
    let counters = state.store.counters(None).await?;

    let mut names: Vec<_> = gauges.keys().collect();
    names.sort();
    let mut out = String::new();
    for name in names {
        let _ = writeln!(out, "{} gauge {}", name, gauges[name].value);
    }
    let mut names: Vec<_> = counters.keys().collect();
    names.sort();
    for name in names {
        let _ = writeln!(out, "{} counter {}", name, counters[name].value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_path() {
        let gauge = record_from_path("gauge", "cpu", "0.5").unwrap();
        assert_eq!(gauge, MetricRecord::gauge("cpu", 0.5));

        let counter = record_from_path("counter", "hits", "12").unwrap();
        assert_eq!(counter, MetricRecord::counter("hits", 12));
    }

    #[test]
    fn test_record_from_path_rejects_bad_input() {
        assert!(matches!(
            record_from_path("histogram", "x", "1"),
            Err(VigilError::UnknownKind(_))
        ));
        // A counter value must be integral.
        assert!(matches!(
            record_from_path("counter", "hits", "1.5"),
            Err(VigilError::MissingField { .. })
        ));
        assert!(matches!(
            record_from_path("gauge", "cpu", "abc"),
            Err(VigilError::MissingField { .. })
        ));
    }
}
