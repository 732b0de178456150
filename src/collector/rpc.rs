//! GRPC ingest surface sharing the same merge path as HTTP.

use crate::collector::{ingest, CollectorState};
use crate::core::{MetricRecord, VigilError};
use crate::pb::v1::metrics_service_server::{MetricsService, MetricsServiceServer};
use crate::pb::v1::{UpdateBatchRequest, UpdateBatchResponse};
use tonic::{Request, Response, Status};

pub struct MetricsGrpc {
    state: CollectorState,
}

impl MetricsGrpc {
    pub fn new(state: CollectorState) -> Self {
        Self { state }
    }

    pub fn into_server(self) -> MetricsServiceServer<Self> {
        MetricsServiceServer::new(self)
    }
}

fn to_status(error: VigilError) -> Status {
    match error.category() {
        "not_found" => Status::not_found(error.to_string()),
        "validation" => Status::invalid_argument(error.to_string()),
        _ => Status::internal(error.to_string()),
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsGrpc {
    async fn update_batch(
        &self,
        request: Request<UpdateBatchRequest>,
    ) -> std::result::Result<Response<UpdateBatchResponse>, Status> {
        let records: Vec<MetricRecord> = request
            .into_inner()
            .records
            .into_iter()
            .map(Into::into)
            .collect();

        let merged = ingest::apply_batch(self.state.store.as_ref(), &records)
            .await
            .map_err(to_status)?;

        Ok(Response::new(UpdateBatchResponse {
            records: merged.iter().map(Into::into).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::middleware::IngestGate;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn state() -> CollectorState {
        CollectorState {
            store: Arc::new(MemoryStore::new()),
            gate: Arc::new(IngestGate::default()),
        }
    }

    #[tokio::test]
    async fn test_update_batch_merges() {
        let service = MetricsGrpc::new(state());
        let request = UpdateBatchRequest {
            records: vec![
                (&MetricRecord::counter("hits", 5)).into(),
                (&MetricRecord::counter("hits", 3)).into(),
            ],
        };

        let response = service
            .update_batch(Request::new(request))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.records.len(), 1);
        assert_eq!(response.records[0].delta, Some(8));
    }

    #[tokio::test]
    async fn test_invalid_record_maps_to_invalid_argument() {
        let service = MetricsGrpc::new(state());
        let request = UpdateBatchRequest {
            records: vec![(&MetricRecord::counter("hits", -1)).into()],
        };

        let status = service
            .update_batch(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_missing_id_maps_to_not_found() {
        let service = MetricsGrpc::new(state());
        let request = UpdateBatchRequest {
            records: vec![crate::pb::v1::MetricRecord {
                id: String::new(),
                kind: crate::pb::v1::MetricKind::Counter as i32,
                delta: Some(1),
                value: None,
            }],
        };

        let status = service
            .update_batch(Request::new(request))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }
}
