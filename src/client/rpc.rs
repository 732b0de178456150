//! RPC delivery client.
//!
//! Same contract as the REST variant over a tonic channel. Its transient
//! predicate is the status-code pair `Unavailable`/`DeadlineExceeded`;
//! every other status aborts the retry schedule immediately.

use crate::client::DeliveryClient;
use crate::core::{MetricBatch, MetricRecord, Result, VigilError};
use crate::pb::v1::metrics_service_client::MetricsServiceClient;
use crate::pb::v1::UpdateBatchRequest;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// tonic-based delivery client.
pub struct GrpcDelivery {
    endpoint: Endpoint,
    client: Option<MetricsServiceClient<Channel>>,
}

impl GrpcDelivery {
    pub fn new(server_address: impl Into<String>) -> Result<Self> {
        let endpoint = Endpoint::from_shared(server_address.into())
            .map_err(|e| VigilError::config(format!("invalid GRPC address: {e}")))?
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5));
        Ok(Self {
            endpoint,
            client: None,
        })
    }
}

#[async_trait::async_trait]
impl DeliveryClient for GrpcDelivery {
    async fn init(&mut self) -> Result<()> {
        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| VigilError::network(format!("GRPC connect: {e}")))?;
        tracing::debug!(server = %self.endpoint.uri(), "RPC delivery client connected");
        self.client = Some(MetricsServiceClient::new(channel));
        Ok(())
    }

    async fn send_batch(&self, batch: &[MetricRecord]) -> Result<MetricBatch> {
        let mut client = self
            .client
            .clone()
            .ok_or_else(|| VigilError::network("GRPC client not initialized"))?;

        let request = UpdateBatchRequest {
            records: batch.iter().map(Into::into).collect(),
        };
        let response = client.update_batch(request).await?;
        Ok(response
            .into_inner()
            .records
            .into_iter()
            .map(Into::into)
            .collect())
    }

    fn is_transient(&self, error: &VigilError) -> bool {
        match error {
            VigilError::Grpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded
            ),
            _ => false,
        }
    }
}
