//! Delivery clients: one contract, REST and RPC variants.
//!
//! The retry schedule is fixed rather than exponential: `[1s, 3s, 5s, 0s]`,
//! up to four attempts, the last with no further wait. Whether an error is
//! worth another attempt is a per-variant predicate, not a shared
//! conditional: the REST client retries only network-level connection
//! failures, the RPC client only `Unavailable`/`DeadlineExceeded`.

use crate::core::{MetricBatch, MetricRecord, Result, VigilError};
use std::time::Duration;
use tokio::sync::watch;

pub mod http;
pub mod rpc;

pub use http::HttpDelivery;
pub use rpc::GrpcDelivery;

/// Backoff waits applied after each failed attempt. The terminal zero entry
/// means "no further wait": the schedule is exhausted.
pub const BACKOFF_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
    Duration::ZERO,
];

/// Uniform contract over the REST and RPC delivery variants.
#[async_trait::async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Establishes the connection/session and resolves whatever the
    /// variant injects into headers (e.g. the local outbound IP).
    async fn init(&mut self) -> Result<()>;

    /// One delivery attempt: serialize, frame, send, parse the ack.
    async fn send_batch(&self, batch: &[MetricRecord]) -> Result<MetricBatch>;

    /// Variant-specific transient classification for [`retry_update_batch`].
    fn is_transient(&self, error: &VigilError) -> bool;
}

/// Sends a batch with the fixed retry schedule.
///
/// The cancellation signal is checked before every attempt and observed
/// during backoff sleeps; a cancelled token aborts with
/// [`VigilError::Cancelled`] rather than silently dropping the batch.
/// An empty batch is a no-op, never a send.
pub async fn retry_update_batch(
    client: &dyn DeliveryClient,
    cancel: &watch::Receiver<bool>,
    batch: &[MetricRecord],
) -> Result<MetricBatch> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let mut cancel = cancel.clone();
    for (attempt, delay) in BACKOFF_SCHEDULE.iter().enumerate() {
        if *cancel.borrow() {
            return Err(VigilError::Cancelled);
        }

        match client.send_batch(batch).await {
            Ok(ack) => return Ok(ack),
            Err(error) => {
                if !client.is_transient(&error) || delay.is_zero() {
                    return Err(error);
                }
                tracing::warn!(
                    attempt = attempt + 1,
                    backoff = ?delay,
                    error = %error,
                    "transient delivery failure, backing off"
                );
                if sleep_or_cancel(*delay, &mut cancel).await {
                    return Err(VigilError::Cancelled);
                }
            },
        }
    }

    unreachable!("terminal schedule entry returns from the loop")
}

/// Sleeps for `delay` unless cancellation fires first. Returns true when
/// cancelled.
async fn sleep_or_cancel(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = cancel.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *cancel.borrow() {
                    return true;
                }
            }
        }
    }
}
