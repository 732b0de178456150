//! Snapshot buffering and bounded dispatch.
//!
//! Two timers and a worker pool, all independent tasks joined only by
//! bounded channels and the shared cancellation signal:
//!
//! - the poll timer samples and appends snapshots to a bounded buffer
//!   channel (backpressure, never unbounded growth);
//! - the report timer drains everything buffered since its last fire into
//!   the worker queue and clears the buffer;
//! - `rate_limit` workers each own one delivery client and pull snapshots
//!   from the shared queue.
//!
//! Shutdown closes the channels front to back, so workers drain what was
//! queued before the pipeline returns.

use crate::agent::sampler::Sampler;
use crate::client::{retry_update_batch, DeliveryClient};
use crate::core::{AgentConfig, Result, VigilError};
use crate::metrics::Snapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

/// Agent-side pipeline: sampler, buffer, report fan-out, worker pool.
pub struct Dispatcher {
    config: AgentConfig,
}

impl Dispatcher {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Runs the pipeline until the cancellation signal fires, then drains
    /// and returns. One delivery client per worker; `init` is called on
    /// each before any work starts.
    pub async fn run(
        self,
        sampler: Sampler,
        mut clients: Vec<Box<dyn DeliveryClient>>,
        cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        if clients.is_empty() {
            return Err(VigilError::config("dispatcher needs at least one delivery client"));
        }
        for client in &mut clients {
            client.init().await?;
        }

        let (snapshot_tx, snapshot_rx) = mpsc::channel::<Snapshot>(self.config.snapshot_buffer);
        let (job_tx, job_rx) = mpsc::channel::<Snapshot>(clients.len());
        let job_rx = Arc::new(Mutex::new(job_rx));

        let poll = tokio::spawn(poll_loop(
            sampler,
            self.config.poll_interval,
            snapshot_tx,
            cancel.clone(),
        ));
        let report = tokio::spawn(report_loop(
            self.config.report_interval,
            snapshot_rx,
            job_tx,
            cancel.clone(),
        ));

        let mut workers = Vec::with_capacity(clients.len());
        for (id, client) in clients.into_iter().enumerate() {
            workers.push(tokio::spawn(worker_loop(
                id,
                client,
                Arc::clone(&job_rx),
                cancel.clone(),
            )));
        }

        poll.await?;
        report.await?;
        for worker in workers {
            worker.await?;
        }
        tracing::info!("dispatcher drained and stopped");
        Ok(())
    }
}

/// Completes once the cancellation signal fires (or its sender is gone).
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn poll_loop(
    sampler: Sampler,
    interval: Duration,
    snapshot_tx: mpsc::Sender<Snapshot>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(snapshot) = sampler.sample().await else {
                    continue;
                };
                // Bounded send: blocks when the buffer is full, aborted by
                // cancellation.
                tokio::select! {
                    sent = snapshot_tx.send(snapshot) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                    _ = cancelled(&mut cancel) => return,
                }
            }
            _ = cancelled(&mut cancel) => return,
        }
    }
    // Dropping snapshot_tx closes the buffer toward the report loop.
}

async fn report_loop(
    interval: Duration,
    mut snapshot_rx: mpsc::Receiver<Snapshot>,
    job_tx: mpsc::Sender<Snapshot>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut buffer: Vec<Snapshot> = Vec::new();

    loop {
        tokio::select! {
            received = snapshot_rx.recv() => match received {
                Some(snapshot) => buffer.push(snapshot),
                // Poll loop is gone; flush what is left and stop.
                None => {
                    flush(&mut buffer, &job_tx).await;
                    return;
                }
            },
            _ = ticker.tick() => {
                flush(&mut buffer, &job_tx).await;
            }
            _ = cancelled(&mut cancel) => {
                // Collect anything already buffered in the channel, then
                // hand the final report to the workers.
                while let Ok(snapshot) = snapshot_rx.try_recv() {
                    buffer.push(snapshot);
                }
                flush(&mut buffer, &job_tx).await;
                return;
            }
        }
    }
    // Dropping job_tx closes the queue toward the workers.
}

/// Pushes every buffered snapshot into the worker queue and clears the
/// buffer. All snapshots buffered since the previous fire dispatch before
/// the buffer is reused.
async fn flush(buffer: &mut Vec<Snapshot>, job_tx: &mpsc::Sender<Snapshot>) {
    for snapshot in buffer.drain(..) {
        if job_tx.send(snapshot).await.is_err() {
            tracing::warn!("worker queue closed, dropping buffered snapshots");
            return;
        }
    }
}

async fn worker_loop(
    id: usize,
    client: Box<dyn DeliveryClient>,
    jobs: Arc<Mutex<mpsc::Receiver<Snapshot>>>,
    cancel: watch::Receiver<bool>,
) {
    loop {
        // Lock only around the dequeue; delivery runs unlocked so workers
        // send concurrently.
        let job = { jobs.lock().await.recv().await };
        let Some(snapshot) = job else {
            tracing::debug!(worker = id, "queue closed, worker exiting");
            return;
        };

        let batch = snapshot.into_batch();
        if batch.is_empty() {
            continue;
        }

        match retry_update_batch(client.as_ref(), &cancel, &batch).await {
            Ok(ack) => {
                tracing::debug!(worker = id, records = batch.len(), acked = ack.len(), "batch delivered");
            },
            Err(VigilError::Cancelled) => {
                tracing::debug!(worker = id, "delivery cancelled during shutdown");
            },
            Err(error) => {
                // A failed cycle is logged and dropped; the pipeline moves
                // on to the next buffered batch.
                tracing::warn!(
                    worker = id,
                    category = error.category(),
                    error = %error,
                    "delivery failed, dropping batch"
                );
            },
        }
    }
}
