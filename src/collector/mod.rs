//! Collector half of the pipeline: ingest surfaces and the metric store.

pub mod http;
pub mod ingest;
pub mod middleware;
pub mod rpc;

pub use ingest::{apply_batch, apply_record};
pub use middleware::IngestGate;

use crate::core::{CollectorConfig, Result, VigilError};
use crate::storage::{FileStore, MemoryStore, MetricStore, SqlStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handler state: the store plus the ingest gate configuration.
#[derive(Clone)]
pub struct CollectorState {
    pub store: Arc<dyn MetricStore>,
    pub gate: Arc<IngestGate>,
}

/// Selects the store backend from configuration.
///
/// A DSN selects the relational backend; if it is unreachable at startup
/// (`NotConnected`) the collector logs and falls through to the file or
/// memory backend rather than refusing to start. Any other open error is
/// fatal.
pub fn build_store(config: &CollectorConfig) -> Result<Arc<dyn MetricStore>> {
    if let Some(dsn) = &config.database_dsn {
        match SqlStore::open(dsn) {
            Ok(store) => {
                tracing::info!(dsn = %dsn, "using relational store");
                return Ok(Arc::new(store));
            },
            Err(VigilError::NotConnected(reason)) => {
                tracing::warn!(dsn = %dsn, reason = %reason, "relational store unreachable, falling back");
            },
            Err(other) => return Err(other),
        }
    }

    if let Some(path) = &config.file_path {
        let store = FileStore::open(path, config.restore, config.sync_save())?;
        tracing::info!(path = %path.display(), sync = config.sync_save(), "using file-backed store");
        return Ok(Arc::new(store));
    }

    tracing::info!("using in-memory store");
    Ok(Arc::new(MemoryStore::new()))
}

/// Completes once the cancellation signal fires (or its sender is gone).
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Timer-driven snapshot persistence. Save errors are logged and the timer
/// keeps running; durability failures never take ingest down.
async fn save_loop(
    store: Arc<dyn MetricStore>,
    interval: std::time::Duration,
    cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(error) = store.save().await {
                    tracing::error!(error = %error, "timed snapshot save failed");
                }
            }
            _ = cancelled(cancel.clone()) => return,
        }
    }
}

/// Runs the collector until the cancellation signal fires: HTTP server,
/// optional GRPC server, optional save timer, final flush on shutdown.
pub async fn run(config: CollectorConfig, cancel: watch::Receiver<bool>) -> Result<()> {
    config.validate()?;
    let store = build_store(&config)?;

    let gate = Arc::new(IngestGate {
        secret_key: config.secret_key.clone(),
        trusted_subnet: config
            .trusted_subnet
            .as_deref()
            .map(|s| s.parse().expect("validated above")),
    });
    let state = CollectorState {
        store: Arc::clone(&store),
        gate,
    };

    let mut tasks = Vec::new();

    if !config.sync_save() && config.file_path.is_some() {
        tasks.push(tokio::spawn(save_loop(
            Arc::clone(&store),
            config.store_interval,
            cancel.clone(),
        )));
    }

    if let Some(grpc_address) = config.grpc_address {
        let service = rpc::MetricsGrpc::new(state.clone()).into_server();
        let shutdown = cancelled(cancel.clone());
        tracing::info!(addr = %grpc_address, "GRPC ingest listening");
        tasks.push(tokio::spawn(async move {
            if let Err(error) = tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_shutdown(grpc_address, shutdown)
                .await
            {
                tracing::error!(error = %error, "GRPC server error");
            }
        }));
    }

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_address).await?;
    tracing::info!(addr = %config.listen_address, "HTTP ingest listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(cancelled(cancel.clone()))
        .await?;

    for task in tasks {
        task.await?;
    }

    // Final flush so a clean shutdown never loses the tail of the store.
    if let Err(error) = store.save().await {
        tracing::error!(error = %error, "final snapshot save failed");
    }
    tracing::info!("collector stopped");
    Ok(())
}
