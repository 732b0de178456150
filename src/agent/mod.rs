//! Agent half of the pipeline: sample, aggregate, dispatch, deliver.

pub mod dispatcher;
pub mod sampler;

pub use dispatcher::Dispatcher;
pub use sampler::Sampler;

use crate::client::{DeliveryClient, GrpcDelivery, HttpDelivery};
use crate::core::{AgentConfig, Result, Transport};
use tokio::sync::watch;

/// Builds the worker pool's delivery clients, one per worker, selected by
/// the configured transport.
pub fn build_clients(config: &AgentConfig) -> Result<Vec<Box<dyn DeliveryClient>>> {
    let pool_size = config.rate_limit.max(1);
    let mut clients: Vec<Box<dyn DeliveryClient>> = Vec::with_capacity(pool_size);
    for _ in 0..pool_size {
        let client: Box<dyn DeliveryClient> = match config.transport {
            Transport::Http => Box::new(HttpDelivery::new(
                config.server_address.clone(),
                config.secret_key.clone(),
            )?),
            Transport::Grpc => Box::new(GrpcDelivery::new(config.server_address.clone())?),
        };
        clients.push(client);
    }
    Ok(clients)
}

/// Runs the whole agent pipeline until the cancellation signal fires.
pub async fn run(config: AgentConfig, cancel: watch::Receiver<bool>) -> Result<()> {
    config.validate()?;
    tracing::info!(
        server = %config.server_address,
        poll = ?config.poll_interval,
        report = ?config.report_interval,
        workers = config.rate_limit,
        transport = ?config.transport,
        "starting agent pipeline"
    );

    let clients = build_clients(&config)?;
    let dispatcher = Dispatcher::new(config);
    dispatcher.run(Sampler::new(), clients, cancel).await
}
