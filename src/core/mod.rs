//! Core domain models shared by the agent and collector.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AgentConfig, CollectorConfig, Transport};
pub use error::{Result, VigilError};
pub use types::{MetricBatch, MetricKind, MetricRecord};
