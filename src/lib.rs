//! Vigil is a push-model runtime metrics pipeline.
//!
//! The agent half samples host and process metrics on a poll timer,
//! buffers snapshots, and pushes batches to a collector over HTTP or GRPC
//! through a pool of delivery workers with a fixed retry schedule. The
//! collector half validates and merges pushed batches into a metric store
//! with pluggable durability: in-memory, JSON snapshot file, or SQLite.
//!
//! # Architecture
//!
//! - [`agent`] - sampling, snapshot buffering, and the delivery pipeline
//! - [`client`] - HTTP and GRPC delivery clients with retry
//! - [`collector`] - ingest surfaces, merge semantics, server wiring
//! - [`storage`] - the [`storage::MetricStore`] trait and its backends
//! - [`metrics`] - gauge and counter primitives and snapshots
//! - [`core`] - configuration, error taxonomy, and wire types

pub mod agent;
pub mod cli;
pub mod client;
pub mod collector;
pub mod core;
pub mod metrics;
pub mod pb;
pub mod storage;

pub use crate::core::{
    AgentConfig, CollectorConfig, MetricBatch, MetricKind, MetricRecord, Result, VigilError,
};
