//! ingress-gateway - a host, path and SNI routing ingress gateway.
//!
//! The gateway watches a cluster manifest (ingresses, the services they
//! reference and their TLS secrets), compiles it into an immutable routing
//! table and serves plain HTTP and TLS traffic from whichever table is current.
//! Bursts of cluster changes are coalesced into a single rebuild, and a new
//! table is swapped in atomically so request handling never blocks on it.
//!
//! # Features
//! - Host and regex path routing with per-ingress default backends
//! - SNI certificate selection with wildcard TLS hosts
//! - Named service port resolution, `https` upstreams via annotation
//! - File (watched) and HTTP (polled) cluster sources
//! - Structured logging via `tracing`, metrics via the `metrics` facade
//! - Graceful shutdown with bounded draining
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use ingress_gateway::{
//!     RoutingTable, RoutingTableStore, adapters::FileSnapshotProvider,
//!     ports::SnapshotProvider,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let provider = FileSnapshotProvider::new("cluster.yaml")?;
//! let snapshot = provider.list_ingress_rules().await?;
//! let store = Arc::new(RoutingTableStore::new());
//! store.replace(RoutingTable::build(Some(&snapshot)));
//! println!("{:?}", store.current().get_backend("www.example.com", "/"));
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! routing logic inside `core`. The binary wires a snapshot provider, the rebuild pipeline,
//! the routing table store and both listeners together.
//!
//! # Error Handling
//! Library modules return domain specific `thiserror` types; bootstrap code returns
//! `eyre::Result<T>` with context attached using `WrapErr`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, IngressServer},
    core::{RebuildPipeline, RoutingTable, RoutingTableStore},
    ports::{http_client::HttpClient, snapshot_provider::SnapshotProvider},
    utils::GracefulShutdown,
};
