pub mod http_client;
pub mod http_handler;
pub mod server;
pub mod snapshot_providers;
pub mod tls;

/// Re-export commonly used types from adapters
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use server::{IngressServer, ServerError, build_router};
pub use snapshot_providers::{FileSnapshotProvider, HttpSnapshotProvider};
pub use tls::SnapshotCertResolver;
