pub mod http_client;
pub mod snapshot_provider;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use snapshot_provider::{ChangeEvent, ChangeKind, ResourceKind, ResourceRef, SnapshotProvider};
