pub mod backend;
pub mod certificate;
pub mod coalescer;
pub mod rebuild;
pub mod routing_table;
pub mod snapshot;
pub mod store;

pub use backend::{BackendError, BackendMatcher};
pub use certificate::{Certificate, CertificateError};
pub use coalescer::ChangeCoalescer;
pub use rebuild::RebuildPipeline;
pub use routing_table::{RoutingError, RoutingTable};
pub use snapshot::{ConfigurationSnapshot, SnapshotError, assemble};
pub use store::RoutingTableStore;
