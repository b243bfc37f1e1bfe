use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::snapshot::{ConfigurationSnapshot, SnapshotError};

/// Kind of cluster object a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Ingress,
    Service,
    Secret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Ingress => "ingress",
            ResourceKind::Service => "service",
            ResourceKind::Secret => "secret",
        };
        f.write_str(name)
    }
}

/// Identifies one cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

/// A single object-level change observed by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub resource: ResourceRef,
}

/// Source of cluster routing configuration.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fetch and assemble the current configuration snapshot.
    async fn list_ingress_rules(&self) -> Result<ConfigurationSnapshot, SnapshotError>;

    /// Return a channel of object-level change events.
    ///
    /// The channel can be taken once; later calls return a receiver that is
    /// already closed.
    fn watch(&self) -> mpsc::Receiver<ChangeEvent>;
}
