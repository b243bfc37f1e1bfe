//! Snapshot provider adapters.
//!
//! Both providers read a whole cluster manifest and turn differences between
//! successive reads into object-level [`ChangeEvent`]s.
pub mod file;
pub mod http;

use std::collections::BTreeMap;

use tokio::sync::mpsc;

pub use self::{file::FileSnapshotProvider, http::HttpSnapshotProvider};
use crate::{
    config::cluster::{ClusterState, ObjectMeta},
    ports::snapshot_provider::{ChangeEvent, ChangeKind, ResourceKind, ResourceRef},
};

/// Capacity of the change channel handed out by `watch()`.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Object-level differences between two cluster states, ordered by kind,
/// namespace and name.
pub fn diff_cluster_states(previous: &ClusterState, current: &ClusterState) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    diff_objects(
        ResourceKind::Ingress,
        &previous.ingresses,
        &current.ingresses,
        |i| &i.metadata,
        &mut events,
    );
    diff_objects(
        ResourceKind::Service,
        &previous.services,
        &current.services,
        |s| &s.metadata,
        &mut events,
    );
    diff_objects(
        ResourceKind::Secret,
        &previous.secrets,
        &current.secrets,
        |s| &s.metadata,
        &mut events,
    );
    events
}

fn diff_objects<T, F>(
    kind: ResourceKind,
    previous: &[T],
    current: &[T],
    meta: F,
    events: &mut Vec<ChangeEvent>,
) where
    T: PartialEq,
    F: Fn(&T) -> &ObjectMeta,
{
    let index = |objects: &[T]| -> BTreeMap<ResourceRef, usize> {
        objects
            .iter()
            .enumerate()
            .map(|(i, object)| {
                let m = meta(object);
                (ResourceRef::new(kind, &m.namespace, &m.name), i)
            })
            .collect()
    };
    let before = index(previous);
    let after = index(current);

    for (resource, &i) in &after {
        let change = match before.get(resource) {
            None => Some(ChangeKind::Added),
            Some(&j) if previous[j] != current[i] => Some(ChangeKind::Updated),
            Some(_) => None,
        };
        if let Some(kind) = change {
            events.push(ChangeEvent {
                kind,
                resource: resource.clone(),
            });
        }
    }
    for resource in before.keys().filter(|r| !after.contains_key(*r)) {
        events.push(ChangeEvent {
            kind: ChangeKind::Deleted,
            resource: resource.clone(),
        });
    }
}

/// Push events without blocking. Dropped events are harmless: any one of them
/// triggers a full rebuild.
pub(crate) fn publish(tx: &mpsc::Sender<ChangeEvent>, events: Vec<ChangeEvent>) {
    for event in events {
        tracing::debug!(change = ?event.kind, resource = %event.resource, "Publishing change");
        if tx.try_send(event).is_err() {
            tracing::debug!("Change channel full or closed, dropping event");
        }
    }
}

/// Take the receiver out of its slot, or hand out a closed one.
pub(crate) fn take_receiver(
    slot: &std::sync::Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
) -> mpsc::Receiver<ChangeEvent> {
    match slot.lock().ok().and_then(|mut rx| rx.take()) {
        Some(rx) => rx,
        None => {
            tracing::warn!("watch() called more than once, returning a closed channel");
            mpsc::channel(1).1
        }
    }
}
