use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{core::routing_table::RoutingTable, metrics};

/// Holds the active routing table.
///
/// Readers take a cheap `Arc` snapshot per request or handshake; the rebuild
/// pipeline swaps in complete tables. Readers never block and never see a
/// table that is still being built.
#[derive(Debug)]
pub struct RoutingTableStore {
    current: ArcSwap<RoutingTable>,
}

impl RoutingTableStore {
    /// Start with an empty table so that the listeners can serve (404s) before
    /// the first snapshot arrives.
    pub fn new() -> Self {
        Self::with_table(RoutingTable::build(None))
    }

    pub fn with_table(table: RoutingTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    /// The most recently installed table.
    pub fn current(&self) -> Arc<RoutingTable> {
        self.current.load_full()
    }

    /// Install a new table; visible to every subsequent [`current`](Self::current).
    pub fn replace(&self, table: RoutingTable) {
        metrics::set_routing_table_size(table.host_count(), table.backend_count());
        self.current.store(Arc::new(table));
    }
}

impl Default for RoutingTableStore {
    fn default() -> Self {
        Self::new()
    }
}
