use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::{
    core::{
        coalescer::ChangeCoalescer, routing_table::RoutingTable, snapshot::SnapshotError,
        store::RoutingTableStore,
    },
    metrics,
    ports::snapshot_provider::SnapshotProvider,
    utils::graceful_shutdown::ShutdownToken,
};

/// Default period of the unconditional resync.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Keeps the routing table store in line with the provider.
///
/// This is the only writer of the store.
pub struct RebuildPipeline {
    provider: Arc<dyn SnapshotProvider>,
    store: Arc<RoutingTableStore>,
    coalescer: ChangeCoalescer,
    resync_interval: Option<Duration>,
}

impl RebuildPipeline {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        store: Arc<RoutingTableStore>,
        quiescence_window: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            coalescer: ChangeCoalescer::new(quiescence_window),
            resync_interval: Some(DEFAULT_RESYNC_INTERVAL),
        }
    }

    /// Rebuild every `interval` even without change events, which also
    /// retries a failed fetch. Zero disables the resync.
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Fetch a snapshot, build a table and install it.
    ///
    /// On failure the previously installed table stays active.
    pub async fn rebuild(&self) -> Result<(), SnapshotError> {
        match self.provider.list_ingress_rules().await {
            Ok(snapshot) => {
                let table = RoutingTable::build(Some(&snapshot));
                info!(
                    ingresses = snapshot.ingresses.len(),
                    certificates = snapshot.certificates.len(),
                    hosts = table.host_count(),
                    backends = table.backend_count(),
                    "Routing table rebuilt"
                );
                self.store.replace(table);
                metrics::increment_rebuild(true);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Configuration snapshot unavailable, keeping previous routing table");
                metrics::increment_rebuild(false);
                Err(e)
            }
        }
    }

    /// Rebuild once, then once per settled burst of change events or resync
    /// tick, until shutdown.
    pub async fn run(&self, shutdown: ShutdownToken) {
        if shutdown.is_shutdown_initiated() {
            return;
        }
        // Failures are logged by `rebuild`; the next change or resync retries.
        let _ = self.rebuild().await;

        let mut events = self.provider.watch();
        let forward = async {
            while let Some(event) = events.recv().await {
                debug!(change = ?event.kind, resource = %event.resource, "Cluster change observed");
                self.coalescer.notify();
            }
            debug!("Change stream closed");
            std::future::pending::<()>().await;
        };
        let resync = async {
            let Some(period) = self.resync_interval else {
                return std::future::pending::<()>().await;
            };
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!(?period, "Periodic resync");
                self.coalescer.notify();
            }
        };
        let settle = self.coalescer.run(shutdown, move || async move {
            let _ = self.rebuild().await;
        });

        tokio::select! {
            _ = forward => {}
            _ = resync => {}
            _ = settle => {}
        }
        info!("Rebuild pipeline stopped");
    }
}
