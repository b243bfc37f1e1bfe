use std::{future::Future, time::Duration};

use tokio::{sync::Notify, time::sleep};

use crate::utils::graceful_shutdown::ShutdownToken;

/// Default quiet period before a burst of changes is acted on.
pub const DEFAULT_QUIESCENCE_WINDOW: Duration = Duration::from_secs(1);

/// Collapses bursts of change notifications into a single callback.
///
/// The callback fires once the coalescer has seen no notification for
/// `window`. Every notification inside the window restarts it. Notifications
/// arriving while the callback runs are kept and start the next burst, so
/// callbacks never overlap.
#[derive(Debug)]
pub struct ChangeCoalescer {
    window: Duration,
    signal: Notify,
}

impl ChangeCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            signal: Notify::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a change. Never blocks.
    pub fn notify(&self) {
        self.signal.notify_one();
    }

    /// Drive the coalescer until shutdown. A callback still running when
    /// shutdown starts is dropped.
    pub async fn run<F, Fut>(&self, mut shutdown: ShutdownToken, mut on_quiescence: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                _ = self.signal.notified() => {}
                _ = shutdown.wait_for_shutdown() => return,
            }

            loop {
                tokio::select! {
                    _ = self.signal.notified() => continue,
                    _ = sleep(self.window) => break,
                    _ = shutdown.wait_for_shutdown() => return,
                }
            }

            tracing::debug!(window = ?self.window, "Changes settled");
            tokio::select! {
                _ = on_quiescence() => {}
                _ = shutdown.wait_for_shutdown() => return,
            }
        }
    }
}

impl Default for ChangeCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIESCENCE_WINDOW)
    }
}
