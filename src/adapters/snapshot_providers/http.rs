use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::Client;
use tokio::sync::mpsc;

use super::{CHANGE_CHANNEL_CAPACITY, diff_cluster_states, publish, take_receiver};
use crate::{
    config::cluster::ClusterState,
    core::snapshot::{ConfigurationSnapshot, SnapshotError, assemble},
    ports::snapshot_provider::{ChangeEvent, SnapshotProvider},
};

/// Snapshot provider that fetches a cluster manifest over HTTP and polls it
/// for changes.
pub struct HttpSnapshotProvider {
    url: String,
    client: Client,
    update_rx: Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
}

impl HttpSnapshotProvider {
    /// Create the provider and start polling. Must be called inside a Tokio
    /// runtime; polling stops once the change receiver is dropped.
    pub fn new(url: String, poll_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .wrap_err("Failed to build HTTP client for the cluster source")?;
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

        let provider = Self {
            url: url.clone(),
            client: client.clone(),
            update_rx: Mutex::new(Some(rx)),
        };

        tokio::spawn(async move {
            // Diffed against an empty state until the first successful poll,
            // so a source that only becomes reachable later still reports
            // every object it serves.
            let mut last_seen = ClusterState::default();
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if tx.is_closed() {
                    tracing::debug!(url = %url, "Change receiver dropped, stopping poller");
                    break;
                }

                match Self::fetch_state(&client, &url).await {
                    Ok(state) => {
                        let events = diff_cluster_states(&last_seen, &state);
                        if !events.is_empty() {
                            tracing::info!(changes = events.len(), "Remote cluster manifest changed");
                            publish(&tx, events);
                        }
                        last_seen = state;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to poll remote cluster manifest: {}", e);
                    }
                }
            }
        });

        Ok(provider)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_state(client: &Client, url: &str) -> Result<ClusterState, SnapshotError> {
        let resp = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SnapshotError::fetch_failed(url, e))?;
        let document = resp
            .text()
            .await
            .map_err(|e| SnapshotError::fetch_failed(url, e))?;
        ClusterState::from_yaml(&document).map_err(|e| SnapshotError::fetch_failed(url, e))
    }
}

#[async_trait]
impl SnapshotProvider for HttpSnapshotProvider {
    async fn list_ingress_rules(&self) -> Result<ConfigurationSnapshot, SnapshotError> {
        let state = Self::fetch_state(&self.client, &self.url).await?;
        Ok(assemble(&state))
    }

    fn watch(&self) -> mpsc::Receiver<ChangeEvent> {
        take_receiver(&self.update_rx)
    }
}
