use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use eyre::{Context, Result};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::{CHANGE_CHANNEL_CAPACITY, diff_cluster_states, publish, take_receiver};
use crate::{
    config::cluster::ClusterState,
    core::snapshot::{ConfigurationSnapshot, SnapshotError, assemble},
    ports::snapshot_provider::{ChangeEvent, SnapshotProvider},
};

/// Snapshot provider backed by a manifest file on disk.
///
/// The containing directory is watched so that editors replacing the file
/// (write to temp, rename) are picked up as well.
pub struct FileSnapshotProvider {
    path: PathBuf,
    // Dropping the watcher stops the notifications.
    _watcher: notify::RecommendedWatcher,
    update_rx: Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
}

impl FileSnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

        let initial = match read_state_blocking(&path) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cluster manifest not readable yet");
                ClusterState::default()
            }
        };
        let last_seen = Arc::new(Mutex::new(initial));
        let watcher = Self::init_watcher(&path, tx, last_seen)?;

        Ok(Self {
            path,
            _watcher: watcher,
            update_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_watcher(
        path: &Path,
        tx: mpsc::Sender<ChangeEvent>,
        last_seen: Arc<Mutex<ClusterState>>,
    ) -> Result<notify::RecommendedWatcher> {
        let manifest_path = path.to_path_buf();
        let manifest_filename = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Invalid cluster manifest path: {}", path.display()))?
            .to_owned();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if !(event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            || !event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(&manifest_filename))
                        {
                            return;
                        }
                        tracing::debug!("Cluster manifest changed: {:?}", event.kind);

                        let current = if manifest_path.exists() {
                            match read_state_blocking(&manifest_path) {
                                Ok(state) => state,
                                Err(e) => {
                                    tracing::warn!(error = %e, "Ignoring unreadable cluster manifest");
                                    return;
                                }
                            }
                        } else {
                            ClusterState::default()
                        };

                        let Ok(mut previous) = last_seen.lock() else {
                            return;
                        };
                        let events = diff_cluster_states(&previous, &current);
                        *previous = current;
                        drop(previous);
                        publish(&tx, events);
                    }
                    Err(e) => tracing::error!("File watch error: {:?}", e),
                }
            })?;

        let watch_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .wrap_err("Failed to watch cluster manifest directory")?;

        Ok(watcher)
    }
}

fn read_state_blocking(path: &Path) -> Result<ClusterState, SnapshotError> {
    let origin = path.display().to_string();
    let document =
        std::fs::read_to_string(path).map_err(|e| SnapshotError::fetch_failed(&origin, e))?;
    ClusterState::from_yaml(&document).map_err(|e| SnapshotError::fetch_failed(origin, e))
}

#[async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    async fn list_ingress_rules(&self) -> Result<ConfigurationSnapshot, SnapshotError> {
        let origin = self.path.display().to_string();
        let document = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SnapshotError::fetch_failed(&origin, e))?;
        let state = ClusterState::from_yaml(&document)
            .map_err(|e| SnapshotError::fetch_failed(&origin, e))?;
        Ok(assemble(&state))
    }

    fn watch(&self) -> mpsc::Receiver<ChangeEvent> {
        take_receiver(&self.update_rx)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::tempdir;
    use tokio::time::{Duration, sleep, timeout};

    use super::*;
    use crate::ports::snapshot_provider::{ChangeKind, ResourceKind, ResourceRef};

    const INITIAL: &str = r#"
ingresses:
  - metadata:
      name: web
    spec:
      rules:
        - host: www.example.com
          http:
            paths:
              - path: /
                backend:
                  service:
                    name: web
                    port:
                      number: 80
services:
  - metadata:
      name: web
    spec:
      ports:
        - name: http
          port: 80
"#;

    fn write(path: &Path, contents: &str) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(contents.as_bytes())
    }

    #[tokio::test]
    async fn test_lists_assembled_snapshot() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("cluster.yaml");
        write(&file_path, INITIAL)?;

        let provider = FileSnapshotProvider::new(&file_path)?;
        let snapshot = provider.list_ingress_rules().await?;
        assert_eq!(snapshot.ingresses.len(), 1);
        assert_eq!(snapshot.ingresses[0].id, "default/web");
        assert!(snapshot.ingresses[0].service_ports.contains_key("web"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_failure() -> Result<()> {
        let dir = tempdir()?;
        let provider = FileSnapshotProvider::new(dir.path().join("absent.yaml"))?;
        let err = provider.list_ingress_rules().await.unwrap_err();
        assert!(matches!(err, SnapshotError::FetchFailed { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_manifest_is_fetch_failure() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("cluster.yaml");
        write(&file_path, "ingresses: {not: [a list")?;

        let provider = FileSnapshotProvider::new(&file_path)?;
        let err = provider.list_ingress_rules().await.unwrap_err();
        assert!(matches!(err, SnapshotError::FetchFailed { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_emits_object_events_on_change() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("cluster.yaml");
        write(&file_path, INITIAL)?;

        let provider = FileSnapshotProvider::new(&file_path)?;
        let mut rx = provider.watch();

        sleep(Duration::from_millis(100)).await;
        let updated = format!(
            "{INITIAL}  - metadata:\n      name: api\n    spec:\n      ports:\n        - port: 8080\n"
        );
        write(&file_path, &updated)?;

        // Truncate-then-write may surface intermediate states; wait for the final one.
        let expected = ResourceRef::new(ResourceKind::Service, "default", "api");
        let seen = timeout(Duration::from_secs(5), async {
            while let Some(event) = rx.recv().await {
                if event.resource == expected && event.kind != ChangeKind::Deleted {
                    return true;
                }
            }
            false
        })
        .await;
        assert_eq!(seen.ok(), Some(true), "Timed out waiting for service event");

        let snapshot = provider.list_ingress_rules().await?;
        assert_eq!(snapshot.ingresses.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_watch_can_only_be_taken_once() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("cluster.yaml");
        write(&file_path, INITIAL)?;

        let provider = FileSnapshotProvider::new(&file_path)?;
        let _first = provider.watch();
        let mut second = provider.watch();
        assert!(second.recv().await.is_none());
        Ok(())
    }
}
