use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::observability::MetricsRegistry;
use crate::storage::{RuleSetRef, RuleSetStore};

use super::loader::{PolicyError, RuleSetLoader};

/// Watch a rule-set definition file and commit a new version when it
/// changes.
///
/// Versioning is append-only, so a reload never disturbs in-flight
/// validations: they finish against the revision they resolved.
pub struct RuleSetWatcher {
    loader: RuleSetLoader,
    store: Arc<dyn RuleSetStore>,
    metrics: Arc<MetricsRegistry>,
    check_interval: Duration,
    last_checksum: Option<u32>,
}

impl RuleSetWatcher {
    pub fn new(
        loader: RuleSetLoader,
        store: Arc<dyn RuleSetStore>,
        metrics: Arc<MetricsRegistry>,
        check_interval: Duration,
    ) -> Self {
        RuleSetWatcher {
            loader,
            store,
            metrics,
            check_interval,
            last_checksum: None,
        }
    }

    /// Commit the current file contents, then keep watching for changes.
    pub async fn start(mut self) -> tokio::task::JoinHandle<()> {
        match self.check_for_updates().await {
            Ok(true) => info!(path = self.loader.path(), "Seeded rule set from file"),
            Ok(false) => {}
            Err(e) => error!(path = self.loader.path(), error = %e, "Failed to seed rule set"),
        }

        tokio::spawn(async move {
            let mut ticker = interval(self.check_interval);
            ticker.tick().await; // first tick fires immediately; already seeded

            loop {
                ticker.tick().await;

                match self.check_for_updates().await {
                    Ok(true) => info!("Rule set file reloaded"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "Error checking for rule set updates"),
                }
            }
        })
    }

    /// Returns true when a new version was committed.
    async fn check_for_updates(&mut self) -> Result<bool, PolicyError> {
        let result = self.try_commit().await;
        self.metrics.record_reload(result.is_ok());
        result
    }

    async fn try_commit(&mut self) -> Result<bool, PolicyError> {
        let (rule_set, bytes) = self.loader.load()?;

        let checksum = crc32fast::hash(&bytes);
        if self.last_checksum == Some(checksum) {
            return Ok(false);
        }

        let reference = RuleSetRef::new(rule_set.owner, rule_set.name.clone());
        let version = self.store.commit(&rule_set.owner, &reference, &bytes).await?;
        self.metrics.record_commit(true);

        info!(
            reference = %reference,
            version,
            "Committed rule set version from file"
        );
        self.last_checksum = Some(checksum);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identity;
    use crate::storage::MemoryStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn definition(version_marker: u64) -> String {
        format!(
            r#"
format_version: 1
name: watched
owner: "{owner}"
operations:
  transfer:
    type: amount
    field: 0
    operator: lt_eq
    amount: {version_marker}
"#,
            owner = "03".repeat(32),
        )
    }

    fn reference() -> RuleSetRef {
        RuleSetRef::new(Identity::new([3u8; 32]), "watched")
    }

    #[tokio::test]
    async fn test_watcher_seeds_store() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", definition(1000)).unwrap();
        file.flush().unwrap();

        let store = Arc::new(MemoryStore::new());
        let watcher = RuleSetWatcher::new(
            RuleSetLoader::new(file.path().to_string_lossy()),
            store.clone(),
            Arc::new(MetricsRegistry::new()),
            Duration::from_secs(60),
        );
        let handle = watcher.start().await;

        assert_eq!(store.latest_version(&reference()).await.unwrap(), Some(1));

        handle.abort();
    }

    #[tokio::test]
    async fn test_watcher_commits_new_version_on_change() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", definition(1000)).unwrap();
        file.flush().unwrap();
        let path = file.path().to_path_buf();

        let store = Arc::new(MemoryStore::new());
        let watcher = RuleSetWatcher::new(
            RuleSetLoader::new(path.to_string_lossy()),
            store.clone(),
            Arc::new(MetricsRegistry::new()),
            Duration::from_millis(25),
        );
        let handle = watcher.start().await;

        std::fs::write(&path, definition(2000)).unwrap();

        // Wait for the watcher to pick up the change.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if store.latest_version(&reference()).await.unwrap() == Some(2) {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "watcher did not commit the updated rule set"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Both versions remain queryable.
        let v1 = store.get(&reference(), Some(1)).await.unwrap();
        let v2 = store.get(&reference(), Some(2)).await.unwrap();
        assert_ne!(v1.rule_set, v2.rule_set);

        handle.abort();
    }

    #[tokio::test]
    async fn test_unchanged_file_commits_once() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", definition(1000)).unwrap();
        file.flush().unwrap();

        let store = Arc::new(MemoryStore::new());
        let mut watcher = RuleSetWatcher::new(
            RuleSetLoader::new(file.path().to_string_lossy()),
            store.clone(),
            Arc::new(MetricsRegistry::new()),
            Duration::from_secs(60),
        );

        assert!(watcher.check_for_updates().await.unwrap());
        assert!(!watcher.check_for_updates().await.unwrap());
        assert_eq!(store.latest_version(&reference()).await.unwrap(), Some(1));
    }
}
