use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use sniffer_model::{BatchRun, ChannelRecord, Group};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{DocumentStore, EntityKind, encode_all, load_typed};
use crate::error::Result;

/// Serialises snapshot writes to a [`DocumentStore`].
///
/// Flushes never fail the caller: errors are logged and the in-memory state
/// stays authoritative until the next flush.
pub struct Persistence {
    store: Arc<dyn DocumentStore>,
    gate: Mutex<()>,
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Persistence {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Takes the snapshot only once the gate is held, so writes land in
    /// the order their snapshots were taken.
    async fn flush<T, F, K>(&self, kind: EntityKind, snapshot: F, key: K) -> bool
    where
        T: Serialize,
        F: FnOnce() -> Vec<T>,
        K: Fn(&T) -> String,
    {
        let _guard = self.gate.lock().await;
        let encoded = {
            let items = snapshot();
            encode_all(items.iter().map(|item| (key(item), item)))
        };
        let documents = match encoded {
            Ok(documents) => documents,
            Err(err) => {
                error!(kind = %kind, error = %err, "failed to encode snapshot");
                return false;
            }
        };

        match self.store.save_all(kind, &documents).await {
            Ok(()) => {
                debug!(kind = %kind, count = documents.len(), "flushed snapshot");
                true
            }
            Err(err) => {
                error!(kind = %kind, error = %err, "failed to persist snapshot");
                false
            }
        }
    }

    /// Persists the runs returned by `snapshot`.
    pub async fn flush_runs<F>(&self, snapshot: F) -> bool
    where
        F: FnOnce() -> Vec<BatchRun>,
    {
        self.flush(EntityKind::Runs, snapshot, |run| run.id.to_string())
            .await
    }

    pub async fn flush_channels<F>(&self, snapshot: F) -> bool
    where
        F: FnOnce() -> Vec<ChannelRecord>,
    {
        self.flush(EntityKind::Channels, snapshot, |record| {
            record.address.clone()
        })
        .await
    }

    pub async fn flush_groups<F>(&self, snapshot: F) -> bool
    where
        F: FnOnce() -> Vec<Group>,
    {
        self.flush(EntityKind::Groups, snapshot, |group| group.id.to_string())
            .await
    }

    pub async fn load_runs(&self) -> Result<Vec<BatchRun>> {
        let runs: BTreeMap<String, BatchRun> =
            load_typed(self.store.as_ref(), EntityKind::Runs).await?;
        Ok(runs.into_values().collect())
    }

    pub async fn load_channels(&self) -> Result<Vec<ChannelRecord>> {
        let channels: BTreeMap<String, ChannelRecord> =
            load_typed(self.store.as_ref(), EntityKind::Channels).await?;
        Ok(channels
            .into_iter()
            .map(|(key, mut record)| {
                if record.address.is_empty() {
                    record.address = key;
                }
                record
            })
            .collect())
    }

    pub async fn load_groups(&self) -> Result<Vec<Group>> {
        let groups: BTreeMap<String, Group> =
            load_typed(self.store.as_ref(), EntityKind::Groups).await?;
        Ok(groups.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    #[tokio::test]
    async fn flushed_channels_reload_by_address() {
        let persistence = Persistence::new(Arc::new(MemoryStore::new()));
        let mut record = ChannelRecord::new("10.0.0.5");
        record.metadata.name = "Five".into();

        assert!(persistence.flush_channels(|| vec![record.clone()]).await);
        let loaded = persistence.load_channels().await.expect("load channels");
        assert_eq!(loaded, vec![record]);
    }

    #[tokio::test]
    async fn undecodable_documents_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(EntityKind::Runs, "bogus", &serde_json::json!({"nope": true}))
            .await
            .expect("seed bogus run");
        let persistence = Persistence::new(store);
        assert!(persistence.load_runs().await.expect("load runs").is_empty());
    }
}
