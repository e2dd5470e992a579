use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{DocumentStore, Documents, EntityKind};
use crate::error::Result;

/// Process-local store used by tests and ephemeral deployments.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<EntityKind, Documents>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_all(&self, kind: EntityKind) -> Result<Documents> {
        let guard = self.collections.lock().await;
        Ok(guard.get(&kind).cloned().unwrap_or_default())
    }

    async fn save_all(&self, kind: EntityKind, documents: &Documents) -> Result<()> {
        let mut guard = self.collections.lock().await;
        guard.insert(kind, documents.clone());
        Ok(())
    }

    async fn upsert(&self, kind: EntityKind, key: &str, value: &Value) -> Result<()> {
        let mut guard = self.collections.lock().await;
        guard
            .entry(kind)
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool> {
        let mut guard = self.collections.lock().await;
        Ok(guard
            .get_mut(&kind)
            .map(|docs| docs.remove(key).is_some())
            .unwrap_or(false))
    }
}
