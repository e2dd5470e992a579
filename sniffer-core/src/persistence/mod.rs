//! Whole-document persistence for channels, groups and batch runs.
//!
//! In-memory state is authoritative while the process runs; stores only
//! receive snapshots. Every backend speaks the same keyed-document shape so
//! the JSON files and the Postgres tables hold identical bodies.

pub mod flush;
pub mod json;
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

pub use flush::Persistence;
pub use json::JsonFileStore;
pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PostgresStore;

/// Collections held by a [`DocumentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Channels,
    Groups,
    Runs,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] =
        [EntityKind::Channels, EntityKind::Groups, EntityKind::Runs];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Channels => "channels",
            EntityKind::Groups => "groups",
            EntityKind::Runs => "runs",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Documents = BTreeMap<String, Value>;

/// Keyed JSON document storage.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    async fn get_all(&self, kind: EntityKind) -> Result<Documents>;

    /// Replaces the whole collection.
    async fn save_all(&self, kind: EntityKind, documents: &Documents) -> Result<()>;

    async fn upsert(&self, kind: EntityKind, key: &str, value: &Value) -> Result<()>;

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool>;
}

/// Decodes every document of `kind`, skipping entries that no longer parse.
pub async fn load_typed<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    kind: EntityKind,
) -> Result<BTreeMap<String, T>> {
    let documents = store.get_all(kind).await?;
    let mut decoded = BTreeMap::new();
    for (key, value) in documents {
        match serde_json::from_value::<T>(value) {
            Ok(item) => {
                decoded.insert(key, item);
            }
            Err(err) => {
                warn!(kind = %kind, key = %key, error = %err, "skipping undecodable document");
            }
        }
    }
    Ok(decoded)
}

pub fn encode_all<'a, T, I>(items: I) -> Result<Documents>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (String, &'a T)>,
{
    items
        .into_iter()
        .map(|(key, item)| Ok((key, serde_json::to_value(item)?)))
        .collect()
}
