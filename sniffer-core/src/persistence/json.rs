use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{DocumentStore, Documents, EntityKind};
use crate::error::{Result, SnifferError};

/// One pretty-printed JSON object per collection inside `data_dir`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous file intact.
#[derive(Debug)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn file_name(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Channels => "tv_channels.json",
            EntityKind::Groups => "tv_groups.json",
            EntityKind::Runs => "results.json",
        }
    }

    pub fn path_for(&self, kind: EntityKind) -> PathBuf {
        self.data_dir.join(Self::file_name(kind))
    }

    async fn read(&self, kind: EntityKind) -> Result<Documents> {
        let path = self.path_for(kind);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Documents::new());
            }
            Err(err) => return Err(err.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Documents::new());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn write(&self, kind: EntityKind, documents: &Documents) -> Result<()> {
        let body = serde_json::to_vec_pretty(documents)?;
        let dir = self.data_dir.clone();
        let target = self.path_for(kind);

        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&body)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target)
                .map_err(|err| SnifferError::Io(err.error))?;
            Ok(())
        })
        .await??;

        debug!(kind = %kind, count = documents.len(), "wrote json collection");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get_all(&self, kind: EntityKind) -> Result<Documents> {
        self.read(kind).await
    }

    async fn save_all(&self, kind: EntityKind, documents: &Documents) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(kind, documents).await
    }

    async fn upsert(&self, kind: EntityKind, key: &str, value: &Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut documents = self.read(kind).await?;
        documents.insert(key.to_string(), value.clone());
        self.write(kind, &documents).await
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut documents = self.read(kind).await?;
        let removed = documents.remove(key).is_some();
        if removed {
            self.write(kind, &documents).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_files_read_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        for kind in EntityKind::ALL {
            assert!(store.get_all(kind).await.expect("read").is_empty());
        }
    }

    #[tokio::test]
    async fn save_all_writes_named_file_and_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("data"));

        let mut docs = Documents::new();
        docs.insert("10.0.0.1".into(), json!({"address": "10.0.0.1", "name": "One"}));
        store
            .save_all(EntityKind::Channels, &docs)
            .await
            .expect("save channels");

        let on_disk = dir.path().join("data").join("tv_channels.json");
        assert!(on_disk.exists());
        let raw = std::fs::read_to_string(&on_disk).expect("read file");
        assert!(raw.contains("\n"), "pretty printed");

        let loaded = store.get_all(EntityKind::Channels).await.expect("reload");
        assert_eq!(loaded, docs);

        store
            .upsert(EntityKind::Channels, "10.0.0.2", &json!({"address": "10.0.0.2"}))
            .await
            .expect("upsert");
        assert!(store.delete(EntityKind::Channels, "10.0.0.1").await.expect("delete"));
        let loaded = store.get_all(EntityKind::Channels).await.expect("reload");
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["10.0.0.2"]);
    }
}
