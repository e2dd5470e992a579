use std::path::{Path, PathBuf};

use sniffer_model::RunId;
use tracing::{debug, warn};

/// Public URL prefix under which captured frames are served.
pub const PUBLIC_PREFIX: &str = "/screenshots/";

/// Location of one captured frame, both on disk and as served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub public_path: String,
}

/// Directory holding captured frames.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

fn address_slug(address: &str) -> String {
    address.replace('.', "_")
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    fn artifact(&self, file_name: String) -> Artifact {
        Artifact {
            path: self.root.join(&file_name),
            public_path: format!("{PUBLIC_PREFIX}{file_name}"),
        }
    }

    /// `{run_id}_{address}.jpg`, dots in the address replaced by underscores.
    pub fn batch_artifact(&self, run_id: RunId, address: &str) -> Artifact {
        self.artifact(format!("{run_id}_{}.jpg", address_slug(address)))
    }

    pub fn connectivity_artifact(&self, address: &str) -> Artifact {
        self.artifact(format!("connectivity_{}.jpg", address_slug(address)))
    }

    /// Maps a recorded public path back onto the store. Paths that escape
    /// the store directory are ignored.
    pub fn resolve_public(&self, public_path: &str) -> Option<PathBuf> {
        let file_name = public_path.strip_prefix(PUBLIC_PREFIX)?;
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return None;
        }
        Some(self.root.join(file_name))
    }

    /// Deletes the file if present. Returns whether something was removed.
    pub async fn remove(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed artifact");
                true
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove artifact");
                false
            }
        }
    }

    /// Removes every artifact that may belong to `address` within a run:
    /// the batch frame, the connectivity frame and any recorded screenshot.
    pub async fn purge_for_run(
        &self,
        run_id: RunId,
        address: &str,
        recorded: Option<&str>,
    ) -> usize {
        let mut candidates = vec![
            self.batch_artifact(run_id, address).path,
            self.connectivity_artifact(address).path,
        ];
        if let Some(path) = recorded.and_then(|p| self.resolve_public(p))
            && !candidates.contains(&path)
        {
            candidates.push(path);
        }

        let mut removed = 0;
        for path in candidates {
            if self.remove(&path).await {
                removed += 1;
            }
        }
        removed
    }
}

/// True when `path` holds a non-empty file.
pub async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_replace_dots() {
        let store = ArtifactStore::new("/data/shots");
        let run_id = RunId::new();
        let artifact = store.batch_artifact(run_id, "10.0.0.7");
        assert_eq!(
            artifact.path,
            PathBuf::from(format!("/data/shots/{run_id}_10_0_0_7.jpg"))
        );
        assert_eq!(
            artifact.public_path,
            format!("/screenshots/{run_id}_10_0_0_7.jpg")
        );
        assert_eq!(
            store.connectivity_artifact("10.0.0.7").public_path,
            "/screenshots/connectivity_10_0_0_7.jpg"
        );
    }

    #[test]
    fn resolve_public_rejects_traversal() {
        let store = ArtifactStore::new("/data/shots");
        assert!(store.resolve_public("/screenshots/../etc/passwd").is_none());
        assert!(store.resolve_public("/elsewhere/a.jpg").is_none());
        assert_eq!(
            store.resolve_public("/screenshots/a.jpg"),
            Some(PathBuf::from("/data/shots/a.jpg"))
        );
    }

    #[tokio::test]
    async fn purge_tolerates_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let run_id = RunId::new();

        let batch = store.batch_artifact(run_id, "10.0.0.1");
        tokio::fs::write(&batch.path, b"jpeg").await.expect("write artifact");

        let removed = store
            .purge_for_run(run_id, "10.0.0.1", Some(&batch.public_path))
            .await;
        assert_eq!(removed, 1);
        assert!(!batch.path.exists());

        assert_eq!(store.purge_for_run(run_id, "10.0.0.2", None).await, 0);
    }
}
