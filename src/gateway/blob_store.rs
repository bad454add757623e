use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use tokio::fs;

use super::{GatewayError, ObjectStore};

pub const DEFAULT_MAX_BLOB_SIZE: u64 = 50 * 1024 * 1024;

/// Resolves a slash-separated object key under `base`, refusing anything
/// that would escape it.
fn resolve_key(base: &Path, key: &str) -> Result<PathBuf, GatewayError> {
    let mut resolved = base.to_path_buf();
    let mut segments = 0;
    for component in Path::new(key).components() {
        match component {
            Component::Normal(segment) => {
                resolved.push(segment);
                segments += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(GatewayError::Persistence(format!(
                    "invalid object key {key}"
                )))
            }
        }
    }
    if segments == 0 {
        return Err(GatewayError::Persistence("empty object key".to_string()));
    }
    Ok(resolved)
}

/// Object store backed by a local directory, handing out `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl LocalBlobStore {
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self> {
        fs::create_dir_all(&base_path)
            .await
            .with_context(|| format!("Failed to create blob directory {}", base_path.display()))?;
        let base_path = base_path
            .canonicalize()
            .with_context(|| format!("Failed to resolve blob directory {}", base_path.display()))?;

        info!("Blob store initialized at {}", base_path.display());
        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, GatewayError> {
        resolve_key(&self.base_path, key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ObjectStore for LocalBlobStore {
    fn url_for(&self, key: &str) -> Result<String, GatewayError> {
        Ok(format!("file://{}", self.path_for(key)?.display()))
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<String, GatewayError> {
        let target = self.path_for(key)?;
        let size = fs::metadata(local)
            .await
            .map_err(|e| GatewayError::Network(format!("{}: {e}", local.display())))?
            .len();
        if size > self.max_size {
            return Err(GatewayError::StorageQuota(format!(
                "{size} bytes exceeds the {} byte limit",
                self.max_size
            )));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GatewayError::Network(format!("{}: {e}", parent.display())))?;
        }
        fs::copy(local, &target)
            .await
            .map_err(|e| GatewayError::Network(format!("upload of {key} failed: {e}")))?;

        debug!("stored blob {key} ({size} bytes)");
        self.url_for(key)
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        let target = self.path_for(key)?;
        match fs::remove_file(&target).await {
            Ok(()) => {
                debug!("deleted blob {key}");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(GatewayError::Network(format!("delete of {key} failed: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn store(max_size: u64) -> (LocalBlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs"), max_size)
            .await
            .unwrap();
        (store, dir)
    }

    fn source(dir: &TempDir, bytes: usize) -> PathBuf {
        let path = dir.path().join("take.wav");
        std::fs::write(&path, vec![7u8; bytes]).unwrap();
        path
    }

    #[tokio::test]
    async fn upload_copies_and_returns_file_url() {
        let (store, dir) = store(1024).await;
        let url = store
            .upload(&source(&dir, 16), "recordings/u1/a.wav")
            .await
            .unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.ends_with("recordings/u1/a.wav"));
        assert!(store.exists("recordings/u1/a.wav").await);
    }

    #[tokio::test]
    async fn oversized_upload_hits_quota() {
        let (store, dir) = store(8).await;
        let result = store.upload(&source(&dir, 16), "recordings/u1/a.wav").await;
        assert!(matches!(result, Err(GatewayError::StorageQuota(_))));
        assert!(!store.exists("recordings/u1/a.wav").await);
    }

    #[tokio::test]
    async fn traversal_keys_are_refused() {
        let (store, dir) = store(1024).await;
        for key in ["../escape.wav", "/etc/passwd", "a/../../b", ""] {
            assert!(store.upload(&source(&dir, 4), key).await.is_err(), "{key}");
        }
    }

    #[tokio::test]
    async fn deleting_twice_is_fine() {
        let (store, dir) = store(1024).await;
        store.upload(&source(&dir, 4), "x/y.wav").await.unwrap();
        store.delete("x/y.wav").await.unwrap();
        store.delete("x/y.wav").await.unwrap();
        assert!(!store.exists("x/y.wav").await);
    }
}
