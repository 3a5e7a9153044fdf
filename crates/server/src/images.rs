//! Group image storage
//!
//! Only the returned reference is kept on the group; the bytes live here,
//! content-addressed by their SHA-256 digest.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist the bytes and return a reference to them.
    async fn save(&self, bytes: Bytes) -> Result<String>;
}

pub struct DiskImageStore {
    dir: PathBuf,
}

impl DiskImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, bytes: Bytes) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("{:x}", hasher.finalize());

        let path = self.dir.join(&hash);
        if fs::try_exists(&path).await? {
            return Ok(hash);
        }

        fs::create_dir_all(&self.dir).await?;
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &path).await?;

        info!("[Images] Stored {} ({} bytes)", hash, bytes.len());
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_is_content_addressed() {
        let dir = TempDir::new().unwrap();
        let store = DiskImageStore::new(dir.path().join("uploads"));

        let first = store.save(Bytes::from_static(b"png bytes")).await.unwrap();
        let second = store.save(Bytes::from_static(b"png bytes")).await.unwrap();
        let other = store.save(Bytes::from_static(b"jpeg bytes")).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 64);

        let stored = std::fs::read(store.dir().join(&first)).unwrap();
        assert_eq!(stored, b"png bytes");
    }
}
