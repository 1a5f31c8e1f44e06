// Filesystem-backed blob store — one file per key under a generation directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::traits::BlobStore;
use crate::error::{PipelineError, Result};

pub struct FsBlobStore {
    root: PathBuf,
    generation: String,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, scoped under `generation`.
    pub fn new(root: impl AsRef<Path>, generation: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            generation: generation.to_string(),
        }
    }

    fn generation_dir(&self) -> PathBuf {
        self.root.join(&self.generation)
    }

    /// Map a key (source URI) to a filesystem-safe file name.
    fn entry_path(&self, key: &str) -> PathBuf {
        self.generation_dir().join(urlencoding::encode(key).as_ref())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::CacheUnavailable(format!(
                "read {} failed: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.generation_dir();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            PipelineError::CacheUnavailable(format!("create {} failed: {}", dir.display(), e))
        })?;

        let path = self.entry_path(key);
        // Write to a sibling .part file, then rename, so an interrupted put
        // never leaves a truncated entry behind.
        let part = dir.join(format!(
            "{}.part",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("entry")
        ));
        tokio::fs::write(&part, bytes).await.map_err(|e| {
            PipelineError::CacheUnavailable(format!("write {} failed: {}", part.display(), e))
        })?;
        tokio::fs::rename(&part, &path).await.map_err(|e| {
            PipelineError::CacheUnavailable(format!("rename {} failed: {}", path.display(), e))
        })?;

        debug!("stored {} bytes for key {}", bytes.len(), key);
        Ok(())
    }

    async fn clear_generation(&self) -> Result<()> {
        let dir = self.generation_dir();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::CacheUnavailable(format!(
                "clear {} failed: {}",
                dir.display(),
                e
            ))),
        }
    }

    fn generation(&self) -> &str {
        &self.generation
    }
}
