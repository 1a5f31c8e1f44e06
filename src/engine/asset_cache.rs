// Cached asset retrieval — persistent store hit, else streamed download plus
// best-effort store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::source::downloader::{DownloadProgress, StreamingDownloader};
use crate::store::traits::BlobStore;

pub struct AssetCache {
    store: Arc<dyn BlobStore>,
    downloader: StreamingDownloader,
    store_down: AtomicBool,
}

impl AssetCache {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            downloader: StreamingDownloader::new(),
            store_down: AtomicBool::new(false),
        }
    }

    /// Return the bytes for `uri`, preferring the persistent store.
    ///
    /// A store hit returns immediately with zero network activity. A store
    /// failure on either lookup or insert is logged and downgrades the cache
    /// to direct fetch for the rest of the session; it is never surfaced as
    /// this call's failure. Overlapping misses for the same key may both
    /// download and both store (last-store-wins).
    pub async fn fetch_and_cache(
        &self,
        uri: &str,
        progress_tx: &UnboundedSender<DownloadProgress>,
    ) -> Result<Bytes> {
        if !self.store_down.load(Ordering::Relaxed) {
            match self.store.get(uri).await {
                Ok(Some(bytes)) => {
                    debug!("cache hit for {} ({} bytes)", uri, bytes.len());
                    // Settle the progress display at completion.
                    let total = bytes.len() as u64;
                    let _ = progress_tx.send(DownloadProgress {
                        loaded: total,
                        total: Some(total),
                    });
                    return Ok(bytes);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("blob store lookup failed, falling back to direct fetch: {}", e);
                    self.store_down.store(true, Ordering::Relaxed);
                }
            }
        }

        let bytes = self.downloader.fetch(uri, progress_tx).await?;
        info!("downloaded {} ({} bytes)", uri, bytes.len());

        if !self.store_down.load(Ordering::Relaxed) {
            // The store receives its own handle to the same immutable buffer;
            // the caller's copy is untouched either way.
            if let Err(e) = self.store.put(uri, &bytes).await {
                warn!("caching {} failed, continuing uncached: {}", uri, e);
                self.store_down.store(true, Ordering::Relaxed);
            }
        }

        Ok(bytes)
    }
}
