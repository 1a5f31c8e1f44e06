use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Generation-scoped key→bytes capability backing the asset cache.
///
/// Keys are source URIs, values raw asset bytes. Implementations are
/// externally synchronized; overlapping puts for the same key are
/// last-store-wins.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove every entry in this store's generation namespace.
    async fn clear_generation(&self) -> Result<()>;

    /// The versioned namespace this store is scoped to.
    fn generation(&self) -> &str;
}
