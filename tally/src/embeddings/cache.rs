use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::Embedder;
use crate::cache::CacheStore;
use crate::error::{Result, TallyError};

const KEY_PREFIX: &str = "emb:";

/// Cache-aside wrapper around an [`Embedder`].
///
/// Keys are content hashes, never user ids: two users sending the same text
/// share one vector. Cache failures are logged and bypassed, so the cache can
/// only make embedding faster, never make it fail.
#[derive(Clone)]
pub struct EmbeddingCache {
    inner: Arc<dyn Embedder>,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(inner: Arc<dyn Embedder>, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { inner, store, ttl }
    }

    pub fn cache_key(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("{KEY_PREFIX}{hex}")
    }

    async fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Embedding cache read failed, embedding directly");
                return None;
            }
        };

        match serde_json::from_str::<Vec<f32>>(&raw) {
            Ok(vector) if vector.len() == self.inner.dimensions() => Some(vector),
            Ok(vector) => {
                tracing::warn!(
                    cached = vector.len(),
                    expected = self.inner.dimensions(),
                    "Discarding cached embedding with wrong dimensions"
                );
                self.evict(key).await;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable cached embedding");
                self.evict(key).await;
                None
            }
        }
    }

    async fn evict(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            tracing::debug!(error = %e, "Failed to evict cached embedding");
        }
    }

    async fn store(&self, key: &str, vector: &[f32]) -> Result<()> {
        let raw = serde_json::to_string(vector)
            .map_err(|e| TallyError::Cache(format!("Failed to encode embedding: {e}")))?;
        self.store.set(key, raw, self.ttl).await
    }
}

#[async_trait]
impl Embedder for EmbeddingCache {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::cache_key(text);

        if let Some(vector) = self.lookup(&key).await {
            tracing::trace!("Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.inner.embed(text).await?;
        if let Err(e) = self.store(&key, &vector).await {
            tracing::warn!(error = %e, "Failed to cache embedding");
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}
