mod api;
mod cache;
mod provider;


use async_trait::async_trait;

use crate::error::Result;

pub use api::{default_base_url, ApiConfig, EmbeddingApiClient};
pub use cache::EmbeddingCache;
pub use provider::EmbeddingProvider;

/// Text to dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}
