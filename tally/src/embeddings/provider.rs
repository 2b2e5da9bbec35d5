use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

use super::api::{ApiConfig, EmbeddingApiClient};
use super::Embedder;
use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::error::{Result, TallyError};

#[derive(Clone)]
enum EmbeddingBackend {
    Local {
        model: Arc<Mutex<TextEmbedding>>,
        batch_size: usize,
    },
    Api(EmbeddingApiClient),
}

/// Embedding model behind either a local ONNX model or a remote
/// OpenAI-compatible endpoint, chosen by the provider prefix of the model name.
#[derive(Clone)]
pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    dimensions: usize,
}

impl EmbeddingProvider {
    /// Local models load synchronously (and may download on first use).
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model_name) = parse_provider_model(&config.model);

        if provider == "local" {
            let model = build_model(resolve_embedding_model(model_name))?;
            tracing::info!(model = model_name, "Loaded local embedding model");
            return Ok(Self {
                backend: EmbeddingBackend::Local {
                    model: Arc::new(Mutex::new(model)),
                    batch_size: config.batch_size.max(1),
                },
                dimensions: config.dimensions,
            });
        }

        let client = EmbeddingApiClient::new(ApiConfig::from_embeddings_config(config))?;
        tracing::info!(provider, model = client.model(), "Using embedding API");
        Ok(Self::from_api_client(client, config.dimensions))
    }

    pub fn from_api_client(client: EmbeddingApiClient, dimensions: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Api(client),
            dimensions,
        }
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.backend {
            EmbeddingBackend::Local { model, batch_size } => {
                let model = Arc::clone(model);
                let batch_size = *batch_size;
                tokio::task::spawn_blocking(move || {
                    let mut model = model.lock().map_err(|e| {
                        TallyError::Embedding(format!("Embedding model lock poisoned: {e}"))
                    })?;
                    model
                        .embed(texts, Some(batch_size))
                        .map_err(|e| TallyError::Embedding(e.to_string()))
                })
                .await
                .map_err(|e| TallyError::Embedding(format!("Embedding worker failed: {e}")))?
            }
            EmbeddingBackend::Api(client) => {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                client.embed(&refs).await
            }
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .embed_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TallyError::Embedding("No embedding generated".to_string()))?;

        if vector.len() != self.dimensions {
            return Err(TallyError::Embedding(format!(
                "Model returned {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn resolve_embedding_model(model_name: &str) -> EmbeddingModel {
    match model_name {
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
            EmbeddingModel::AllMiniLML12V2
        }
        other => {
            tracing::warn!(model = other, "Unknown local embedding model, using bge-small-en-v1.5");
            EmbeddingModel::BGESmallENV15
        }
    }
}

fn build_model(embedding_model: EmbeddingModel) -> Result<TextEmbedding> {
    TextEmbedding::try_new(InitOptions::new(embedding_model).with_show_download_progress(true))
        .map_err(|e| TallyError::Embedding(e.to_string()))
}
