use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::error::{Result, TallyError};

pub fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "lmstudio" => "http://localhost:1234/v1",
        _ => "https://api.openai.com/v1",
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl ApiConfig {
    pub fn from_embeddings_config(config: &EmbeddingsConfig) -> Self {
        let (provider, model) = parse_provider_model(&config.model);
        Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(provider).to_string()),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// What to do with a non-success HTTP status.
enum Failure {
    Retry(TallyError),
    Fatal(TallyError),
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct EmbeddingApiClient {
    client: Client,
    config: ApiConfig,
}

impl EmbeddingApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TallyError::Embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Embed a batch of texts. 429 and 5xx responses are retried with
    /// exponential backoff up to `max_retries` times; 401/403 are not.
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let headers = self.headers()?;
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&url)
                .headers(headers.clone())
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Embedding request failed");
                    last_error = Some(TallyError::Embedding(format!("Request failed: {e}")));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let body: EmbeddingResponse = response.json().await.map_err(|e| {
                    TallyError::Embedding(format!("Failed to parse response: {e}"))
                })?;
                return Self::check_count(body, texts.len());
            }

            match Self::classify(status, response).await {
                Failure::Retry(error) => {
                    tracing::debug!(attempt, %status, "Retryable embedding API error");
                    last_error = Some(error);
                }
                Failure::Fatal(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| TallyError::Embedding("Unknown error".to_string())))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| TallyError::Embedding(format!("Invalid API key header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn classify(status: StatusCode, response: reqwest::Response) -> Failure {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Failure::Retry(TallyError::ApiRateLimit { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Failure::Fatal(TallyError::ApiAuth(body))
        } else if status.is_server_error() {
            Failure::Retry(TallyError::Embedding(format!("Server error {status}: {body}")))
        } else {
            Failure::Fatal(TallyError::Embedding(format!("API error {status}: {body}")))
        }
    }

    fn check_count(body: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();
        if vectors.len() != expected {
            return Err(TallyError::Embedding(format!(
                "Expected {expected} embeddings, got {}",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}
