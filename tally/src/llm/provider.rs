use async_trait::async_trait;

use super::{api::LlmApiClient, CommandModel, LlmReply, ToolCallRequest};
use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{Result, TallyError};

/// Which kind of chat endpoint commands are sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    OpenAICompatible { base_url: String },
}

impl LlmBackend {
    /// Pick the backend from the `provider/` prefix of `LLM_MODEL`. A bare
    /// model name needs an explicit `LLM_BASE_URL`.
    fn for_config(config: &LlmConfig) -> std::result::Result<Self, String> {
        let (provider, _) = parse_llm_provider_model(&config.model);
        match (provider.to_lowercase().as_str(), &config.base_url) {
            ("openai", _) => Ok(Self::OpenAI),
            ("openrouter", _) => Ok(Self::OpenRouter),
            ("ollama", _) => Ok(Self::Ollama),
            ("lmstudio", _) => Ok(Self::LmStudio),
            (_, Some(base_url)) => Ok(Self::OpenAICompatible {
                base_url: base_url.clone(),
            }),
            (_, None) => Err(format!("Unknown provider in model: {}", config.model)),
        }
    }
}

/// Command model backed by any OpenAI-compatible chat endpoint.
///
/// Without a usable configuration the provider still exists, but every call
/// fails fast with `LlmUnavailable` and the parser drops to its rules.
#[derive(Clone)]
pub struct LlmProvider {
    inner: std::result::Result<(LlmBackend, LlmApiClient), String>,
}

impl LlmProvider {
    pub fn new(config: Option<&LlmConfig>) -> Self {
        let inner = match config {
            None => Err("No LLM configuration provided".to_string()),
            Some(config) => LlmBackend::for_config(config).and_then(|backend| {
                LlmApiClient::new(config)
                    .map(|client| (backend, client))
                    .map_err(|e| e.to_string())
            }),
        };

        match &inner {
            Ok((backend, client)) => {
                tracing::info!(?backend, model = client.model(), "LLM command parsing enabled");
            }
            Err(reason) => {
                tracing::info!(%reason, "LLM unavailable, commands will use rule-based parsing");
            }
        }
        Self { inner }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_ok()
    }

    pub fn backend(&self) -> Option<&LlmBackend> {
        self.inner.as_ref().ok().map(|(backend, _)| backend)
    }
}

#[async_trait]
impl CommandModel for LlmProvider {
    async fn complete_tool_call(&self, request: &ToolCallRequest) -> Result<LlmReply> {
        match &self.inner {
            Ok((_, client)) => client.complete_tool_call(request).await,
            Err(reason) => Err(TallyError::LlmUnavailable(reason.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::prompts::command_tool;

    fn config(model: &str, base_url: Option<&str>) -> LlmConfig {
        LlmConfig {
            model: model.to_string(),
            api_key: Some("sk-test".to_string()),
            base_url: base_url.map(str::to_string),
            timeout_secs: 5,
            max_retries: 0,
            max_tokens: 256,
        }
    }

    #[test]
    fn test_backend_selection() {
        assert_eq!(
            LlmProvider::new(Some(&config("openai/gpt-4o-mini", None))).backend(),
            Some(&LlmBackend::OpenAI)
        );
        assert_eq!(
            LlmProvider::new(Some(&config("ollama/llama3.2", None))).backend(),
            Some(&LlmBackend::Ollama)
        );
        assert_eq!(
            LlmProvider::new(Some(&config("my-model", Some("http://localhost:8080/v1")))).backend(),
            Some(&LlmBackend::OpenAICompatible {
                base_url: "http://localhost:8080/v1".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_provider_without_base_url_is_unavailable() {
        let provider = LlmProvider::new(Some(&config("my-model", None)));
        assert!(!provider.is_available());
        assert_eq!(provider.backend(), None);
    }

    #[tokio::test]
    async fn test_unavailable_provider_fails_fast() {
        let provider = LlmProvider::new(None);
        let request = ToolCallRequest {
            system_prompt: String::new(),
            prompt: "show my payments".to_string(),
            tool: command_tool(),
            temperature: 0.0,
            max_tokens: 64,
        };

        let err = provider.complete_tool_call(&request).await.unwrap_err();
        assert!(matches!(err, TallyError::LlmUnavailable(_)));
    }
}
