use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionNamedToolChoice, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, FunctionName, FunctionObject,
    },
    Client,
};
use reqwest::StatusCode;

use super::{LlmReply, ToolCallRequest};
use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    embeddings::default_base_url,
    error::{Result, TallyError},
};

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

#[derive(Clone)]
pub struct LlmApiClient {
    client: Client<OpenAIConfig>,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(TallyError::LlmUnavailable(format!(
                "API key required for provider '{provider}'"
            )));
        }

        let openai_config = OpenAIConfig::new()
            .with_api_base(api_config.base_url.clone())
            .with_api_key(api_config.api_key.clone().unwrap_or_default());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| {
                TallyError::Llm(format!("Failed to create LLM HTTP client: {error}"))
            })?;

        // async-openai retries 429/5xx internally for up to 15 minutes by
        // default; cap it at the request timeout.
        let backoff = backoff::ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(api_config.timeout_secs)),
            ..Default::default()
        };

        let client = Client::with_config(openai_config)
            .with_http_client(http_client)
            .with_backoff(backoff);

        Ok(Self {
            client,
            config: api_config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Ask the model to answer by calling `request.tool`.
    pub async fn complete_tool_call(&self, request: &ToolCallRequest) -> Result<LlmReply> {
        if request.prompt.trim().is_empty() {
            return Err(TallyError::Validation("Prompt cannot be empty".to_string()));
        }

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 << (attempt - 1))).await;
            }

            let chat_request = self.build_tool_request(request)?;
            let error = match self.client.chat().create(chat_request).await {
                Ok(response) => return Self::extract_reply(response),
                Err(error) => error,
            };

            match classify(error) {
                Failure::Retry(error) => {
                    tracing::debug!(attempt, error = %error, "Retryable LLM error");
                    last_error = Some(error);
                }
                Failure::Fatal(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| TallyError::Llm("No attempts were made".to_string())))
    }

    fn build_tool_request(&self, request: &ToolCallRequest) -> Result<CreateChatCompletionRequest> {
        let mut messages = Vec::with_capacity(2);

        if !request.system_prompt.trim().is_empty() {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_prompt.as_str())
                    .build()
                    .map_err(|error| {
                        TallyError::Validation(format!("Invalid system prompt: {error}"))
                    })?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.as_str())
                .build()
                .map_err(|error| TallyError::Validation(format!("Invalid user prompt: {error}")))?
                .into(),
        );

        let tool = ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: request.tool.name.clone(),
                description: Some(request.tool.description.clone()),
                parameters: Some(request.tool.parameters.clone()),
                strict: None,
            },
        };

        let choice = ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
            r#type: ChatCompletionToolType::Function,
            function: FunctionName {
                name: request.tool.name.clone(),
            },
        });

        CreateChatCompletionRequestArgs::default()
            .model(self.config.model.clone())
            .messages(messages)
            .tools(vec![tool])
            .tool_choice(choice)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|error| TallyError::Validation(format!("Invalid LLM tool request: {error}")))
    }

    fn extract_reply(response: CreateChatCompletionResponse) -> Result<LlmReply> {
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TallyError::Llm("LLM response contained no choices".to_string()))?
            .message;

        if let Some(call) = message.tool_calls.and_then(|calls| calls.into_iter().next()) {
            let arguments = serde_json::from_str(&call.function.arguments).map_err(|e| {
                tracing::debug!(
                    arguments_preview = %call.function.arguments.chars().take(100).collect::<String>(),
                    error = %e,
                    "Tool call arguments were not valid JSON"
                );
                TallyError::Llm(format!("Failed to parse tool call arguments: {e}"))
            })?;
            return Ok(LlmReply::ToolCall {
                name: call.function.name,
                arguments,
            });
        }

        let content = message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(TallyError::Llm(
                "LLM response contained neither a tool call nor content".to_string(),
            ));
        }
        Ok(LlmReply::Text(content))
    }
}

/// What to do with a failed chat request.
enum Failure {
    Retry(TallyError),
    Fatal(TallyError),
}

/// Sort an async-openai error into retry-or-give-up. Throttling and bad
/// credentials end the attempt at once; the caller falls back to rules.
fn classify(error: OpenAIError) -> Failure {
    match error {
        OpenAIError::Reqwest(e) => match e.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => {
                Failure::Fatal(TallyError::LlmRateLimit { retry_after: None })
            }
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Failure::Fatal(TallyError::ApiAuth(format!("LLM authentication failed: {e}")))
            }
            Some(status) if !status.is_server_error() => {
                Failure::Fatal(TallyError::Llm(format!("LLM request failed: {e}")))
            }
            // No status means the connection itself failed.
            _ => Failure::Retry(TallyError::Llm(format!("LLM request failed: {e}"))),
        },
        OpenAIError::ApiError(api_error) => classify_api_error(api_error),
        OpenAIError::JSONDeserialize(e) => {
            Failure::Fatal(TallyError::Llm(format!("Failed to parse LLM response: {e}")))
        }
        OpenAIError::InvalidArgument(message) => Failure::Fatal(TallyError::Validation(message)),
        other => Failure::Fatal(TallyError::Llm(other.to_string())),
    }
}

fn classify_api_error(api_error: ApiError) -> Failure {
    let lower = |field: &Option<String>| field.as_deref().unwrap_or_default().to_lowercase();
    let message = api_error.message.to_lowercase();
    let kind = lower(&api_error.r#type);
    let code = lower(&api_error.code);

    if message.contains("rate limit")
        || message.contains("too many requests")
        || kind.contains("rate_limit")
        || code.contains("rate_limit")
        || code == "insufficient_quota"
    {
        return Failure::Fatal(TallyError::LlmRateLimit { retry_after: None });
    }
    if message.contains("unauthorized")
        || message.contains("invalid api key")
        || code.contains("invalid_api_key")
        || kind.contains("authentication")
    {
        return Failure::Fatal(TallyError::ApiAuth(format!(
            "LLM authentication failed: {api_error}"
        )));
    }
    // 5xx bodies arrive without a type or code.
    if api_error.r#type.is_none() && api_error.code.is_none() {
        return Failure::Retry(TallyError::Llm(format!("Server error: {api_error}")));
    }
    Failure::Fatal(TallyError::Llm(format!("LLM API error: {api_error}")))
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::prompts::command_tool;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_llm_config(base_url: Option<String>) -> LlmConfig {
        LlmConfig {
            model: "ollama/llama3".to_string(),
            api_key: None,
            base_url,
            timeout_secs: 1,
            max_retries: 0,
            max_tokens: 256,
        }
    }

    fn test_request() -> ToolCallRequest {
        ToolCallRequest {
            system_prompt: "system".to_string(),
            prompt: "Add Netflix for £15.99 monthly".to_string(),
            tool: command_tool(),
            temperature: 0.0,
            max_tokens: 256,
        }
    }

    fn completion(message: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "llama3",
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": "tool_calls"
            }]
        })
    }

    #[test]
    fn test_build_tool_request_forces_tool() {
        let client = LlmApiClient::new(&test_llm_config(None)).expect("client should be created");
        let request = client
            .build_tool_request(&test_request())
            .expect("request should build");

        assert_eq!(request.model, "llama3");
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(1));
        assert!(matches!(
            request.tool_choice,
            Some(ChatCompletionToolChoiceOption::Named(_))
        ));
    }

    #[test]
    fn test_api_key_required_for_hosted_providers() {
        let mut config = test_llm_config(None);
        config.model = "openai/gpt-4o-mini".to_string();
        assert!(matches!(
            LlmApiClient::new(&config),
            Err(TallyError::LlmUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_call_arguments_are_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "record_command",
                        "arguments": "{\"intent\":\"CREATE\",\"entities\":{\"name\":\"Netflix\",\"amount\":15.99}}"
                    }
                }]
            }))))
            .mount(&server)
            .await;

        let client = LlmApiClient::new(&test_llm_config(Some(server.uri()))).unwrap();
        let reply = client.complete_tool_call(&test_request()).await.unwrap();

        match reply {
            LlmReply::ToolCall { name, arguments } => {
                assert_eq!(name, "record_command");
                assert_eq!(arguments["intent"], "CREATE");
                assert_eq!(arguments["entities"]["amount"], 15.99);
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
                "role": "assistant",
                "content": "I can't help with that."
            }))))
            .mount(&server)
            .await;

        let client = LlmApiClient::new(&test_llm_config(Some(server.uri()))).unwrap();
        let reply = client.complete_tool_call(&test_request()).await.unwrap();

        assert_eq!(reply, LlmReply::Text("I can't help with that.".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "record_command", "arguments": "{not json" }
                }]
            }))))
            .mount(&server)
            .await;

        let client = LlmApiClient::new(&test_llm_config(Some(server.uri()))).unwrap();
        let err = client.complete_tool_call(&test_request()).await.unwrap_err();

        assert!(matches!(err, TallyError::Llm(ref msg) if msg.contains("tool call arguments")));
    }

    fn api_error(message: &str, kind: Option<&str>, code: Option<&str>) -> ApiError {
        ApiError {
            message: message.to_string(),
            r#type: kind.map(str::to_string),
            param: None,
            code: code.map(str::to_string),
        }
    }

    #[test]
    fn test_classify_api_errors() {
        assert!(matches!(
            classify_api_error(api_error("upstream exploded", None, None)),
            Failure::Retry(TallyError::Llm(ref msg)) if msg.starts_with("Server error")
        ));
        assert!(matches!(
            classify_api_error(api_error("slow down", Some("requests"), Some("rate_limit_exceeded"))),
            Failure::Fatal(TallyError::LlmRateLimit { .. })
        ));
        assert!(matches!(
            classify_api_error(api_error("Incorrect key", Some("invalid_request_error"), Some("invalid_api_key"))),
            Failure::Fatal(TallyError::ApiAuth(_))
        ));
        assert!(matches!(
            classify_api_error(api_error("bad tool", Some("invalid_request_error"), None)),
            Failure::Fatal(TallyError::Llm(ref msg)) if msg.starts_with("LLM API error")
        ));
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let client = LlmApiClient::new(&test_llm_config(None)).unwrap();
        let mut request = test_request();
        request.prompt = "   ".to_string();

        assert!(matches!(
            client.complete_tool_call(&request).await,
            Err(TallyError::Validation(_))
        ));
    }
}
