mod api;
pub mod prompts;
mod provider;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use prompts::ToolSpec;

pub use api::LlmApiClient;
pub use provider::{LlmBackend, LlmProvider};

/// One forced tool-call completion.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub tool: ToolSpec,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// What the model answered with.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmReply {
    ToolCall { name: String, arguments: Value },
    Text(String),
}

/// Chat model able to answer with a function call.
#[async_trait]
pub trait CommandModel: Send + Sync {
    async fn complete_tool_call(&self, request: &ToolCallRequest) -> Result<LlmReply>;
}
