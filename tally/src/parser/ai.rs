use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::error::TallyError;
use crate::llm::prompts::{command_prompt, command_system_prompt, command_tool, COMMAND_TOOL_NAME};
use crate::llm::{CommandModel, LlmReply, ToolCallRequest};
use crate::models::{keys, Entities, EntityValue, Intent, ParseSource, ParsedCommand, RagContext};

/// Why the model's answer could not be used. Every variant sends the parser
/// down the rule-based path.
#[derive(Error, Debug)]
pub enum ParseFailure {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model call failed: {0}")]
    Model(#[from] TallyError),

    #[error("model answered without calling record_command")]
    NoToolCall,

    #[error("model called unexpected tool '{0}'")]
    WrongTool(String),

    #[error("malformed arguments: {0}")]
    Malformed(String),

    #[error("{intent} is missing {fields:?}")]
    MissingFields {
        intent: Intent,
        fields: Vec<&'static str>,
    },
}

/// Parses commands by asking the model for a forced `record_command` call.
#[derive(Clone)]
pub struct AiParser {
    model: Arc<dyn CommandModel>,
    timeout: Duration,
    context_turns: usize,
    max_tokens: u32,
}

impl AiParser {
    pub fn new(
        model: Arc<dyn CommandModel>,
        timeout: Duration,
        context_turns: usize,
        max_tokens: u32,
    ) -> Self {
        Self {
            model,
            timeout,
            context_turns,
            max_tokens,
        }
    }

    pub async fn parse(
        &self,
        text: &str,
        context: Option<&RagContext>,
    ) -> Result<ParsedCommand, ParseFailure> {
        let recent = context
            .map(|c| {
                let skip = c.recent_turns.len().saturating_sub(self.context_turns);
                &c.recent_turns[skip..]
            })
            .unwrap_or_default();

        let request = ToolCallRequest {
            system_prompt: command_system_prompt(),
            prompt: command_prompt(text, recent, today()),
            tool: command_tool(),
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        let reply = tokio::time::timeout(self.timeout, self.model.complete_tool_call(&request))
            .await
            .map_err(|_| ParseFailure::Timeout(self.timeout))??;

        let arguments = match reply {
            LlmReply::ToolCall { name, arguments } => {
                if name != COMMAND_TOOL_NAME {
                    return Err(ParseFailure::WrongTool(name));
                }
                arguments
            }
            // Some local models put the call in the message body instead.
            LlmReply::Text(content) => serde_json::from_str(strip_code_fence(&content))
                .map_err(|_| ParseFailure::NoToolCall)?,
        };

        command_from_arguments(text, &arguments)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Validate `{"intent": ..., "entities": {...}}` into a command.
pub fn command_from_arguments(text: &str, arguments: &Value) -> Result<ParsedCommand, ParseFailure> {
    let intent: Intent = arguments
        .get("intent")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseFailure::Malformed("missing intent".to_string()))?
        .parse()
        .map_err(ParseFailure::Malformed)?;

    let mut entities = Entities::new();
    if let Some(object) = arguments.get("entities").and_then(Value::as_object) {
        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            let value: EntityValue = serde_json::from_value(value.clone())
                .map_err(|e| ParseFailure::Malformed(format!("entity '{key}': {e}")))?;
            entities.insert(key.clone(), value);
        }
    }

    let mut command = ParsedCommand::new(intent, text.trim(), 1.0, ParseSource::Ai);
    command.entities = entities;

    if let Some(raw) = command.text(keys::PAYMENT_TYPE) {
        if command.payment_type().is_none() {
            return Err(ParseFailure::Malformed(format!("unknown payment_type '{raw}'")));
        }
    }
    if let Some(raw) = command.text(keys::FREQUENCY) {
        if command.frequency().is_none() {
            return Err(ParseFailure::Malformed(format!("unknown frequency '{raw}'")));
        }
    }
    if let Some(currency) = command.text(keys::CURRENCY).map(str::to_uppercase) {
        command.entities.insert(keys::CURRENCY.to_string(), currency.into());
    }

    let fields = command.missing_fields();
    if !fields.is_empty() {
        return Err(ParseFailure::MissingFields { intent, fields });
    }

    Ok(command)
}
