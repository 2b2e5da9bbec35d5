//! Natural-language command parsing: model first, rules as the fallback.

mod ai;
mod hints;
mod rules;

use std::sync::Arc;
use std::time::Duration;

use crate::config::ParserConfig;
use crate::error::{Result, TallyError};
use crate::llm::CommandModel;
use crate::models::{ParsedCommand, RagContext};

pub use ai::{command_from_arguments, AiParser, ParseFailure};
pub use hints::classify;
pub use rules::RuleParser;

const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Clone)]
pub struct CommandParser {
    ai: Option<AiParser>,
    rules: RuleParser,
}

impl CommandParser {
    /// `model` is `None` when no LLM is configured; every command then goes
    /// straight to the rule-based parser.
    pub fn new(model: Option<Arc<dyn CommandModel>>, config: &ParserConfig) -> Self {
        Self::with_max_tokens(model, config, DEFAULT_MAX_TOKENS)
    }

    pub fn with_max_tokens(
        model: Option<Arc<dyn CommandModel>>,
        config: &ParserConfig,
        max_tokens: u32,
    ) -> Self {
        let ai = model.map(|model| {
            AiParser::new(
                model,
                Duration::from_millis(config.ai_timeout_ms),
                config.context_turns,
                max_tokens,
            )
        });

        Self {
            ai,
            rules: RuleParser::new(config.fallback_confidence, config.unknown_confidence),
        }
    }

    pub fn has_model(&self) -> bool {
        self.ai.is_some()
    }

    /// Parse `text` into a command. Only blank input is an error; any other
    /// failure falls back to the rules.
    pub async fn parse(&self, text: &str, context: Option<&RagContext>) -> Result<ParsedCommand> {
        if text.trim().is_empty() {
            return Err(TallyError::EmptyInput);
        }

        if let Some(ai) = &self.ai {
            match ai.parse(text, context).await {
                Ok(command) => {
                    tracing::debug!(intent = %command.intent, "AI parse succeeded");
                    return Ok(command);
                }
                Err(failure) => {
                    tracing::warn!(reason = %failure, "AI parse failed, using rule-based fallback");
                }
            }
        }

        Ok(self.rules.parse(text))
    }
}
