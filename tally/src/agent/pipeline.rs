use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::{Database, LibSqlBackend};
use crate::embeddings::{Embedder, EmbeddingCache, EmbeddingProvider};
use crate::error::{Result, TallyError};
use crate::llm::{CommandModel, LlmProvider};
use crate::models::{ExecutionResult, Outcome};
use crate::parser::CommandParser;
use crate::rag::{RagContextService, SessionLanes};
use crate::services::{PaymentDomain, PaymentService};

use super::AgentExecutor;

/// Text in, result out: context, parse and execute for one session at a time.
#[derive(Clone)]
pub struct CommandPipeline {
    parser: CommandParser,
    rag: RagContextService,
    executor: AgentExecutor,
    lanes: SessionLanes,
}

impl CommandPipeline {
    pub fn new(
        parser: CommandParser,
        rag: RagContextService,
        executor: AgentExecutor,
        lanes: SessionLanes,
    ) -> Self {
        Self {
            parser,
            rag,
            executor,
            lanes,
        }
    }

    /// Wire the production stack over an open database.
    pub fn from_config(config: &Config, db: Database) -> Result<Self> {
        let backend = Arc::new(LibSqlBackend::new(db, config.embeddings.dimensions));

        tracing::info!("Loading embedding model: {}...", config.embeddings.model);
        let provider: Arc<dyn Embedder> = Arc::new(EmbeddingProvider::new(&config.embeddings)?);
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingCache::new(
            provider,
            Arc::new(MemoryCache::new(config.cache.capacity)),
            Duration::from_secs(config.cache.embedding_ttl_secs),
        ));

        if let Some(llm_config) = &config.llm {
            tracing::info!("Initializing LLM provider: {}...", llm_config.model);
        }
        let llm = LlmProvider::new(config.llm.as_ref());
        let model: Option<Arc<dyn CommandModel>> = if llm.is_available() {
            Some(Arc::new(llm))
        } else {
            tracing::warn!("LLM unavailable - commands will use the rule-based parser only");
            None
        };
        let max_tokens = config.llm.as_ref().map(|c| c.max_tokens).unwrap_or(512);

        let domain: Arc<dyn PaymentDomain> =
            Arc::new(PaymentService::new(backend.clone(), &config.domain.default_currency));
        let rag = RagContextService::new(embedder, backend, &config.retrieval);

        Ok(Self::new(
            CommandParser::with_max_tokens(model, &config.parser, max_tokens),
            rag.clone(),
            AgentExecutor::new(domain, rag, &config.domain),
            SessionLanes::new(&config.session),
        ))
    }

    /// Handle one command. Commands for the same (user, session) run one at a
    /// time in arrival order; different sessions run concurrently.
    pub async fn handle_command(&self, text: &str, user_id: &str, session_id: &str) -> ExecutionResult {
        if user_id.trim().is_empty() || session_id.trim().is_empty() {
            return ExecutionResult::failure(
                None,
                Outcome::ValidationFailure,
                "userId and sessionId are required".to_string(),
            );
        }

        let lane = match self.lanes.lane(user_id, session_id) {
            Ok(lane) => lane,
            Err(e) => {
                tracing::error!(user_id, session_id, error = %e, "Failed to acquire session lane");
                return ExecutionResult::failure(None, Outcome::Error, super::responses::try_again());
            }
        };
        let mut session = lane.lock().await;

        let context = self.rag.get_context(text, &session).await;

        let command = match self.parser.parse(text, Some(&context)).await {
            Ok(command) => command,
            Err(e @ TallyError::EmptyInput) => {
                return ExecutionResult::failure(None, Outcome::ValidationFailure, e.to_string());
            }
            Err(e) => {
                tracing::error!(user_id, session_id, error = %e, "Parsing failed");
                return ExecutionResult::failure(None, Outcome::Error, super::responses::try_again());
            }
        };

        tracing::debug!(
            user_id,
            session_id,
            intent = %command.intent,
            confidence = command.confidence,
            degraded = context.degraded,
            ambiguous = context.has_ambiguous_reference(),
            "Parsed command"
        );

        self.executor.execute(&command, &context, &mut session).await
    }

    /// True when commands go to the model before the rule fallback.
    pub fn uses_model(&self) -> bool {
        self.parser.has_model()
    }

    pub fn active_sessions(&self) -> usize {
        self.lanes.len()
    }
}
