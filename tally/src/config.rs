use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub llm: Option<LlmConfig>,
    pub parser: ParserConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub domain: DomainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
    pub busy_timeout_ms: u64,
    pub journal_mode: String,
    pub synchronous: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// LLM configuration for the command-parsing model
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_tokens: u32,
}

/// Deterministic-parser tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Hard timeout for the AI parse step.
    pub ai_timeout_ms: u64,
    /// Confidence reported when the rule-based fallback produced the command.
    pub fallback_confidence: f32,
    /// Confidence reported when no intent keyword matched at all.
    pub unknown_confidence: f32,
    /// How many recent turns are shown to the model for disambiguation.
    pub context_turns: usize,
}

/// Hybrid search weights. Starting points, meant to be tuned per deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Candidates fetched from the index per result slot (limit = top_k * this).
    pub candidate_multiplier: usize,
    pub min_score: f32,
    pub keyword_boost: f32,
    pub recency_boost: f32,
    pub recency_half_life_hours: f64,
    pub search_timeout_ms: u64,
    pub embedding_timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_multiplier: 2,
            min_score: 0.3,
            keyword_boost: 0.2,
            recency_boost: 0.1,
            recency_half_life_hours: 24.0,
            search_timeout_ms: 1500,
            embedding_timeout_ms: 1500,
            retry_backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub embedding_ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embedding_ttl_secs: 3600,
            capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Turns kept per session for reference resolution.
    pub max_turns: usize,
    /// Idle sessions beyond this many are forgotten, least recently used first.
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_sessions: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub default_currency: String,
    pub upcoming_days: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            ai_timeout_ms: 2000,
            fallback_confidence: 0.6,
            unknown_confidence: 0.2,
            context_turns: 4,
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            default_currency: "GBP".to_string(),
            upcoming_days: 7,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let retrieval = RetrievalConfig::default();
        let parser = ParserConfig::default();
        let cache = CacheConfig::default();
        let session = SessionConfig::default();
        let domain = DomainConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("TALLY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("TALLY_PORT", 3000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:tally.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
                busy_timeout_ms: parse_env_or("DATABASE_BUSY_TIMEOUT_MS", 5000),
                journal_mode: env::var("DATABASE_JOURNAL_MODE").unwrap_or_else(|_| "WAL".to_string()),
                synchronous: env::var("DATABASE_SYNCHRONOUS")
                    .unwrap_or_else(|_| "NORMAL".to_string()),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 384),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 64),
                api_key: env::var("EMBEDDING_API_KEY").ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 10),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 1),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY").ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 1),
                max_tokens: parse_env_or("LLM_MAX_TOKENS", 512),
            }),
            parser: ParserConfig {
                ai_timeout_ms: parse_env_or("PARSER_AI_TIMEOUT_MS", parser.ai_timeout_ms),
                fallback_confidence: parse_env_or(
                    "PARSER_FALLBACK_CONFIDENCE",
                    parser.fallback_confidence,
                ),
                unknown_confidence: parse_env_or(
                    "PARSER_UNKNOWN_CONFIDENCE",
                    parser.unknown_confidence,
                ),
                context_turns: parse_env_or("PARSER_CONTEXT_TURNS", parser.context_turns),
            },
            retrieval: RetrievalConfig {
                top_k: parse_env_or("RETRIEVAL_TOP_K", retrieval.top_k),
                candidate_multiplier: parse_env_or(
                    "RETRIEVAL_CANDIDATE_MULTIPLIER",
                    retrieval.candidate_multiplier,
                ),
                min_score: parse_env_or("RETRIEVAL_MIN_SCORE", retrieval.min_score),
                keyword_boost: parse_env_or("RETRIEVAL_KEYWORD_BOOST", retrieval.keyword_boost),
                recency_boost: parse_env_or("RETRIEVAL_RECENCY_BOOST", retrieval.recency_boost),
                recency_half_life_hours: parse_env_or(
                    "RETRIEVAL_RECENCY_HALF_LIFE_HOURS",
                    retrieval.recency_half_life_hours,
                ),
                search_timeout_ms: parse_env_or(
                    "RETRIEVAL_SEARCH_TIMEOUT_MS",
                    retrieval.search_timeout_ms,
                ),
                embedding_timeout_ms: parse_env_or(
                    "RETRIEVAL_EMBEDDING_TIMEOUT_MS",
                    retrieval.embedding_timeout_ms,
                ),
                retry_backoff_ms: parse_env_or(
                    "RETRIEVAL_RETRY_BACKOFF_MS",
                    retrieval.retry_backoff_ms,
                ),
            },
            cache: CacheConfig {
                embedding_ttl_secs: parse_env_or(
                    "EMBEDDING_CACHE_TTL_SECS",
                    cache.embedding_ttl_secs,
                ),
                capacity: parse_env_or("EMBEDDING_CACHE_CAPACITY", cache.capacity),
            },
            session: SessionConfig {
                max_turns: parse_env_or("SESSION_MAX_TURNS", session.max_turns),
                max_sessions: parse_env_or("SESSION_MAX_SESSIONS", session.max_sessions),
            },
            domain: DomainConfig {
                default_currency: env::var("DEFAULT_CURRENCY")
                    .unwrap_or(domain.default_currency),
                upcoming_days: parse_env_or("UPCOMING_DAYS", domain.upcoming_days),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known embedding providers that use OpenAI-compatible APIs
const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio", "local"];

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a model name into (provider, model) tuple.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}
