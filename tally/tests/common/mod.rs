#![allow(dead_code)]

use std::path::Path;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally::config::{Config, DatabaseConfig, EmbeddingsConfig, LlmConfig};
use tally::db::Database;

pub const DIMS: usize = 8;

pub fn db_config(path: &Path) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("file:{}", path.display()),
        auth_token: None,
        local_path: None,
        busy_timeout_ms: 5000,
        journal_mode: "WAL".to_string(),
        synchronous: "NORMAL".to_string(),
    }
}

pub async fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::new(&db_config(&dir.path().join("tally.db")), DIMS)
        .await
        .expect("database should open")
}

pub fn embeddings_config(base_url: String) -> EmbeddingsConfig {
    EmbeddingsConfig {
        model: "openai/text-embedding-3-small".to_string(),
        dimensions: DIMS,
        batch_size: 16,
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url),
        timeout_secs: 5,
        max_retries: 0,
    }
}

pub fn llm_config(base_url: String) -> LlmConfig {
    LlmConfig {
        model: "ollama/llama3".to_string(),
        api_key: None,
        base_url: Some(base_url),
        timeout_secs: 2,
        max_retries: 0,
        max_tokens: 256,
    }
}

/// Config over a temp database and a mocked embeddings endpoint, no LLM.
pub fn config(dir: &tempfile::TempDir, embeddings_url: String) -> Config {
    let mut config = Config::default();
    config.database = db_config(&dir.path().join("tally.db"));
    config.embeddings = embeddings_config(embeddings_url);
    config.llm = None;
    config.retrieval.min_score = 0.0;
    config.retrieval.retry_backoff_ms = 0;
    config.domain.default_currency = "GBP".to_string();
    config
}

/// Answer every `/embeddings` call with the same unit vector.
pub async fn mount_embeddings(server: &MockServer) {
    let mut vector = vec![0.0_f32; DIMS];
    vector[0] = 1.0;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "embedding": vector, "index": 0 }]
        })))
        .mount(server)
        .await;
}

pub fn completion(message: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "llama3",
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": "tool_calls"
        }]
    })
}

/// A chat completion that calls `record_command` with `arguments`.
pub fn tool_call(arguments: serde_json::Value) -> serde_json::Value {
    completion(json!({
        "role": "assistant",
        "content": null,
        "tool_calls": [{
            "id": "call_1",
            "type": "function",
            "function": {
                "name": "record_command",
                "arguments": arguments.to_string()
            }
        }]
    }))
}
