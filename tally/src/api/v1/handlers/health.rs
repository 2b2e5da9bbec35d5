use axum::extract::State;
use serde::Serialize;

use crate::api::AppState;
use crate::api::v1::response::ApiResponse;

/// How incoming commands are being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParserMode {
    /// The LLM is asked first; rules take over on failure.
    ModelFirst,
    RulesOnly,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParserStatus {
    pub mode: ParserMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub parser: ParserStatus,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    /// Conversations currently held in memory.
    pub active_sessions: usize,
}

impl HealthData {
    fn from_state(state: &AppState) -> Self {
        let parser = if state.pipeline.uses_model() {
            ParserStatus {
                mode: ParserMode::ModelFirst,
                model: state.config.llm.as_ref().map(|llm| llm.model.clone()),
            }
        } else {
            ParserStatus {
                mode: ParserMode::RulesOnly,
                model: None,
            }
        };

        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            parser,
            embedding_model: state.config.embeddings.model.clone(),
            embedding_dimensions: state.config.embeddings.dimensions,
            active_sessions: state.pipeline.active_sessions(),
        }
    }
}

/// `GET /api/v1/health`
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Parser mode, embedding model and session count", body = HealthData),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthData> {
    ApiResponse::success(HealthData::from_state(&state))
}
