use axum::Json;
use utoipa::OpenApi;

use super::handlers::{commands, health};
use super::{dto, response};
use crate::models::{ExecutionResult, Intent, Outcome};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tally API",
        version = "1.0.0",
        description = "Manage recurring payments, debts and savings goals with natural-language commands.",
    ),
    paths(commands::handle_command, health::health_check),
    components(schemas(
        dto::CommandRequest,
        ExecutionResult,
        Outcome,
        Intent,
        response::ApiError,
        response::ErrorCode,
        health::HealthData,
        health::ParserStatus,
        health::ParserMode,
    )),
    tags(
        (name = "commands", description = "Natural-language payment commands"),
        (name = "health", description = "Service status"),
    ),
)]
pub struct ApiDoc;

/// `GET /api/v1/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
