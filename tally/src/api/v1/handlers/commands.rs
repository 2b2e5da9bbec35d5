use axum::extract::State;

use crate::api::v1::dto::CommandRequest;
use crate::api::v1::response::{ApiError, ApiResponse, ErrorCode};
use crate::api::{AppJson, AppState};
use crate::models::ExecutionResult;

/// `POST /api/v1/commands`
///
/// Runs one natural-language command. Domain outcomes (not found, missing
/// fields, clarification) are reported inside `data`.
#[utoipa::path(
    post,
    path = "/api/v1/commands",
    tag = "commands",
    request_body = CommandRequest,
    responses(
        (status = 200, description = "Command handled", body = ExecutionResult),
        (status = 400, description = "Malformed request", body = ApiError),
    )
)]
pub async fn handle_command(
    State(state): State<AppState>,
    AppJson(req): AppJson<CommandRequest>,
) -> ApiResponse<ExecutionResult> {
    if req.user_id.trim().is_empty() {
        return ApiResponse::error(ErrorCode::InvalidRequest, "userId cannot be empty");
    }
    if req.session_id.trim().is_empty() {
        return ApiResponse::error(ErrorCode::InvalidRequest, "sessionId cannot be empty");
    }

    let result = state
        .pipeline
        .handle_command(&req.text, req.user_id.trim(), req.session_id.trim())
        .await;

    ApiResponse::success(result)
}
