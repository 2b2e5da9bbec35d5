use serde::Deserialize;

/// Request body for `POST /api/v1/commands`.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// What the user typed, e.g. `"Add Netflix £15.99 monthly"`.
    pub text: String,
    /// Owner of the payments the command acts on.
    pub user_id: String,
    /// Conversation the command belongs to; "it" and "that" resolve within it.
    pub session_id: String,
}
