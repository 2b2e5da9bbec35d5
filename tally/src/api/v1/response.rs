//! # V1 response envelope
//!
//! Every v1 endpoint answers `{"data": ...}` on success and
//! `{"error": {"code": ..., "message": ...}}` when the request itself could
//! not be taken.
//!
//! A command that was understood but could not be carried out (unknown
//! payment, missing amount, unclear "it") is still a `200` with `data`; its
//! `success` and `outcome` fields say what happened.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::TallyError;

/// Machine-readable error code, serialized snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed body, blank ids or failed validation.
    InvalidRequest,
    NotFound,
    /// "it" or "that" could not be pinned to one payment.
    AmbiguousReference,
    /// An upstream model or embedding API is throttling us.
    RateLimited,
    /// An upstream collaborator timed out or is not configured.
    Unavailable,
    /// Details are logged, never returned.
    InternalError,
}

impl From<ErrorCode> for StatusCode {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AmbiguousReference => StatusCode::CONFLICT,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    pub code: ErrorCode,
    /// Safe to show to end users.
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
enum Body<T> {
    Data(T),
    Error(ApiError),
}

/// A v1 reply: either `data` or `error`, plus the HTTP status to send it with.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    status: StatusCode,
    body: Body<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            body: Body::Data(data),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.into(),
            body: Body::Error(ApiError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.body)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self.to_json() {
            Ok(body) => (self.status, Json(body)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize v1 response");
                ApiResponse::<()>::error(ErrorCode::InternalError, "An internal error occurred")
                    .into_response()
            }
        }
    }
}

impl<T: Serialize> From<TallyError> for ApiResponse<T> {
    /// Internal error details are logged and replaced with a generic message.
    fn from(err: TallyError) -> Self {
        let code = match &err {
            TallyError::EmptyInput
            | TallyError::Validation(_)
            | TallyError::Schedule(_)
            | TallyError::Json(_) => ErrorCode::InvalidRequest,
            TallyError::NotFound(_) => ErrorCode::NotFound,
            TallyError::AmbiguousReference(_) => ErrorCode::AmbiguousReference,
            TallyError::ApiRateLimit { .. } | TallyError::LlmRateLimit { .. } => {
                ErrorCode::RateLimited
            }
            TallyError::Timeout { .. } | TallyError::LlmUnavailable(_) => ErrorCode::Unavailable,
            TallyError::Database(_)
            | TallyError::Embedding(_)
            | TallyError::Cache(_)
            | TallyError::Http(_)
            | TallyError::Io(_)
            | TallyError::ApiAuth(_)
            | TallyError::Llm(_)
            | TallyError::Internal(_) => ErrorCode::InternalError,
        };

        let message = match (&err, code) {
            (TallyError::Validation(msg) | TallyError::NotFound(msg), _) => msg.clone(),
            (TallyError::AmbiguousReference(anaphor), _) => {
                format!("Not sure what \"{anaphor}\" refers to")
            }
            (
                TallyError::ApiRateLimit { retry_after } | TallyError::LlmRateLimit { retry_after },
                _,
            ) => match retry_after {
                Some(secs) => format!("Rate limit exceeded, retry after {secs} seconds"),
                None => "Rate limit exceeded".to_string(),
            },
            (_, ErrorCode::InternalError) => {
                tracing::error!(error = %err, "Internal error mapped to v1 response");
                "An internal error occurred".to_string()
            }
            (_, ErrorCode::Unavailable) => {
                tracing::warn!(error = %err, "Upstream unavailable");
                "The service is temporarily unavailable".to_string()
            }
            _ => err.to_string(),
        };

        ApiResponse::error(code, message)
    }
}
