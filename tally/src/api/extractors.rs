use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::TallyError;

/// `Json` whose rejections come back in the v1 error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(TallyError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for TallyError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let message = err.body_text();
                match extract_missing_field(&message) {
                    Some(field) => TallyError::Validation(format!("Missing required field: {field}")),
                    None => TallyError::Validation(format!("Invalid JSON: {message}")),
                }
            }
            JsonRejection::JsonSyntaxError(err) => {
                TallyError::Validation(format!("JSON syntax error: {}", err.body_text()))
            }
            JsonRejection::MissingJsonContentType(_) => {
                TallyError::Validation("Missing `Content-Type: application/json` header".to_string())
            }
            JsonRejection::BytesRejection(_) => {
                TallyError::Validation("Failed to read request body".to_string())
            }
            _ => TallyError::Validation(rejection.body_text()),
        }
    }
}

fn extract_missing_field(message: &str) -> Option<&str> {
    let prefix = "missing field `";
    let start = message.find(prefix)? + prefix.len();
    let remaining = message.get(start..)?;
    let end = remaining.find('`')?;
    remaining.get(..end)
}
