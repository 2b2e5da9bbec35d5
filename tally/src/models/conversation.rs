use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{keys, Entities, EntityValue};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

/// One message in a session. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub extracted_entities: Entities,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(
        session_id: &str,
        user_id: &str,
        role: Role,
        content: impl Into<String>,
        extracted_entities: Entities,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.into(),
            extracted_entities,
            timestamp: Utc::now(),
        }
    }

    /// Name of the payment this turn talked about, if any.
    pub fn mentioned_payment(&self) -> Option<&str> {
        self.extracted_entities
            .get(keys::NAME)
            .and_then(EntityValue::as_text)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.timestamp).num_seconds().max(0) as f64;
        seconds / 3600.0
    }
}
