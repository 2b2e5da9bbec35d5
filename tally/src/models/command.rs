use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Frequency, PaymentType};

/// Entity keys shared by the parser, the LLM tool schema and the executor.
pub mod keys {
    pub const NAME: &str = "name";
    pub const AMOUNT: &str = "amount";
    pub const CURRENCY: &str = "currency";
    pub const FREQUENCY: &str = "frequency";
    pub const FREQUENCY_INTERVAL: &str = "frequency_interval";
    pub const PAYMENT_TYPE: &str = "payment_type";
    pub const TOTAL_OWED: &str = "total_owed";
    pub const REMAINING_BALANCE: &str = "remaining_balance";
    pub const CREDITOR: &str = "creditor";
    pub const TARGET_AMOUNT: &str = "target_amount";
    pub const CURRENT_SAVED: &str = "current_saved";
    pub const RECIPIENT: &str = "recipient";
    pub const TOTAL_INSTALLMENTS: &str = "total_installments";
    pub const START_DATE: &str = "start_date";
    pub const END_DATE: &str = "end_date";
    pub const DAYS: &str = "days";
    pub const REFERENCE: &str = "reference";
}

/// The classified user action. Closed set; dispatch is an exhaustive match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Create,
    Read,
    Update,
    Delete,
    Summary,
    Upcoming,
    Convert,
    Pause,
    Resume,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 10] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::Summary,
        Self::Upcoming,
        Self::Convert,
        Self::Pause,
        Self::Resume,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Summary => "SUMMARY",
            Self::Upcoming => "UPCOMING",
            Self::Convert => "CONVERT",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Intents that act on one existing payment and therefore need a target.
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            Self::Update | Self::Delete | Self::Convert | Self::Pause | Self::Resume
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown intent: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EntityValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl EntityValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Flag(_) => None,
        }
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for EntityValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for EntityValue {
    fn from(value: u32) -> Self {
        Self::Number(value as f64)
    }
}

pub type Entities = BTreeMap<String, EntityValue>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    Ai,
    Rules,
}

/// Structured form of one user command. Produced by the parser, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedCommand {
    pub intent: Intent,
    pub entities: Entities,
    pub confidence: f32,
    pub raw_input: String,
    pub source: ParseSource,
}

impl ParsedCommand {
    pub fn new(intent: Intent, raw_input: &str, confidence: f32, source: ParseSource) -> Self {
        Self {
            intent,
            entities: Entities::new(),
            confidence: confidence.clamp(0.0, 1.0),
            raw_input: raw_input.to_string(),
            source,
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<EntityValue>) -> Self {
        self.entities.insert(key.to_string(), value.into());
        self
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.entities
            .get(key)
            .and_then(EntityValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.entities.get(key).and_then(EntityValue::as_number)
    }

    pub fn name(&self) -> Option<&str> {
        self.text(keys::NAME)
    }

    pub fn reference(&self) -> Option<&str> {
        self.text(keys::REFERENCE)
    }

    pub fn payment_type(&self) -> Option<PaymentType> {
        self.text(keys::PAYMENT_TYPE).and_then(|s| s.parse().ok())
    }

    pub fn frequency(&self) -> Option<Frequency> {
        self.text(keys::FREQUENCY).and_then(|s| s.parse().ok())
    }

    /// Entity keys that must be present for the declared intent but are not.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let has_target = self.name().is_some() || self.reference().is_some();

        if self.intent.needs_target() && !has_target {
            missing.push(keys::NAME);
        }

        match self.intent {
            Intent::Create => {
                if self.name().is_none() {
                    missing.push(keys::NAME);
                }
                if self.number(keys::AMOUNT).is_none() {
                    missing.push(keys::AMOUNT);
                }
            }
            Intent::Update if !self.has_update_fields() => missing.push(keys::AMOUNT),
            Intent::Convert if self.payment_type().is_none() => missing.push(keys::PAYMENT_TYPE),
            _ => {}
        }

        missing
    }

    fn has_update_fields(&self) -> bool {
        const UPDATABLE: [&str; 9] = [
            keys::AMOUNT,
            keys::CURRENCY,
            keys::FREQUENCY,
            keys::FREQUENCY_INTERVAL,
            keys::PAYMENT_TYPE,
            keys::END_DATE,
            keys::TOTAL_OWED,
            keys::REMAINING_BALANCE,
            keys::TARGET_AMOUNT,
        ];
        UPDATABLE.iter().any(|key| self.entities.contains_key(*key))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    NotFound,
    ValidationFailure,
    Clarification,
    Error,
}

/// What the executor hands back to the caller for one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, utoipa::ToSchema)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
}

impl ExecutionResult {
    pub fn success(intent: Intent, message: String, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message,
            data,
            outcome: Outcome::Success,
            intent: Some(intent),
        }
    }

    pub fn failure(intent: Option<Intent>, outcome: Outcome, message: String) -> Self {
        Self {
            success: false,
            message,
            data: None,
            outcome,
            intent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_parses_case_insensitively() {
        assert_eq!("create".parse::<Intent>().unwrap(), Intent::Create);
        assert_eq!("UPCOMING".parse::<Intent>().unwrap(), Intent::Upcoming);
        assert!("CANCEL".parse::<Intent>().is_err());
    }

    #[test]
    fn test_intent_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Intent::Pause).unwrap(), "\"PAUSE\"");
    }

    #[test]
    fn test_create_requires_name_and_amount() {
        let command = ParsedCommand::new(Intent::Create, "add netflix", 1.0, ParseSource::Ai)
            .with(keys::NAME, "Netflix");
        assert_eq!(command.missing_fields(), vec![keys::AMOUNT]);

        let command = command.with(keys::AMOUNT, 15.99);
        assert!(command.missing_fields().is_empty());
    }

    #[test]
    fn test_reference_satisfies_target() {
        let command = ParsedCommand::new(Intent::Delete, "cancel it", 1.0, ParseSource::Ai)
            .with(keys::REFERENCE, "it");
        assert!(command.missing_fields().is_empty());
    }

    #[test]
    fn test_update_needs_a_changed_field() {
        let command = ParsedCommand::new(Intent::Update, "update netflix", 1.0, ParseSource::Ai)
            .with(keys::NAME, "Netflix");
        assert_eq!(command.missing_fields(), vec![keys::AMOUNT]);
    }

    #[test]
    fn test_entity_value_untagged_json() {
        let entities: Entities =
            serde_json::from_str(r#"{"name": "Netflix", "amount": 15.99}"#).unwrap();
        assert_eq!(entities["name"], EntityValue::Text("Netflix".to_string()));
        assert_eq!(entities["amount"].as_number(), Some(15.99));
    }

    #[test]
    fn test_blank_text_entities_are_ignored() {
        let command = ParsedCommand::new(Intent::Read, "show", 0.6, ParseSource::Rules)
            .with(keys::NAME, "   ");
        assert_eq!(command.name(), None);
    }
}
