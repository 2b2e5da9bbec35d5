//! Prompt templates and the tool schema for command parsing.
//!
//! Templates use plain `format!()` interpolation; the tool schema is built
//! from the same enums the parser validates against, so the model can only be
//! offered values the executor understands.

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::models::{keys, ConversationTurn, Frequency, Intent, PaymentType};

pub const COMMAND_TOOL_NAME: &str = "record_command";

/// Function schema offered to the model. Exactly one call is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Build the `record_command` tool schema.
///
/// # Example
/// ```
/// use tally::llm::prompts::{command_tool, COMMAND_TOOL_NAME};
///
/// let tool = command_tool();
/// assert_eq!(tool.name, COMMAND_TOOL_NAME);
/// assert!(tool.parameters["properties"]["intent"]["enum"].is_array());
/// ```
pub fn command_tool() -> ToolSpec {
    let intents: Vec<&str> = Intent::ALL.iter().map(Intent::as_str).collect();
    let payment_types: Vec<&str> = PaymentType::ALL.iter().map(PaymentType::as_str).collect();
    let frequencies: Vec<&str> = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Biweekly,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::Yearly,
        Frequency::Custom,
    ]
    .iter()
    .map(Frequency::as_str)
    .collect();

    ToolSpec {
        name: COMMAND_TOOL_NAME.to_string(),
        description: "Record the user's payment-management command as an intent plus entities."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "intent": { "type": "string", "enum": intents },
                "entities": {
                    "type": "object",
                    "properties": {
                        (keys::NAME): { "type": "string", "description": "Payment name, e.g. Netflix" },
                        (keys::AMOUNT): { "type": "number", "description": "Amount per payment" },
                        (keys::CURRENCY): { "type": "string", "description": "ISO 4217 code" },
                        (keys::FREQUENCY): { "type": "string", "enum": frequencies },
                        (keys::FREQUENCY_INTERVAL): { "type": "integer", "minimum": 1 },
                        (keys::PAYMENT_TYPE): { "type": "string", "enum": payment_types },
                        (keys::TOTAL_OWED): { "type": "number" },
                        (keys::REMAINING_BALANCE): { "type": "number" },
                        (keys::CREDITOR): { "type": "string" },
                        (keys::TARGET_AMOUNT): { "type": "number" },
                        (keys::CURRENT_SAVED): { "type": "number" },
                        (keys::RECIPIENT): { "type": "string" },
                        (keys::TOTAL_INSTALLMENTS): { "type": "integer", "minimum": 1 },
                        (keys::START_DATE): { "type": "string", "format": "date" },
                        (keys::END_DATE): { "type": "string", "format": "date" },
                        (keys::DAYS): { "type": "integer", "minimum": 1 },
                        (keys::REFERENCE): {
                            "type": "string",
                            "description": "Pronoun used instead of a name, e.g. 'it' or 'that'"
                        }
                    },
                    "additionalProperties": false
                }
            },
            "required": ["intent", "entities"],
            "additionalProperties": false
        }),
    }
}

pub fn command_system_prompt() -> String {
    format!(
        r#"You turn short messages about recurring payments into structured commands.
Always answer by calling the `{COMMAND_TOOL_NAME}` tool exactly once.

Intents:
- CREATE: add a new payment, debt, savings goal or bill
- READ: show one payment or list them
- UPDATE: change the amount, frequency or another field of an existing payment
- DELETE: cancel or remove a payment
- SUMMARY: totals and breakdown of spending
- UPCOMING: payments due in the next few days
- CONVERT: change the type of an existing payment (e.g. subscription to debt)
- PAUSE / RESUME: temporarily stop or restart a payment
- UNKNOWN: anything else

Rules:
- Only include entities the user actually stated.
- Amounts are plain numbers without currency symbols; put the currency in "currency".
- If the user refers to a payment with a pronoun ("it", "that", "this one"), set "reference" to that pronoun and leave "name" empty unless the conversation makes the name certain."#
    )
}

/// Build the user prompt, including the last few turns for disambiguation.
pub fn command_prompt(text: &str, recent_turns: &[ConversationTurn], today: NaiveDate) -> String {
    let history = if recent_turns.is_empty() {
        "(no earlier messages)".to_string()
    } else {
        recent_turns
            .iter()
            .map(|turn| format!("[{}]: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Today is {today}.

Recent conversation:
{history}

Message to parse:
{text}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entities, Role};

    #[test]
    fn test_tool_schema_lists_every_intent() {
        let tool = command_tool();
        let intents = tool.parameters["properties"]["intent"]["enum"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(intents, Intent::ALL.len());

        let types = &tool.parameters["properties"]["entities"]["properties"]["payment_type"]["enum"];
        assert!(types.as_array().unwrap().contains(&json!("professional_service")));
    }

    #[test]
    fn test_prompt_includes_history() {
        let turns = vec![ConversationTurn::new(
            "s1",
            "u1",
            Role::User,
            "Add Netflix £15.99 monthly",
            Entities::new(),
        )];
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let prompt = command_prompt("cancel it", &turns, today);

        assert!(prompt.contains("[user]: Add Netflix £15.99 monthly"));
        assert!(prompt.contains("cancel it"));
        assert!(prompt.contains("2025-03-01"));
    }

    #[test]
    fn test_prompt_without_history() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let prompt = command_prompt("show my payments", &[], today);
        assert!(prompt.contains("(no earlier messages)"));
    }

    #[test]
    fn test_system_prompt_names_tool() {
        assert!(command_system_prompt().contains(COMMAND_TOOL_NAME));
    }
}
