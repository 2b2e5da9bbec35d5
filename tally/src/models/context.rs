use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ConversationTurn;
use crate::error::{Result, TallyError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Turn,
    Note,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Turn => write!(f, "turn"),
            Self::Note => write!(f, "note"),
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "turn" => Ok(Self::Turn),
            "note" => Ok(Self::Note),
            _ => Err(format!("Unknown entry kind: {s}")),
        }
    }
}

/// A document written to the vector index: an embedded turn or note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub kind: EntryKind,
    pub content: String,
    pub payload: serde_json::Value,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn from_turn(turn: &ConversationTurn, embedding: Vec<f32>) -> Result<Self> {
        Ok(Self {
            id: turn.id.clone(),
            user_id: turn.user_id.clone(),
            session_id: turn.session_id.clone(),
            kind: EntryKind::Turn,
            content: turn.content.clone(),
            payload: serde_json::to_value(turn)?,
            embedding,
            created_at: turn.timestamp,
        })
    }
}

/// A raw cosine-similarity candidate returned by the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub user_id: String,
    pub kind: EntryKind,
    pub content: String,
    pub payload: serde_json::Value,
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

/// A re-ranked retrieval candidate. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub id: String,
    pub composite_score: f32,
    pub semantic_score: f32,
    pub content: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedEntity {
    pub kind: EntityKind,
    pub value: String,
    pub source_turn_id: String,
}

/// Context assembled for one command before it is executed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RagContext {
    pub recent_turns: Vec<ConversationTurn>,
    pub relevant_turns: Vec<RetrievalResult>,
    /// Anaphor (lowercased, as written) to the entity it refers to.
    pub resolved_entities: BTreeMap<String, ResolvedEntity>,
    /// Anaphor that had no type-compatible antecedent.
    pub unresolved_reference: Option<String>,
    /// True when semantic retrieval was skipped because a collaborator failed.
    pub degraded: bool,
}

impl RagContext {
    pub fn recent_only(recent_turns: Vec<ConversationTurn>) -> Self {
        Self {
            recent_turns,
            degraded: true,
            ..Default::default()
        }
    }

    /// Look up what an anaphor points at, or report that it is ambiguous.
    pub fn resolve(&self, anaphor: &str) -> Result<&ResolvedEntity> {
        let key = anaphor.trim().to_lowercase();
        self.resolved_entities
            .get(&key)
            .ok_or(TallyError::AmbiguousReference(key))
    }

    pub fn has_ambiguous_reference(&self) -> bool {
        self.unresolved_reference.is_some()
    }
}
