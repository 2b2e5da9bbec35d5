use unicode_segmentation::UnicodeSegmentation;

use crate::models::{ConversationTurn, EntityKind, ResolvedEntity};

/// Multi-word anaphors are listed first so "this one" wins over "this".
pub const ANAPHORS: &[&str] = &["this one", "that one", "it", "that", "them", "this"];

/// The first anaphor appearing in `text`, lowercased.
pub fn find_anaphor(text: &str) -> Option<String> {
    let words: Vec<String> = text.unicode_words().map(str::to_lowercase).collect();

    for anaphor in ANAPHORS {
        let parts: Vec<&str> = anaphor.split(' ').collect();
        if words.windows(parts.len()).any(|window| window == parts.as_slice()) {
            return Some((*anaphor).to_string());
        }
    }
    None
}

/// Most recently mentioned payment in `turns` (oldest first), if any.
pub fn resolve_reference(turns: &[ConversationTurn]) -> Option<ResolvedEntity> {
    turns.iter().rev().find_map(|turn| {
        Some(ResolvedEntity {
            kind: EntityKind::Payment,
            value: turn.mentioned_payment()?.to_string(),
            source_turn_id: turn.id.clone(),
        })
    })
}
