use std::collections::HashSet;

use chrono::{DateTime, Utc};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::RetrievalConfig;
use crate::models::{RetrievalResult, VectorHit};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "at", "be", "by", "do", "for", "from", "how", "i", "in", "is", "it",
    "me", "my", "of", "on", "or", "per", "show", "that", "the", "this", "to", "what", "with",
];

/// Lowercased content words, without stopwords or single characters.
pub fn keywords(text: &str) -> HashSet<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 1 && !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Share of the query's keywords that also appear in `candidate`, in `[0, 1]`.
pub fn keyword_overlap(query: &HashSet<String>, candidate: &str) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let candidate = keywords(candidate);
    let shared = query.iter().filter(|word| candidate.contains(*word)).count();
    shared as f32 / query.len() as f32
}

/// Re-ranks cosine candidates with keyword overlap and a recency bonus.
#[derive(Debug, Clone)]
pub struct HybridScorer {
    top_k: usize,
    min_score: f32,
    keyword_boost: f32,
    recency_boost: f32,
    half_life_hours: f64,
}

impl HybridScorer {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
            keyword_boost: config.keyword_boost,
            recency_boost: config.recency_boost,
            half_life_hours: config.recency_half_life_hours.max(f64::EPSILON),
        }
    }

    /// `exp(-age / half_life)`, 1.0 for brand-new entries.
    pub fn recency(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let age_hours = (now - created_at).num_seconds().max(0) as f64 / 3600.0;
        (-age_hours / self.half_life_hours).exp() as f32
    }

    pub fn score(&self, query: &HashSet<String>, hit: &VectorHit, now: DateTime<Utc>) -> f32 {
        hit.score
            + self.keyword_boost * keyword_overlap(query, &hit.content)
            + self.recency_boost * self.recency(hit.created_at, now)
    }

    /// Score every hit, keep those at or above `min_score`, and return the
    /// best `top_k`. Equal scores are ordered newest first.
    pub fn rank(&self, query: &str, hits: Vec<VectorHit>, now: DateTime<Utc>) -> Vec<RetrievalResult> {
        let query = keywords(query);

        let mut results: Vec<RetrievalResult> = hits
            .into_iter()
            .map(|hit| RetrievalResult {
                composite_score: self.score(&query, &hit, now),
                semantic_score: hit.score,
                id: hit.id,
                content: hit.content,
                payload: hit.payload,
                created_at: hit.created_at,
            })
            .filter(|result| result.composite_score >= self.min_score)
            .collect();

        results.sort_by(|a, b| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        results.truncate(self.top_k);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryKind;
    use chrono::Duration;

    fn hit(id: &str, content: &str, score: f32, created_at: DateTime<Utc>) -> VectorHit {
        VectorHit {
            id: id.to_string(),
            user_id: "u1".to_string(),
            kind: EntryKind::Turn,
            content: content.to_string(),
            payload: serde_json::Value::Null,
            score,
            created_at,
        }
    }

    fn scorer() -> HybridScorer {
        HybridScorer::new(&RetrievalConfig::default())
    }

    #[test]
    fn test_keywords_drop_stopwords_and_case() {
        let words = keywords("Show me the Netflix subscription!");
        assert!(words.contains("netflix"));
        assert!(words.contains("subscription"));
        assert!(!words.contains("the"));
        assert!(!words.contains("me"));
    }

    #[test]
    fn test_overlap_fraction() {
        let query = keywords("netflix monthly");
        assert_eq!(keyword_overlap(&query, "Added Netflix for 15.99"), 0.5);
        assert_eq!(keyword_overlap(&query, "rent"), 0.0);
        assert_eq!(keyword_overlap(&HashSet::new(), "anything"), 0.0);
    }

    #[test]
    fn test_recency_decays_by_half_life() {
        let now = Utc::now();
        let scorer = scorer();
        assert!((scorer.recency(now, now) - 1.0).abs() < 1e-6);

        let one_half_life = scorer.recency(now - Duration::hours(24), now);
        assert!((one_half_life - (-1.0f32).exp()).abs() < 1e-4);
    }

    #[test]
    fn test_keyword_match_outranks_slightly_closer_vector() {
        let now = Utc::now();
        let results = scorer().rank(
            "netflix price",
            vec![
                hit("rent", "Rent is 900 monthly", 0.62, now),
                hit("netflix", "Netflix price went up", 0.58, now),
            ],
            now,
        );

        assert_eq!(results[0].id, "netflix");
        assert_eq!(results[0].semantic_score, 0.58);
    }

    #[test]
    fn test_ties_prefer_newer_entries() {
        let now = Utc::now();
        let config = RetrievalConfig {
            recency_boost: 0.0,
            ..Default::default()
        };
        let results = HybridScorer::new(&config).rank(
            "unrelated",
            vec![
                hit("old", "a", 0.7, now - Duration::hours(5)),
                hit("new", "b", 0.7, now),
            ],
            now,
        );

        assert_eq!(results[0].id, "new");
        assert_eq!(results[1].id, "old");
    }

    #[test]
    fn test_min_score_and_top_k() {
        let now = Utc::now();
        let config = RetrievalConfig {
            top_k: 2,
            min_score: 0.5,
            recency_boost: 0.0,
            ..Default::default()
        };
        let results = HybridScorer::new(&config).rank(
            "zzz",
            vec![
                hit("a", "x", 0.9, now),
                hit("b", "x", 0.8, now),
                hit("c", "x", 0.7, now),
                hit("d", "x", 0.1, now),
            ],
            now,
        );

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
