use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::RetrievalConfig;
use crate::db::VectorIndex;
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::models::{
    ConversationTurn, IndexEntry, RagContext, ResolvedEntity, RetrievalResult,
    VectorHit,
};

use super::hybrid::HybridScorer;
use super::references::{find_anaphor, resolve_reference};
use super::retry::retry_transient;
use super::session::SessionContext;

/// Assembles per-command context: recent session turns, semantically related
/// past turns, and whatever anaphor the query contains resolved against them.
#[derive(Clone)]
pub struct RagContextService {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    scorer: HybridScorer,
    candidate_limit: usize,
    search_timeout: Duration,
    embedding_timeout: Duration,
    retry_backoff: Duration,
}

impl RagContextService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            scorer: HybridScorer::new(config),
            candidate_limit: config.top_k.saturating_mul(config.candidate_multiplier.max(1)),
            search_timeout: Duration::from_millis(config.search_timeout_ms),
            embedding_timeout: Duration::from_millis(config.embedding_timeout_ms),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Never fails: when embedding or search is unavailable the context holds
    /// only the session's recent turns and is marked degraded.
    pub async fn get_context(&self, query: &str, session: &SessionContext) -> RagContext {
        let recent_turns = session.turns();

        let mut context = match self.retrieve(query, session.user_id()).await {
            Ok(relevant_turns) => RagContext {
                recent_turns,
                relevant_turns,
                ..Default::default()
            },
            Err(e) => {
                tracing::warn!(
                    user_id = session.user_id(),
                    session_id = session.session_id(),
                    error = %e,
                    "Semantic retrieval failed, using recent turns only"
                );
                RagContext::recent_only(recent_turns)
            }
        };

        // Drop hits that are already in the recent window.
        context
            .relevant_turns
            .retain(|hit| !context.recent_turns.iter().any(|turn| turn.id == hit.id));

        if let Some(anaphor) = find_anaphor(query) {
            match self.antecedent(&context) {
                Some(entity) => {
                    tracing::debug!(anaphor = %anaphor, antecedent = %entity.value, "Resolved reference");
                    context.resolved_entities.insert(anaphor, entity);
                }
                None => {
                    tracing::debug!(anaphor = %anaphor, "No antecedent for reference");
                    context.unresolved_reference = Some(anaphor);
                }
            }
        }

        context
    }

    /// Append a turn to the session and index it for later retrieval.
    /// Indexing is best-effort.
    pub async fn record_turn(&self, session: &mut SessionContext, turn: ConversationTurn) {
        session.push(turn.clone());

        if let Err(e) = self.index_turn(&turn).await {
            tracing::warn!(
                user_id = %turn.user_id,
                turn_id = %turn.id,
                error = %e,
                "Failed to index conversation turn"
            );
        }
    }

    async fn index_turn(&self, turn: &ConversationTurn) -> Result<()> {
        let embedding = self.embed(&turn.content).await?;
        let entry = IndexEntry::from_turn(turn, embedding)?;

        retry_transient("vector upsert", self.search_timeout, self.retry_backoff, || {
            self.index.upsert(&entry)
        })
        .await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        retry_transient("embedding", self.embedding_timeout, self.retry_backoff, || {
            self.embedder.embed(text)
        })
        .await
    }

    async fn retrieve(&self, query: &str, user_id: &str) -> Result<Vec<RetrievalResult>> {
        if self.candidate_limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embed(query).await?;
        let hits: Vec<VectorHit> =
            retry_transient("vector search", self.search_timeout, self.retry_backoff, || {
                self.index.search(&vector, user_id, self.candidate_limit)
            })
            .await?;

        Ok(self.scorer.rank(query, hits, Utc::now()))
    }

    /// Recent turns are searched newest first, then retrieved turns, also
    /// newest first regardless of score.
    fn antecedent(&self, context: &RagContext) -> Option<ResolvedEntity> {
        resolve_reference(&context.recent_turns).or_else(|| {
            let mut retrieved: Vec<&RetrievalResult> = context.relevant_turns.iter().collect();
            retrieved.sort_by_key(|hit| hit.created_at);
            let retrieved: Vec<ConversationTurn> = retrieved
                .into_iter()
                .filter_map(|hit| serde_json::from_value(hit.payload.clone()).ok())
                .collect();
            resolve_reference(&retrieved)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TallyError;
    use crate::models::{keys, Entities, EntityValue, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Hashes words into a small vector so related sentences land close.
    struct WordEmbedder;

    #[async_trait]
    impl Embedder for WordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut vector = vec![0.0; 8];
            for word in text.split_whitespace() {
                let slot = word.to_lowercase().bytes().map(usize::from).sum::<usize>() % 8;
                vector[slot] += 1.0;
            }
            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(TallyError::Embedding("Server error: 503".to_string()))
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    /// Brute-force cosine index.
    #[derive(Default)]
    struct ScanIndex {
        entries: Mutex<Vec<IndexEntry>>,
    }

    #[async_trait]
    impl VectorIndex for ScanIndex {
        async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            entries.retain(|e| e.id != entry.id);
            entries.push(entry.clone());
            Ok(())
        }

        async fn search(&self, vector: &[f32], user_id: &str, limit: usize) -> Result<Vec<VectorHit>> {
            let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
            let mut hits: Vec<VectorHit> = self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.user_id == user_id)
                .map(|e| {
                    let dot: f32 = e.embedding.iter().zip(vector).map(|(a, b)| a * b).sum();
                    VectorHit {
                        id: e.id.clone(),
                        user_id: e.user_id.clone(),
                        kind: e.kind,
                        content: e.content.clone(),
                        payload: e.payload.clone(),
                        score: dot / (norm(&e.embedding) * norm(vector)),
                        created_at: e.created_at,
                    }
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(limit);
            Ok(hits)
        }
    }

    fn service(embedder: Arc<dyn Embedder>, index: Arc<ScanIndex>) -> RagContextService {
        let config = RetrievalConfig {
            min_score: 0.0,
            retry_backoff_ms: 0,
            ..Default::default()
        };
        RagContextService::new(embedder, index, &config)
    }

    fn user_turn(user_id: &str, session_id: &str, content: &str, name: Option<&str>) -> ConversationTurn {
        let mut entities = Entities::new();
        if let Some(name) = name {
            entities.insert(keys::NAME.to_string(), EntityValue::from(name));
        }
        ConversationTurn::new(session_id, user_id, Role::User, content, entities)
    }

    #[tokio::test]
    async fn test_reference_resolves_from_recent_turns() {
        let index = Arc::new(ScanIndex::default());
        let rag = service(Arc::new(WordEmbedder), index.clone());
        let mut session = SessionContext::new("u1", "s1", 10);

        rag.record_turn(
            &mut session,
            user_turn("u1", "s1", "Add Netflix £15.99 monthly", Some("Netflix")),
        )
        .await;

        let context = rag.get_context("cancel it", &session).await;

        assert!(!context.degraded);
        assert_eq!(context.resolve("it").unwrap().value, "Netflix");
        assert_eq!(index.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_reference_is_marked() {
        let rag = service(Arc::new(WordEmbedder), Arc::new(ScanIndex::default()));
        let session = SessionContext::new("u1", "s1", 10);

        let context = rag.get_context("delete that", &session).await;

        assert_eq!(context.unresolved_reference.as_deref(), Some("that"));
        assert!(context.resolved_entities.is_empty());
    }

    #[tokio::test]
    async fn test_reference_falls_back_to_retrieved_turns() {
        let index = Arc::new(ScanIndex::default());
        let rag = service(Arc::new(WordEmbedder), index.clone());

        // Mentioned in an earlier session, so only the index knows about it.
        let mut old_session = SessionContext::new("u1", "old", 10);
        rag.record_turn(
            &mut old_session,
            user_turn("u1", "old", "pause spotify", Some("Spotify")),
        )
        .await;

        let session = SessionContext::new("u1", "new", 10);
        let context = rag.get_context("pause spotify again, resume it later", &session).await;

        assert_eq!(context.relevant_turns.len(), 1);
        assert_eq!(context.resolve("it").unwrap().value, "Spotify");
    }

    #[test]
    fn test_retrieved_reference_prefers_newest_turn() {
        let rag = service(Arc::new(WordEmbedder), Arc::new(ScanIndex::default()));
        let now = Utc::now();

        let retrieved = |name: &str, score: f32, age_hours: i64| {
            let mut turn = user_turn("u1", "old", &format!("add {name}"), Some(name));
            turn.timestamp = now - chrono::Duration::hours(age_hours);
            RetrievalResult {
                id: turn.id.clone(),
                composite_score: score,
                semantic_score: score,
                content: turn.content.clone(),
                payload: serde_json::to_value(&turn).unwrap(),
                created_at: turn.timestamp,
            }
        };

        // Ranked by score, so the older mention comes first.
        let context = RagContext {
            relevant_turns: vec![retrieved("Spotify", 0.9, 48), retrieved("Netflix", 0.4, 1)],
            ..Default::default()
        };

        assert_eq!(rag.antecedent(&context).unwrap().value, "Netflix");
    }

    #[tokio::test]
    async fn test_retrieval_is_scoped_to_user() {
        let index = Arc::new(ScanIndex::default());
        let rag = service(Arc::new(WordEmbedder), index.clone());

        let mut bob = SessionContext::new("bob", "s1", 10);
        rag.record_turn(&mut bob, user_turn("bob", "s1", "Add Netflix", Some("Netflix")))
            .await;

        let alice = SessionContext::new("alice", "s1", 10);
        let context = rag.get_context("Netflix", &alice).await;

        assert!(context.relevant_turns.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_outage_degrades_to_recent_turns() {
        let rag = service(Arc::new(DownEmbedder), Arc::new(ScanIndex::default()));
        let mut session = SessionContext::new("u1", "s1", 10);

        // Indexing fails silently; the turn still lands in the session.
        rag.record_turn(&mut session, user_turn("u1", "s1", "Add Gym £30", Some("Gym")))
            .await;

        let context = rag.get_context("pause it", &session).await;

        assert!(context.degraded);
        assert_eq!(context.recent_turns.len(), 1);
        assert_eq!(context.resolve("it").unwrap().value, "Gym");
    }

    #[tokio::test]
    async fn test_recent_turns_are_not_duplicated_in_relevant() {
        let index = Arc::new(ScanIndex::default());
        let rag = service(Arc::new(WordEmbedder), index);
        let mut session = SessionContext::new("u1", "s1", 10);

        rag.record_turn(&mut session, user_turn("u1", "s1", "Add Netflix", Some("Netflix")))
            .await;

        let context = rag.get_context("Netflix", &session).await;
        assert_eq!(context.recent_turns.len(), 1);
        assert!(context.relevant_turns.is_empty());
    }
}
