//! In-memory collaborators shared by unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::{AgentExecutor, CommandPipeline};
use crate::config::{DomainConfig, ParserConfig, RetrievalConfig, SessionConfig};
use crate::db::{PaymentStore, VectorIndex};
use crate::embeddings::Embedder;
use crate::error::{Result, TallyError};
use crate::models::{IndexEntry, PaymentRecord, VectorHit};
use crate::parser::CommandParser;
use crate::rag::{RagContextService, SessionLanes};
use crate::services::PaymentService;

/// Same vector for every text.
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        4
    }
}

/// Accepts writes, finds nothing.
pub struct NullIndex;

#[async_trait]
impl VectorIndex for NullIndex {
    async fn upsert(&self, _entry: &IndexEntry) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _vector: &[f32], _user_id: &str, _limit: usize) -> Result<Vec<VectorHit>> {
        Ok(Vec::new())
    }
}

/// In-memory payment store keyed by (user_id, id).
#[derive(Default)]
pub struct MemoryStore {
    pub records: Mutex<Vec<PaymentRecord>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn get_payment(&self, user_id: &str, id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user_id == user_id && r.id == id)
            .cloned())
    }

    async fn find_payment_by_name(&self, user_id: &str, name: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user_id == user_id && r.name.eq_ignore_ascii_case(name.trim()))
            .cloned())
    }

    async fn list_payments(&self, user_id: &str) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_payment(&self, record: &PaymentRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| TallyError::NotFound(record.id.clone()))?;
        *slot = record.clone();
        Ok(())
    }

    async fn delete_payment(&self, user_id: &str, id: &str) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !(r.user_id == user_id && r.id == id));
        Ok(records.len() < before)
    }
}

pub fn rag() -> RagContextService {
    let retrieval = RetrievalConfig {
        min_score: 0.0,
        retry_backoff_ms: 0,
        ..Default::default()
    };
    RagContextService::new(Arc::new(FixedEmbedder), Arc::new(NullIndex), &retrieval)
}

/// Rule-parser pipeline over `store`, without a model.
pub fn pipeline(store: Arc<MemoryStore>) -> CommandPipeline {
    let rag = rag();
    let domain = Arc::new(PaymentService::new(store, "GBP"));
    CommandPipeline::new(
        CommandParser::new(None, &ParserConfig::default()),
        rag.clone(),
        AgentExecutor::new(domain, rag, &DomainConfig::default()),
        SessionLanes::new(&SessionConfig::default()),
    )
}
