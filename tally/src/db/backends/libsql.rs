use async_trait::async_trait;

use crate::db::connection::Database;
use crate::db::repository::{EntryRepository, PaymentRepository};
use crate::db::traits::{PaymentStore, VectorIndex};
use crate::error::{Result, TallyError};
use crate::models::{IndexEntry, PaymentRecord, VectorHit};

/// libsql implementation of every store trait, one connection per call.
#[derive(Clone)]
pub struct LibSqlBackend {
    db: Database,
    dimensions: usize,
}

impl LibSqlBackend {
    pub fn new(db: Database, dimensions: usize) -> Self {
        Self { db, dimensions }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(TallyError::Validation(format!(
                "Embedding has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LibSqlBackend {
    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        self.check_dimensions(&entry.embedding)?;
        let conn = self.db.connect()?;
        EntryRepository::upsert(&conn, entry).await
    }

    async fn search(&self, vector: &[f32], user_id: &str, limit: usize) -> Result<Vec<VectorHit>> {
        self.check_dimensions(vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.db.connect()?;
        EntryRepository::search_similar(&conn, vector, user_id, limit).await
    }
}

#[async_trait]
impl PaymentStore for LibSqlBackend {
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<()> {
        let conn = self.db.connect()?;
        PaymentRepository::create(&conn, record).await
    }

    async fn get_payment(&self, user_id: &str, id: &str) -> Result<Option<PaymentRecord>> {
        let conn = self.db.connect()?;
        PaymentRepository::get_by_id(&conn, user_id, id).await
    }

    async fn find_payment_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<PaymentRecord>> {
        let conn = self.db.connect()?;
        PaymentRepository::get_by_name(&conn, user_id, name).await
    }

    async fn list_payments(&self, user_id: &str) -> Result<Vec<PaymentRecord>> {
        let conn = self.db.connect()?;
        PaymentRepository::list(&conn, user_id).await
    }

    async fn save_payment(&self, record: &PaymentRecord) -> Result<()> {
        let conn = self.db.connect()?;
        PaymentRepository::update(&conn, record).await
    }

    async fn delete_payment(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        PaymentRepository::delete(&conn, user_id, id).await
    }
}
