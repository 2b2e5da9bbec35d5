use async_trait::async_trait;

use crate::error::Result;
use crate::models::{IndexEntry, PaymentRecord, VectorHit};

/// Similarity search over embedded conversation entries.
///
/// Implementations must apply the `user_id` filter inside the query itself,
/// never after fetching, so one tenant's entries cannot leak into another's
/// candidate list or crowd it out of the `limit`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace an entry by id.
    async fn upsert(&self, entry: &IndexEntry) -> Result<()>;

    /// Up to `limit` entries for `user_id`, highest cosine similarity first.
    async fn search(&self, vector: &[f32], user_id: &str, limit: usize) -> Result<Vec<VectorHit>>;
}

/// Persistence for payment records. Every lookup is scoped by `user_id`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<()>;
    async fn get_payment(&self, user_id: &str, id: &str) -> Result<Option<PaymentRecord>>;
    /// Case-insensitive exact name match.
    async fn find_payment_by_name(&self, user_id: &str, name: &str)
        -> Result<Option<PaymentRecord>>;
    async fn list_payments(&self, user_id: &str) -> Result<Vec<PaymentRecord>>;
    async fn save_payment(&self, record: &PaymentRecord) -> Result<()>;
    async fn delete_payment(&self, user_id: &str, id: &str) -> Result<bool>;
}
