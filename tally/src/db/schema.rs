use libsql::Connection;

use crate::error::{Result, TallyError};

use super::MetadataRepository;

/// Create tables and indexes. `dimensions` fixes the width of the embedding
/// column and cannot change once the table exists.
pub async fn init_schema(conn: &Connection, dimensions: usize) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        -- Key/value metadata about the database itself
        CREATE TABLE IF NOT EXISTS tally_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Embedded conversation turns and notes, searchable per user
        CREATE TABLE IF NOT EXISTS conversation_entries (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'turn',
            content TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{{}}',
            embedding F32_BLOB({dimensions}),
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entries_user_id ON conversation_entries(user_id);
        CREATE INDEX IF NOT EXISTS idx_entries_session ON conversation_entries(user_id, session_id);

        -- Recurring payments, debts and savings goals
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL,
            payment_type TEXT NOT NULL DEFAULT 'subscription',
            frequency TEXT NOT NULL DEFAULT 'monthly',
            frequency_interval INTEGER NOT NULL DEFAULT 1,
            start_date TEXT NOT NULL,
            end_date TEXT,
            next_payment_date TEXT NOT NULL,
            last_payment_date TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            total_owed REAL,
            remaining_balance REAL,
            creditor TEXT,
            target_amount REAL,
            current_saved REAL,
            recipient TEXT,
            total_installments INTEGER,
            completed_installments INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_payments_user_id ON payments(user_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_user_name
            ON payments(user_id, name COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_payments_next_date ON payments(user_id, next_payment_date);
        "#
    ))
    .await?;

    check_embedding_dimensions(conn, dimensions).await?;
    create_vector_index(conn).await?;

    Ok(())
}

async fn check_embedding_dimensions(conn: &Connection, dimensions: usize) -> Result<()> {
    match MetadataRepository::embedding_dimensions(conn).await? {
        Some(stored) if stored != dimensions => Err(TallyError::Internal(format!(
            "Database was created for {stored}-dimensional embeddings but the configured model \
             produces {dimensions}; use a fresh database or the original model"
        ))),
        Some(_) => Ok(()),
        None => {
            tracing::info!(dimensions, "Recording embedding dimensions");
            MetadataRepository::record_embedding_dimensions(conn, dimensions).await
        }
    }
}

async fn create_vector_index(conn: &Connection) -> Result<()> {
    let index_exists: bool = conn
        .query(
            "SELECT 1 FROM sqlite_master WHERE type='index' AND name='entries_embedding_idx'",
            (),
        )
        .await?
        .next()
        .await?
        .is_some();

    if !index_exists {
        if let Err(e) = conn
            .execute(
                "CREATE INDEX IF NOT EXISTS entries_embedding_idx ON conversation_entries(libsql_vector_idx(embedding))",
                (),
            )
            .await
        {
            tracing::warn!("Vector index creation failed for conversation_entries: {e}");
        }
    }

    Ok(())
}
