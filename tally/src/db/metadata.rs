use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;

/// Key/value facts about the database itself, kept in `tally_meta`.
pub struct MetadataRepository;

impl MetadataRepository {
    const EMBEDDING_DIMENSIONS: &'static str = "embedding_dimensions";

    /// Width of the vectors the entry index was created for, if recorded.
    pub async fn embedding_dimensions(conn: &Connection) -> Result<Option<usize>> {
        let value = Self::read(conn, Self::EMBEDDING_DIMENSIONS).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    pub async fn record_embedding_dimensions(conn: &Connection, dimensions: usize) -> Result<()> {
        Self::write(conn, Self::EMBEDDING_DIMENSIONS, &dimensions.to_string()).await
    }

    async fn read(conn: &Connection, key: &str) -> Result<Option<String>> {
        let mut rows = conn
            .query("SELECT value FROM tally_meta WHERE key = ?1", params![key])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn write(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO tally_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .await?;
        Ok(())
    }
}
