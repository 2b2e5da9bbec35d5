use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{IndexEntry, VectorHit};

pub struct EntryRepository;

impl EntryRepository {
    pub async fn upsert(conn: &Connection, entry: &IndexEntry) -> Result<()> {
        let embedding_json = serde_json::to_string(&entry.embedding)?;

        conn.execute(
            r#"
            INSERT INTO conversation_entries (
                id, user_id, session_id, kind, content, payload, embedding, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, vector32(?7), ?8)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                payload = excluded.payload,
                embedding = excluded.embedding
            "#,
            params![
                entry.id.clone(),
                entry.user_id.clone(),
                entry.session_id.clone(),
                entry.kind.to_string(),
                entry.content.clone(),
                serde_json::to_string(&entry.payload)?,
                embedding_json,
                entry.created_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn search_similar(
        conn: &Connection,
        embedding: &[f32],
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let embedding_json = serde_json::to_string(embedding)?;

        let mut rows = conn
            .query(
                r#"
                SELECT e.id, e.user_id, e.kind, e.content, e.payload, e.created_at,
                       1 - vector_distance_cos(e.embedding, vector32(?1)) as score
                FROM conversation_entries e
                WHERE e.user_id = ?2
                  AND e.embedding IS NOT NULL
                ORDER BY score DESC
                LIMIT ?3
                "#,
                params![embedding_json, user_id, limit as i64],
            )
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next().await? {
            hits.push(Self::row_to_hit(&row)?);
        }

        Ok(hits)
    }

    fn row_to_hit(row: &libsql::Row) -> Result<VectorHit> {
        Ok(VectorHit {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get::<String>(2)?.parse().unwrap_or(crate::models::EntryKind::Turn),
            content: row.get(3)?,
            payload: serde_json::from_str(&row.get::<String>(4)?).unwrap_or_default(),
            created_at: DateTime::parse_from_rfc3339(&row.get::<String>(5)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            score: row.get::<f64>(6)? as f32,
        })
    }
}
