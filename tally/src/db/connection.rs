use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
const SYNCHRONOUS_MODES: &[&str] = &["OFF", "NORMAL", "FULL", "EXTRA"];

/// Where the payments database lives, decided from `DATABASE_URL`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Memory,
    Local(String),
    Remote { url: String, token: String },
    /// Local file kept in sync with a remote primary.
    Replica { path: String, url: String, token: String },
}

impl Location {
    fn from_config(config: &DatabaseConfig) -> Self {
        let url = config.url.as_str();
        if url.starts_with("libsql://") || url.starts_with("https://") {
            let token = config.auth_token.clone().unwrap_or_default();
            return match &config.local_path {
                Some(path) => Self::Replica {
                    path: path.clone(),
                    url: url.to_string(),
                    token,
                },
                None => Self::Remote {
                    url: url.to_string(),
                    token,
                },
            };
        }
        if url == ":memory:" {
            return Self::Memory;
        }
        Self::Local(url.strip_prefix("file:").unwrap_or(url).to_string())
    }

    async fn open(self) -> Result<libsql::Database> {
        let db = match self {
            Self::Memory => Builder::new_local(":memory:").build().await?,
            Self::Local(path) => Builder::new_local(path).build().await?,
            Self::Remote { url, token } => Builder::new_remote(url, token).build().await?,
            Self::Replica { path, url, token } => {
                Builder::new_remote_replica(path, url, token).build().await?
            }
        };
        Ok(db)
    }
}

/// Shared handle to the payments database. Cheap to clone; each repository
/// call opens its own connection.
#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
    pragmas: Arc<Vec<(&'static str, String)>>,
}

impl Database {
    /// Open the database, apply pragmas and create the schema for
    /// `dimensions`-wide embeddings.
    pub async fn new(config: &DatabaseConfig, dimensions: usize) -> Result<Self> {
        let location = Location::from_config(config);
        tracing::debug!(?location, "Opening database");

        let pragmas = vec![
            ("busy_timeout", config.busy_timeout_ms.to_string()),
            (
                "journal_mode",
                pick(&config.journal_mode, JOURNAL_MODES, "WAL").to_string(),
            ),
            (
                "synchronous",
                pick(&config.synchronous, SYNCHRONOUS_MODES, "NORMAL").to_string(),
            ),
        ];

        let database = Self {
            db: Arc::new(location.open().await?),
            pragmas: Arc::new(pragmas),
        };

        let conn = database.connect()?;
        database.apply_pragmas(&conn).await;
        schema::init_schema(&conn, dimensions).await?;

        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    /// Pragmas are tuning only; a remote primary may reject them.
    async fn apply_pragmas(&self, conn: &Connection) {
        for (name, value) in self.pragmas.iter() {
            if let Err(error) = conn.execute_batch(&format!("PRAGMA {name} = {value}")).await {
                tracing::warn!(pragma = name, value = %value, error = %error, "Failed to set pragma");
            }
        }
    }

    /// Pull from the primary when running as an embedded replica. Purely
    /// local databases report an error here, which is ignored.
    pub async fn sync(&self) {
        match self.db.sync().await {
            Ok(sync) => tracing::info!("Database synced: {:?}", sync),
            Err(e) => tracing::debug!("Database sync skipped: {e}"),
        }
    }
}

/// `value` uppercased if it is one of `allowed`, else `default`.
fn pick(value: &str, allowed: &[&'static str], default: &'static str) -> &'static str {
    let wanted = value.trim().to_uppercase();
    allowed
        .iter()
        .copied()
        .find(|mode| *mode == wanted)
        .unwrap_or(default)
}
