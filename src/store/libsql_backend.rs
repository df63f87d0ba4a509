//! libSQL backend — async `ConversationStore` implementation.
//!
//! Supports local file, in-memory and remote (libsql:// / https://)
//! databases through the same connection type.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ConversationRecord, ConversationStore, NewConversationRecord, SortOrder,
};

const RECORD_COLUMNS: &str = "id, user_id, username, message, bot_reply, timestamp";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use,
/// so the relay loop and the web routes share one backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open whichever database the configuration points at.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        match config {
            DatabaseConfig::Local(path) => Self::new_local(path).await,
            DatabaseConfig::Remote { url, auth_token } => {
                use secrecy::ExposeSecret;
                Self::new_remote(url, auth_token.expose_secret()).await
            }
        }
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Connect to a remote libSQL server and run migrations.
    pub async fn new_remote(url: &str, auth_token: &str) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect to {url}: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(url, "Remote database connected");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Map a libsql Row (in `RECORD_COLUMNS` order) to a ConversationRecord.
fn row_to_record(row: &libsql::Row) -> Result<ConversationRecord, libsql::Error> {
    let timestamp: String = row.get(5)?;
    Ok(ConversationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        message: row.get(3)?,
        bot_reply: row.get(4)?,
        timestamp: parse_datetime(&timestamp),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ConversationStore for LibSqlBackend {
    async fn append(&self, record: &NewConversationRecord) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO messages (user_id, username, message, bot_reply, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING id",
                params![
                    record.user_id.as_str(),
                    record.username.as_str(),
                    record.message.as_str(),
                    record.bot_reply.as_str(),
                    format_datetime(&record.timestamp),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("append: {e}")))?
            .ok_or_else(|| DatabaseError::Query("append: no id returned".to_string()))?;
        let id: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("append: {e}")))?;

        debug!(id, user_id = %record.user_id, "Conversation record appended");
        Ok(id)
    }

    async fn list(
        &self,
        limit: Option<usize>,
        order: SortOrder,
    ) -> Result<Vec<ConversationRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM messages ORDER BY id {}",
            order.as_sql()
        );
        let mut rows = match limit {
            Some(limit) => {
                self.conn()
                    .query(&format!("{sql} LIMIT ?1"), params![limit as i64])
                    .await
            }
            None => self.conn().query(&sql, ()).await,
        }
        .map_err(|e| DatabaseError::Query(format!("list: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list: {e}")))?
        {
            let record =
                row_to_record(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT COUNT(*) FROM messages", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count: {e}")))?
        {
            Some(row) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("count: {e}")))?;
                Ok(count as u64)
            }
            None => Ok(0),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
