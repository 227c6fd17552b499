//! SQLite database for knowledge base records
//!
//! Status changes are single guarded `UPDATE` statements, so a record can
//! never be moved along an edge the state machine does not allow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{KnowledgeBase, KnowledgeBaseStatus, NewKnowledgeBase, StatusCounts};

use super::repository::KnowledgeBaseRepository;

const COLUMNS: &str = "id, widget_id, source_key, media_type, status, chunk_count, \
                       vector_ids, error_message, processed_at, created_at, updated_at";

/// SQLite-based knowledge base store
pub struct SqliteKnowledgeBaseStore {
    conn: Mutex<Connection>,
}

impl SqliteKnowledgeBaseStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_bases (
                id TEXT PRIMARY KEY,
                widget_id TEXT NOT NULL,
                source_key TEXT NOT NULL,
                media_type TEXT NOT NULL,
                status TEXT NOT NULL,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                vector_ids TEXT NOT NULL DEFAULT '[]',
                error_message TEXT,
                processed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_knowledge_bases_widget_status
                ON knowledge_bases(widget_id, status);
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }

    fn fetch(conn: &Connection, id: Uuid) -> Result<Option<KnowledgeBase>> {
        let sql = format!("SELECT {} FROM knowledge_bases WHERE id = ?1", COLUMNS);
        let record = conn
            .query_row(&sql, params![id.to_string()], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Explain why a guarded update touched no row
    fn rejected(conn: &Connection, id: Uuid, to: KnowledgeBaseStatus) -> Error {
        match Self::fetch(conn, id) {
            Ok(Some(current)) => Error::InvalidTransition {
                id,
                from: current.status,
                to,
            },
            Ok(None) => Error::KnowledgeBaseNotFound(id),
            Err(e) => e,
        }
    }

    /// Run a guarded transition to `to` and return the updated record
    fn transition(
        &self,
        id: Uuid,
        to: KnowledgeBaseStatus,
        assignments: &str,
        values: &[&dyn rusqlite::ToSql],
    ) -> Result<KnowledgeBase> {
        let allowed = KnowledgeBaseStatus::sources_of(to)
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE knowledge_bases SET status = ?1, updated_at = ?2, {} \
             WHERE id = ?3 AND status IN ({})",
            assignments, allowed
        );

        let now = Utc::now().to_rfc3339();
        let id_str = id.to_string();
        let status = to.as_str();
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&status, &now, &id_str];
        bound.extend_from_slice(values);

        let conn = self.conn.lock();
        let changed = conn.execute(&sql, bound.as_slice())?;
        if changed == 0 {
            return Err(Self::rejected(&conn, id, to));
        }

        tracing::info!("Knowledge base {} -> {}", id, to);
        Self::fetch(&conn, id)?.ok_or(Error::KnowledgeBaseNotFound(id))
    }
}

#[async_trait]
impl KnowledgeBaseRepository for SqliteKnowledgeBaseStore {
    async fn create(&self, new: NewKnowledgeBase) -> Result<KnowledgeBase> {
        let record = new.into_record();
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO knowledge_bases (
                id, widget_id, source_key, media_type, status, chunk_count,
                vector_ids, error_message, processed_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, '[]', NULL, NULL, ?6, ?7)
            "#,
            params![
                record.id.to_string(),
                record.widget_id,
                record.source_key,
                record.media_type,
                record.status.as_str(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::InvalidInput(format!("Knowledge base {} already exists", record.id))
            }
            other => Error::from(other),
        })?;

        tracing::info!(
            "Registered knowledge base {} for widget {} ({})",
            record.id,
            record.widget_id,
            record.source_key
        );
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<KnowledgeBase>> {
        let conn = self.conn.lock();
        Self::fetch(&conn, id)
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        source_key: &str,
        media_type: &str,
    ) -> Result<KnowledgeBase> {
        self.transition(
            id,
            KnowledgeBaseStatus::Processing,
            "source_key = ?4, media_type = ?5, chunk_count = 0, vector_ids = '[]', \
             error_message = NULL, processed_at = NULL",
            &[&source_key, &media_type],
        )
    }

    async fn mark_completed(&self, id: Uuid, vector_ids: &[Uuid]) -> Result<KnowledgeBase> {
        let ids_json = serde_json::to_string(vector_ids)?;
        let chunk_count = vector_ids.len() as i64;
        let processed_at = Utc::now().to_rfc3339();
        self.transition(
            id,
            KnowledgeBaseStatus::Completed,
            "chunk_count = ?4, vector_ids = ?5, error_message = NULL, processed_at = ?6",
            &[&chunk_count, &ids_json, &processed_at],
        )
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<KnowledgeBase> {
        self.transition(
            id,
            KnowledgeBaseStatus::Failed,
            "chunk_count = 0, vector_ids = '[]', error_message = ?4, processed_at = NULL",
            &[&message],
        )
    }

    async fn list_completed_ids(&self, widget_id: &str) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id FROM knowledge_bases WHERE widget_id = ?1 AND status = ?2 \
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(
            params![widget_id, KnowledgeBaseStatus::Completed.as_str()],
            |row| row.get::<_, String>(0),
        )?;

        let mut ids = Vec::new();
        for row in rows {
            let raw = row?;
            let id = Uuid::parse_str(&raw)
                .map_err(|e| Error::Database(format!("Bad id '{}': {}", raw, e)))?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn list_by_widget(&self, widget_id: &str) -> Result<Vec<KnowledgeBase>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM knowledge_bases WHERE widget_id = ?1 ORDER BY created_at",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![widget_id], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn status_counts(&self, widget_id: &str) -> Result<StatusCounts> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM knowledge_bases WHERE widget_id = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map(params![widget_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) = row?;
            counts.add(KnowledgeBaseStatus::from_str(&status)?, n as u64);
        }
        Ok(counts)
    }
}

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn parse_time(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeBase> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(4)?;
    let chunk_count: i64 = row.get(5)?;
    let vector_ids_json: String = row.get(6)?;
    let processed_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(KnowledgeBase {
        id: Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?,
        widget_id: row.get(1)?,
        source_key: row.get(2)?,
        media_type: row.get(3)?,
        status: KnowledgeBaseStatus::from_str(&status_str).map_err(|e| conversion_error(4, e))?,
        chunk_count: chunk_count as u32,
        vector_ids: serde_json::from_str(&vector_ids_json).map_err(|e| conversion_error(6, e))?,
        error_message: row.get(7)?,
        processed_at: processed_at.as_deref().map(|s| parse_time(8, s)).transpose()?,
        created_at: parse_time(9, &created_at)?,
        updated_at: parse_time(10, &updated_at)?,
    })
}
