//! SQLite-backed transcript persistence.
//!
//! Each transcript is upserted by utterance id, so a worker retrying or a
//! reconnecting deployment can never duplicate a record.

use std::path::{Path, PathBuf};

use chrono::Utc;
use cirrus_core::{CirrusError, TranscriptStore};
use rusqlite::{params, Connection};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, CirrusError> {
        let store = Self {
            db_path: db_path.into(),
        };
        if let Some(parent) = store.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        store.init_schema()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, CirrusError> {
        Connection::open(&self.db_path).map_err(|e| CirrusError::Storage(e.to_string()))
    }

    fn init_schema(&self) -> Result<(), CirrusError> {
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS transcripts (
              collection TEXT NOT NULL,
              id TEXT NOT NULL,
              text TEXT NOT NULL,
              created_at INTEGER NOT NULL,
              updated_at INTEGER NOT NULL,
              PRIMARY KEY (collection, id)
            );
            "#,
        )
        .map_err(|e| CirrusError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Transcript count for one collection, newest-first listing support.
    pub fn count(&self, collection: &str) -> Result<usize, CirrusError> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT COUNT(*) FROM transcripts WHERE collection = ?1",
            params![collection],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(|e| CirrusError::Storage(e.to_string()))
    }

    pub fn fetch(&self, collection: &str, id: &str) -> Result<Option<String>, CirrusError> {
        let conn = self.open()?;
        match conn.query_row(
            "SELECT text FROM transcripts WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(text) => Ok(Some(text)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CirrusError::Storage(e.to_string())),
        }
    }
}

impl TranscriptStore for SqliteStore {
    fn upsert(&self, collection: &str, id: &str, text: &str) -> Result<(), CirrusError> {
        let now = Utc::now().timestamp_millis();
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO transcripts (collection, id, text, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(collection, id) DO UPDATE SET
                text = excluded.text,
                updated_at = excluded.updated_at
            "#,
            params![collection, id, text, now],
        )
        .map_err(|e| CirrusError::Storage(e.to_string()))?;
        Ok(())
    }
}
