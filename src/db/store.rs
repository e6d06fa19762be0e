//! SQLite-backed state store.
//!
//! State is kept as JSON blobs under fixed keys, mirroring a simple keyed
//! blob store: one entry for the host list and one for all series.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use super::StatePersistence;

const HOSTS_KEY: &str = "hosts";
const SERIES_KEY: &str = "series";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create a store that lives only as long as the process.
    pub fn in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM state WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }
}

impl StatePersistence for Store {
    fn load_state(&self) -> Result<Option<Snapshot>, DbError> {
        let hosts = match self.get(HOSTS_KEY)? {
            Some(json) => serde_json::from_str(&json)?,
            None => return Ok(None),
        };
        let series = match self.get(SERIES_KEY)? {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        Ok(Some(Snapshot { hosts, series }))
    }

    fn save_state(&self, snapshot: &Snapshot) -> Result<(), DbError> {
        let hosts = serde_json::to_string(&snapshot.hosts)?;
        let series = serde_json::to_string(&snapshot.series)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            )?;
            stmt.execute(params![HOSTS_KEY, hosts, now])?;
            stmt.execute(params![SERIES_KEY, series, now])?;
        }
        tx.commit()?;
        Ok(())
    }
}
