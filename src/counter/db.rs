//! Counter store - persistence sink for flushed deltas
//!
//! The store is an append-only ledger: every flush inserts one row per
//! channel whose `cumul` column is the channel's previous maximum plus the
//! new delta. The running total is therefore derivable at any time without
//! a mutable counter row.
//!
//! Connections are acquired per flush cycle and closed at its end.

use super::channels::ChannelId;
use crate::config::StoreConfig;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Schema applied on every connect (all statements are IF NOT EXISTS)
pub const SCHEMA_SQL: &str = include_str!("../../sql/01_counter_value.sql");

const UPSERT_DELTA_SQL: &str = "INSERT INTO counter_value (counter_id, value, cumul, recorded_at)
     SELECT ?1, ?2, COALESCE(MAX(cumul), 0) + ?2, ?3 FROM counter_value WHERE counter_id = ?1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach or open the store
    Connect(String),
    /// A query failed
    Database(String),
    /// Delta does not fit the store's integer type
    Overflow(u64),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Connect(e) => write!(f, "can't connect to store: {}", e),
            StoreError::Database(e) => write!(f, "database error: {}", e),
            StoreError::Overflow(v) => write!(f, "delta {} exceeds store range", v),
        }
    }
}

impl std::error::Error for StoreError {}

/// Factory for per-cycle store connections
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// One open connection, used for a single flush cycle
#[async_trait]
pub trait StoreConnection: Send {
    /// Append a ledger row: `cumul = MAX(cumul of channel, 0) + delta`
    async fn upsert_delta(&mut self, channel: ChannelId, delta: u64) -> Result<(), StoreError>;

    /// Release the connection
    async fn close(self: Box<Self>) -> Result<(), StoreError>;
}

/// One ledger row as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub counter_id: u8,
    pub value: i64,
    pub cumul: i64,
    pub recorded_at: i64,
}

/// SQLite implementation of CounterStore
///
/// SQLite has no server, so host, user and password are only kept for log
/// output; `database` is the path of the database file.
pub struct SqliteCounterStore {
    path: PathBuf,
    host: String,
    user: String,
}

impl SqliteCounterStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: PathBuf::from(&config.database),
            host: config.host.clone(),
            user: config.user.clone(),
        }
    }

    /// Store backed by a file path directly (tests, tools)
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            host: "localhost".to_string(),
            user: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connect(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| StoreError::Connect(format!("{}: {}", self.path.display(), e)))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(conn)
    }

    /// Latest cumulative total for a channel (0 when it has no rows)
    pub fn latest_total(&self, channel: ChannelId) -> Result<i64, StoreError> {
        let conn = self.open()?;
        let total: Option<i64> = conn
            .query_row(
                "SELECT MAX(cumul) FROM counter_value WHERE counter_id = ?1",
                params![channel.get()],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(total.unwrap_or(0))
    }

    /// All rows of a channel in insertion order
    pub fn rows(&self, channel: ChannelId) -> Result<Vec<LedgerRow>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT counter_id, value, cumul, recorded_at FROM counter_value
             WHERE counter_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![channel.get()], |row| {
                Ok(LedgerRow {
                    counter_id: row.get(0)?,
                    value: row.get(1)?,
                    cumul: row.get(2)?,
                    recorded_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let conn = self.open()?;
        log::debug!(
            "connected to {} as {}@{}",
            self.path.display(),
            self.user,
            self.host
        );
        Ok(Box::new(SqliteConnection { conn }))
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

struct SqliteConnection {
    conn: Connection,
}

#[async_trait]
impl StoreConnection for SqliteConnection {
    async fn upsert_delta(&mut self, channel: ChannelId, delta: u64) -> Result<(), StoreError> {
        let delta = i64::try_from(delta).map_err(|_| StoreError::Overflow(delta))?;
        let now = chrono::Utc::now().timestamp();
        self.conn
            .execute(UPSERT_DELTA_SQL, params![channel.get(), delta, now])?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::from(e))
    }
}
