//! Per-conversation turn log backed by SQLite.
//!
//! Writes are unbounded; callers bound what they read with [`HistoryStore::read_recent`].
//! The schema is versioned through `PRAGMA user_version` so a database written by
//! a newer build is rejected instead of being misread.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::relay::context::{ConversationTurn, Role};

/// Schema version written by this build.
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug)]
pub enum HistoryError {
    Sqlite(rusqlite::Error),
    /// The database was written by a newer schema version.
    UnsupportedSchema { found: i64, supported: i64 },
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "history database error: {e}"),
            Self::UnsupportedSchema { found, supported } => write!(
                f,
                "history database has schema version {found}, this build supports up to {supported}"
            ),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            Self::UnsupportedSchema { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// Conversation history keyed by conversation id.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Create a process-lifetime store.
    pub fn in_memory() -> Result<Self, HistoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open (or create) a store that survives restarts.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!("Failed to create {:?}: {e}", parent);
        }
        let store = Self::from_connection(Connection::open(path)?)?;
        info!("Loaded history from {:?} ({} turns)", path, store.total_turns()?);
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Result<Self, HistoryError> {
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one turn.
    pub fn append(&self, conversation_id: i64, role: Role, text: &str) -> Result<(), HistoryError> {
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO turns (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, role.as_str(), text, created_at],
        )?;
        Ok(())
    }

    /// Full history, oldest first. Empty for unseen conversations.
    pub fn read(&self, conversation_id: i64) -> Result<Vec<ConversationTurn>, HistoryError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT role, content FROM turns WHERE conversation_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        collect_turns(rows)
    }

    /// The last `limit` turns, oldest first.
    pub fn read_recent(&self, conversation_id: i64, limit: usize) -> Result<Vec<ConversationTurn>, HistoryError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT role, content FROM (
                SELECT id, role, content FROM turns
                WHERE conversation_id = ?1
                ORDER BY id DESC
                LIMIT ?2
            ) ORDER BY id ASC",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![conversation_id, limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        collect_turns(rows)
    }

    /// Overwrite the newest turn of a conversation if it is an assistant turn.
    ///
    /// Returns `false` when the conversation does not end with an answer.
    pub fn replace_last_answer(&self, conversation_id: i64, text: &str) -> Result<bool, HistoryError> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let changed = self.conn().execute(
            "UPDATE turns SET content = ?2, created_at = ?3
             WHERE id = (SELECT MAX(id) FROM turns WHERE conversation_id = ?1)
               AND role = ?4",
            params![conversation_id, text, created_at, Role::Assistant.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Remove every turn of one conversation. Returns how many were removed.
    pub fn clear(&self, conversation_id: i64) -> Result<usize, HistoryError> {
        let removed = self
            .conn()
            .execute("DELETE FROM turns WHERE conversation_id = ?1", params![conversation_id])?;
        Ok(removed)
    }

    fn total_turns(&self) -> Result<i64, HistoryError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn init_schema(conn: &Connection) -> Result<(), HistoryError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(HistoryError::UnsupportedSchema { found: version, supported: SCHEMA_VERSION });
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id, id);
        "#,
    )?;

    if version < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    }
    Ok(())
}

fn collect_turns<I>(rows: I) -> Result<Vec<ConversationTurn>, HistoryError>
where
    I: Iterator<Item = rusqlite::Result<(String, String)>>,
{
    let mut turns = Vec::new();
    for row in rows {
        let (role, content) = row?;
        match Role::parse(&role) {
            Some(role) => turns.push(ConversationTurn { role, content }),
            None => warn!("Skipping history row with unknown role {role:?}"),
        }
    }
    Ok(turns)
}
