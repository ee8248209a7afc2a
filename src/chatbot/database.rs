//! Persistent SQLite database for settings and conversation history.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::chatbot::message::Message;

#[derive(Debug)]
pub enum DatabaseError {
    Sqlite(rusqlite::Error),
    /// A stored history row is not a valid message array.
    Json { thread_id: String, source: serde_json::Error },
    /// Another thread panicked while holding the connection.
    Poisoned,
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "sqlite error: {e}"),
            Self::Json { thread_id, source } => {
                write!(f, "bad history for thread '{thread_id}': {source}")
            }
            Self::Poisoned => write!(f, "database connection lock poisoned"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(e) => Some(e),
            Self::Json { source, .. } => Some(source),
            Self::Poisoned => None,
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// Settings rows plus one history row per conversation, each overwritten in place.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let db = Self::init(Connection::open(path)?)?;
        let (settings, threads) = db.counts()?;
        info!("Loaded database from {:?} ({} settings, {} threads)", path, settings, threads);
        Ok(db)
    }

    fn init(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS history (
                thread_id TEXT PRIMARY KEY,
                messages TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    fn counts(&self) -> Result<(usize, usize), DatabaseError> {
        let conn = self.conn()?;
        let settings: i64 = conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?;
        let threads: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok((settings as usize, threads as usize))
    }

    // ==================== SETTINGS ====================

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Last writer wins.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        debug!("Setting {} = {}", key, value);
        Ok(())
    }

    // ==================== HISTORY ====================

    pub fn load_history(&self, thread_id: &str) -> Result<Option<Vec<Message>>, DatabaseError> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT messages FROM history WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|source| DatabaseError::Json {
                thread_id: thread_id.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Replace the whole history row in a single statement.
    pub fn save_history(&self, thread_id: &str, messages: &[Message]) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(messages).map_err(|source| DatabaseError::Json {
            thread_id: thread_id.to_string(),
            source,
        })?;
        let updated_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO history (thread_id, messages, updated_at) VALUES (?1, ?2, ?3)",
            params![thread_id, json, updated_at],
        )?;
        Ok(())
    }

    /// Returns whether a row existed.
    pub fn delete_history(&self, thread_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM history WHERE thread_id = ?1", params![thread_id])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_roundtrip_and_overwrite() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get_setting("ai_channel").unwrap(), None);

        db.set_setting("ai_channel", "1").unwrap();
        db.set_setting("ai_channel", "2").unwrap();
        assert_eq!(db.get_setting("ai_channel").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_history_row_is_replaced() {
        let db = Database::in_memory().unwrap();
        db.save_history("t1", &[Message::system("s"), Message::user("a")]).unwrap();
        db.save_history("t1", &[Message::system("s")]).unwrap();

        assert_eq!(db.load_history("t1").unwrap(), Some(vec![Message::system("s")]));
        assert_eq!(db.load_history("t2").unwrap(), None);
    }

    #[test]
    fn test_corrupt_history_is_reported() {
        let db = Database::in_memory().unwrap();
        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO history (thread_id, messages, updated_at) VALUES ('t', 'nope', '')",
                [],
            )
            .unwrap();

        let err = db.load_history("t").unwrap_err();
        assert!(matches!(err, DatabaseError::Json { .. }));
        assert!(err.to_string().contains("'t'"));
    }

    #[test]
    fn test_delete_history() {
        let db = Database::in_memory().unwrap();
        db.save_history("t", &[Message::system("s")]).unwrap();
        assert!(db.delete_history("t").unwrap());
        assert!(!db.delete_history("t").unwrap());
        assert_eq!(db.load_history("t").unwrap(), None);
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");

        Database::open(&path).unwrap().set_setting("k", "v").unwrap();
        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.get_setting("k").unwrap().as_deref(), Some("v"));
    }
}
