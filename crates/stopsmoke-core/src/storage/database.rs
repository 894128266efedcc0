//! SQLite-based log storage.
//!
//! Provides persistent storage for:
//! - Logged cigarettes (`cigarette_logs`)
//! - Key-value store for application state (the persisted cooldown)

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, local_day_bounds, migrations, CooldownStore, EventStore, LogEntry};
use crate::cooldown::CooldownState;
use crate::error::{CoreError, DatabaseError, Result};

const COOLDOWN_KEY: &str = "cooldown_state";

/// SQLite database holding the smoking log.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the database at `<data dir>/stopsmoke.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("stopsmoke.db");
        Self::open_at(path)
    }

    /// Open (or create) the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let db = Self {
            conn,
            path: Some(path),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    ///
    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.migrate()?;
        Ok(db)
    }

    /// Location on disk, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn decode_millis(id: i64, millis: i64) -> Result<LogEntry> {
    let occurred_at =
        DateTime::from_timestamp_millis(millis).ok_or_else(|| DatabaseError::Corrupt {
            key: format!("cigarette_logs.{id}"),
            message: format!("timestamp {millis} out of range"),
        })?;
    Ok(LogEntry { id, occurred_at })
}

impl EventStore for Database {
    fn append(&self, occurred_at: DateTime<Utc>) -> Result<LogEntry> {
        let millis = occurred_at.timestamp_millis();
        self.conn.execute(
            "INSERT INTO cigarette_logs (occurred_at) VALUES (?1)",
            params![millis],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(id, millis, "appended log entry");
        decode_millis(id, millis)
    }

    fn query_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, occurred_at FROM cigarette_logs
             WHERE occurred_at BETWEEN ?1 AND ?2
             ORDER BY occurred_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![start.timestamp_millis(), end.timestamp_millis()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, millis) = row?;
            entries.push(decode_millis(id, millis)?);
        }
        Ok(entries)
    }

    fn earliest(&self) -> Result<Option<LogEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, occurred_at FROM cigarette_logs
                 ORDER BY occurred_at ASC, id ASC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        row.map(|(id, millis)| decode_millis(id, millis)).transpose()
    }

    fn clear_all(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute("DELETE FROM cigarette_logs", [])?;
        tx.execute("DELETE FROM kv WHERE key = ?1", params![COOLDOWN_KEY])?;
        tx.commit()?;
        tracing::info!(removed, "cleared smoking history");
        Ok(())
    }

    fn count_on(&self, day: NaiveDate) -> Result<usize> {
        let (start, end) = local_day_bounds(day);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cigarette_logs WHERE occurred_at BETWEEN ?1 AND ?2",
            params![start.timestamp_millis(), end.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl CooldownStore for Database {
    fn load_cooldown(&self) -> Result<Option<CooldownState>> {
        match self.kv_get(COOLDOWN_KEY)? {
            Some(json) => {
                let state = serde_json::from_str(&json).map_err(|e| {
                    CoreError::from(DatabaseError::Corrupt {
                        key: COOLDOWN_KEY.into(),
                        message: e.to_string(),
                    })
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    fn save_cooldown(&self, state: &CooldownState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.kv_set(COOLDOWN_KEY, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn append_and_query() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let first = db.append(now - Duration::minutes(10)).unwrap();
        let second = db.append(now).unwrap();
        assert_ne!(first.id, second.id);

        let entries = db
            .query_between(now - Duration::hours(1), now)
            .unwrap();
        assert_eq!(entries, vec![first, second]);
    }

    #[test]
    fn query_orders_by_time_not_insertion() {
        let db = Database::open_memory().unwrap();
        let now = Utc::now();
        let late = db.append(now).unwrap();
        let early = db.append(now - Duration::minutes(5)).unwrap();
        let entries = db.query_between(now - Duration::hours(1), now).unwrap();
        assert_eq!(entries, vec![early, late]);
    }

    #[test]
    fn earliest_is_none_on_empty_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.earliest().unwrap().is_none());
        let now = Utc::now();
        db.append(now).unwrap();
        let first = db.append(now - Duration::days(3)).unwrap();
        assert_eq!(db.earliest().unwrap(), Some(first));
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().as_deref(), Some("hello"));
        db.kv_set("test", "again").unwrap();
        assert_eq!(db.kv_get("test").unwrap().as_deref(), Some("again"));
    }

    #[test]
    fn cooldown_roundtrip_and_clear() {
        let db = Database::open_memory().unwrap();
        assert!(db.load_cooldown().unwrap().is_none());

        let now = crate::storage::truncate_to_millis(Utc::now());
        let state = CooldownState {
            next_eligible_at: Some(now + Duration::minutes(72)),
            last_logged_at: Some(now),
        };
        db.save_cooldown(&state).unwrap();
        assert_eq!(db.load_cooldown().unwrap(), Some(state));

        db.append(now).unwrap();
        db.clear_all().unwrap();
        assert!(db.load_cooldown().unwrap().is_none());
        assert!(db.earliest().unwrap().is_none());
    }

    #[test]
    fn corrupt_cooldown_is_a_storage_failure() {
        let db = Database::open_memory().unwrap();
        db.kv_set(COOLDOWN_KEY, "not json").unwrap();
        let err = db.load_cooldown().unwrap_err();
        assert!(err.is_storage_failure());
    }
}
