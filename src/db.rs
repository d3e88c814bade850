// SQLite persistence for the canonical game state.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// Fixed key the full game state is stored under. Versionless: the value is
/// the same JSON shape as the broadcast payload and the export file.
pub const STATE_KEY: &str = "royal-rumble-state";

/// SQLite-backed key-value store for serialized game state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral in-memory database
    /// (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS game_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Persist a JSON value under `key`. Uses INSERT OR REPLACE so repeated
    /// saves overwrite the previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str = serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO game_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`. Returns `None` if the
    /// key does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM game_state WHERE key = ?1")
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query game state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value: serde_json::Value = serde_json::from_str(&json_str)
                    .context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Delete the stored value under `key`, if any. Used by game reset.
    pub fn clear_state(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM game_state WHERE key = ?1", params![key])
            .context("failed to clear state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db() -> Database {
        Database::open(":memory:").unwrap()
    }

    #[test]
    fn missing_key_loads_none() {
        assert!(db().load_state(STATE_KEY).unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let db = db();
        let value = json!({"totalPicks": 4, "isDrafting": false});
        db.save_state(STATE_KEY, &value).unwrap();
        assert_eq!(db.load_state(STATE_KEY).unwrap(), Some(value));
    }

    #[test]
    fn save_overwrites_previous_value() {
        let db = db();
        db.save_state(STATE_KEY, &json!({"totalPicks": 1})).unwrap();
        db.save_state(STATE_KEY, &json!({"totalPicks": 2})).unwrap();
        let loaded = db.load_state(STATE_KEY).unwrap().unwrap();
        assert_eq!(loaded["totalPicks"], 2);
    }

    #[test]
    fn clear_removes_the_record() {
        let db = db();
        db.save_state(STATE_KEY, &json!({})).unwrap();
        db.clear_state(STATE_KEY).unwrap();
        assert!(db.load_state(STATE_KEY).unwrap().is_none());
        // Clearing an absent key is fine too.
        db.clear_state(STATE_KEY).unwrap();
    }

    #[test]
    fn keys_are_independent() {
        let db = db();
        db.save_state("a", &json!(1)).unwrap();
        db.save_state("b", &json!(2)).unwrap();
        db.clear_state("a").unwrap();
        assert!(db.load_state("a").unwrap().is_none());
        assert_eq!(db.load_state("b").unwrap(), Some(json!(2)));
    }
}
