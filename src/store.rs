//! # Durable Key-Value Store
//!
//! Whole-value get/replace/remove storage. The tracker only ever reads or
//! replaces complete records, so last writer wins and no locking beyond the
//! backend's own is needed.
//!
//! Two keys are used: a single-slot crash snapshot and the list of saved
//! sessions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::StorageError;

/// Single-slot crash snapshot.
pub const BACKUP_KEY: &str = "route_backup";

/// JSON array of saved sessions.
pub const SESSIONS_KEY: &str = "sessions";

/// Default size limit of [`MemoryStore`], matching browser local storage.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Durable string storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value under `key`. May fail when the store is full.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store with a byte quota over keys plus values.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes,
        }
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.lock()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave a half-written value
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.lock();
        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        let needed = others + key.len() + value.len();
        if needed > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed,
                limit: self.quota_bytes,
            });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// SQLite store
// ============================================================================

#[cfg(feature = "persistence")]
pub use sqlite::SqliteStore;

#[cfg(feature = "persistence")]
mod sqlite {
    use std::sync::{Mutex, MutexGuard};

    use rusqlite::{params, Connection, OptionalExtension};

    use super::KeyValueStore;
    use crate::StorageError;

    /// Durable store backed by a single SQLite table.
    pub struct SqliteStore {
        db: Mutex<Connection>,
    }

    impl SqliteStore {
        /// Open (or create) the database at `db_path`.
        pub fn new(db_path: &str) -> Result<Self, StorageError> {
            let db = Connection::open(db_path)?;
            Self::init_schema(&db)?;
            Ok(Self { db: Mutex::new(db) })
        }

        /// Create an in-memory database (for testing).
        pub fn in_memory() -> Result<Self, StorageError> {
            Self::new(":memory:")
        }

        fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
                );
                "#,
            )
        }

        fn conn(&self) -> MutexGuard<'_, Connection> {
            self.db
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    impl KeyValueStore for SqliteStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            let value = self
                .conn()
                .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()?;
            Ok(value)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.conn().execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at)
                 VALUES (?, ?, strftime('%s', 'now'))",
                params![key, value],
            )?;
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.conn()
                .execute("DELETE FROM kv WHERE key = ?", params![key])?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);

        store.set(SESSIONS_KEY, "[]").unwrap();
        assert_eq!(store.get(SESSIONS_KEY).unwrap().as_deref(), Some("[]"));

        store.set(SESSIONS_KEY, "[1]").unwrap();
        assert_eq!(store.get(SESSIONS_KEY).unwrap().as_deref(), Some("[1]"));

        store.remove(SESSIONS_KEY).unwrap();
        assert_eq!(store.get(SESSIONS_KEY).unwrap(), None);
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(20);
        store.set("a", "0123456789").unwrap();

        let err = store.set("b", "0123456789").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 20, .. }));
        assert_eq!(store.get("b").unwrap(), None);

        // Replacing a value only counts the new size
        store.set("a", "0123456789abcdef").unwrap();
        assert_eq!(store.used_bytes(), 17);
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_sqlite_store_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get(BACKUP_KEY).unwrap(), None);

        store.set(BACKUP_KEY, r#"{"a":1}"#).unwrap();
        store.set(BACKUP_KEY, r#"{"a":2}"#).unwrap();
        assert_eq!(store.get(BACKUP_KEY).unwrap().as_deref(), Some(r#"{"a":2}"#));

        store.remove(BACKUP_KEY).unwrap();
        assert_eq!(store.get(BACKUP_KEY).unwrap(), None);
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_sqlite_store_survives_reopen() {
        let tmp_dir = tempfile::TempDir::new().unwrap();
        let db_path = tmp_dir.path().join("tracker.db");
        let db_path = db_path.to_str().unwrap();

        {
            let store = SqliteStore::new(db_path).unwrap();
            store.set(SESSIONS_KEY, "[]").unwrap();
        }

        let reopened = SqliteStore::new(db_path).unwrap();
        assert_eq!(reopened.get(SESSIONS_KEY).unwrap().as_deref(), Some("[]"));
    }
}
