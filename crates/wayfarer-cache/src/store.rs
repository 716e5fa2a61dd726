//! SQLite-backed TTL cache shared by all fetchers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use wayfarer_core::{Clock, FetchError, SystemClock};

use crate::namespace::{Namespace, NamespacePolicies};

/// Default retention for stale-tolerant reads when none is configured.
const DEFAULT_RETENTION: Duration = Duration::from_secs(72 * 3600);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CacheError> for FetchError {
    fn from(e: CacheError) -> Self {
        FetchError::Storage(e.to_string())
    }
}

/// Namespaced key/value store with per-entry TTL.
///
/// Reads and writes are serialized through one connection lock, so a `set`
/// followed by a `get` always observes the write. Public methods never fail:
/// storage errors are logged and surface as a miss or a no-op.
#[derive(Debug)]
pub struct CacheStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    policies: NamespacePolicies,
    retention: Duration,
}

struct Row {
    value: String,
    written_at: i64,
    ttl_ms: i64,
}

impl CacheStore {
    /// Open (or create) a cache database at the given path.
    pub fn open<P: AsRef<Path>>(path: P, policies: NamespacePolicies) -> Result<Self, CacheError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, policies)
    }

    /// Create an in-memory cache (tests and ephemeral sessions).
    pub fn in_memory(policies: NamespacePolicies) -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, policies)
    }

    fn with_connection(conn: Connection, policies: NamespacePolicies) -> Result<Self, CacheError> {
        let store = Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
            policies,
            retention: DEFAULT_RETENTION,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// How long expired entries are kept around for stale-tolerant reads.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn policies(&self) -> &NamespacePolicies {
        &self.policies
    }

    pub fn ttl(&self, namespace: Namespace) -> Duration {
        self.policies.ttl(namespace)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                written_at INTEGER NOT NULL,
                ttl_ms INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_written ON cache_entries(namespace, written_at);
            "#,
        )?;
        Ok(())
    }

    /// Fresh read: hit only while `now - written_at <= ttl`.
    pub fn get<T: DeserializeOwned>(&self, namespace: Namespace, key: &str) -> Option<T> {
        self.read(namespace, key, None)
            .unwrap_or_else(|e| {
                tracing::warn!("Cache read failed for {}/{}: {}", namespace, key, e);
                None
            })
    }

    /// Stale-tolerant read used while offline or throttled.
    ///
    /// Hit while the entry is no older than `max(ttl, retention)`.
    pub fn get_stale<T: DeserializeOwned>(&self, namespace: Namespace, key: &str) -> Option<T> {
        self.read(namespace, key, Some(self.retention))
            .unwrap_or_else(|e| {
                tracing::warn!("Stale cache read failed for {}/{}: {}", namespace, key, e);
                None
            })
    }

    /// Upsert a value; overwriting resets its age.
    pub fn set<T: Serialize>(&self, namespace: Namespace, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.write(namespace, key, value, ttl) {
            tracing::warn!("Cache write failed for {}/{}: {}", namespace, key, e);
        }
    }

    pub fn remove(&self, namespace: Namespace, key: &str) {
        let result = self.conn.lock().execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
            params![namespace.as_str(), key],
        );
        if let Err(e) = result {
            tracing::warn!("Cache remove failed for {}/{}: {}", namespace, key, e);
        }
    }

    pub fn clear_namespace(&self, namespace: Namespace) {
        let result = self.conn.lock().execute(
            "DELETE FROM cache_entries WHERE namespace = ?1",
            params![namespace.as_str()],
        );
        match result {
            Ok(n) => tracing::debug!("Cleared {} entries from {}", n, namespace),
            Err(e) => tracing::warn!("Cache clear failed for {}: {}", namespace, e),
        }
    }

    /// Keys in a namespace, oldest first. Includes expired entries not yet evicted.
    pub fn list_keys(&self, namespace: Namespace) -> Vec<String> {
        self.try_list_keys(namespace).unwrap_or_else(|e| {
            tracing::warn!("Cache key listing failed for {}: {}", namespace, e);
            Vec::new()
        })
    }

    /// Age of an entry, or `None` when unknown.
    pub fn age_of(&self, namespace: Namespace, key: &str) -> Option<Duration> {
        let written_at: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT written_at FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                tracing::warn!("Cache age lookup failed for {}/{}: {}", namespace, key, e);
                None
            });

        written_at.map(|written_at| {
            Duration::from_millis(self.elapsed_ms(written_at).max(0) as u64)
        })
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                params![namespace.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n.max(0) as usize)
            .unwrap_or_else(|e| {
                tracing::warn!("Cache count failed for {}: {}", namespace, e);
                0
            })
    }

    pub fn is_empty(&self, namespace: Namespace) -> bool {
        self.len(namespace) == 0
    }

    fn read<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
        stale_ceiling: Option<Duration>,
    ) -> Result<Option<T>, CacheError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT value, written_at, ttl_ms FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |row| {
                    Ok(Row {
                        value: row.get(0)?,
                        written_at: row.get(1)?,
                        ttl_ms: row.get(2)?,
                    })
                },
            )
            .optional()?;

        let Some(row) = row else {
            tracing::debug!("Cache miss for {}/{}", namespace, key);
            return Ok(None);
        };

        let age_ms = self.elapsed_ms(row.written_at).max(0);
        let retention_ms = row.ttl_ms.max(to_millis(self.retention));
        let allowed_ms = match stale_ceiling {
            Some(ceiling) => row.ttl_ms.max(to_millis(ceiling)),
            None => row.ttl_ms,
        };

        if age_ms > allowed_ms {
            // Keep expired rows while a stale read could still use them.
            if age_ms > retention_ms {
                conn.execute(
                    "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                    params![namespace.as_str(), key],
                )?;
            }
            tracing::debug!("Cache entry {}/{} expired ({} ms old)", namespace, key, age_ms);
            return Ok(None);
        }

        match serde_json::from_str(&row.value) {
            Ok(value) => {
                tracing::debug!("Cache hit for {}/{}", namespace, key);
                Ok(Some(value))
            }
            Err(e) => {
                conn.execute(
                    "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                    params![namespace.as_str(), key],
                )?;
                Err(e.into())
            }
        }
    }

    fn write<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let encoded = serde_json::to_string(value)?;
        let now = self.clock.now().timestamp_millis();
        let max_items = self.policies.max_items(namespace) as i64;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND written_at + MAX(ttl_ms, ?2) < ?3",
            params![namespace.as_str(), to_millis(self.retention), now],
        )?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if !exists {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                params![namespace.as_str()],
                |row| row.get(0),
            )?;
            let overflow = count - max_items + 1;
            if overflow > 0 {
                let evicted = tx.execute(
                    r#"
                    DELETE FROM cache_entries WHERE rowid IN (
                        SELECT rowid FROM cache_entries
                        WHERE namespace = ?1
                        ORDER BY written_at ASC, rowid ASC
                        LIMIT ?2
                    )
                    "#,
                    params![namespace.as_str(), overflow],
                )?;
                tracing::debug!("Evicted {} oldest entries from {}", evicted, namespace);
            }
        }

        tx.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries (namespace, key, value, written_at, ttl_ms)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![namespace.as_str(), key, encoded, now, to_millis(ttl)],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn try_list_keys(&self, namespace: Namespace) -> Result<Vec<String>, CacheError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key FROM cache_entries WHERE namespace = ?1 ORDER BY written_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![namespace.as_str()], |row| row.get(0))?;
        let keys = rows.collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn elapsed_ms(&self, written_at: i64) -> i64 {
        self.clock.now().timestamp_millis() - written_at
    }

    #[cfg(test)]
    fn break_storage(&self) {
        let _ = self.conn.lock().execute_batch("DROP TABLE cache_entries;");
    }
}

fn to_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
