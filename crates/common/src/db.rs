use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rusqlite::OptionalExtension;

/// SQLite-backed key/value storage, driven from async code.
///
/// Statements run on the `tokio_rusqlite` worker thread; cloning shares
/// that worker.
#[derive(Clone)]
pub struct AsyncDb {
    conn: tokio_rusqlite::Connection,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

const LOCK_BACKOFF_START: Duration = Duration::from_millis(100);
const LOCK_BACKOFF_CAP: Duration = Duration::from_secs(2);
const LOCK_WAIT_LIMIT: Duration = Duration::from_secs(30);

fn is_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::DatabaseBusy | rusqlite::ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

fn prepare(conn: &mut rusqlite::Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.busy_timeout(Duration::from_secs(1))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch(SCHEMA)?;
    conn.busy_timeout(Duration::from_secs(5))
}

impl AsyncDb {
    /// Opens (creating if needed) the database file and its parent directory.
    pub async fn open(path: &str) -> Result<Self> {
        match Path::new(path).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?,
            _ => {}
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .with_context(|| format!("opening {path}"))?;
        Self::init(conn).await
    }

    pub async fn open_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    /// A second poolctl process may hold the write lock while this one
    /// creates the schema, so a locked database is retried with backoff.
    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
        let deadline = Instant::now() + LOCK_WAIT_LIMIT;
        let mut backoff = LOCK_BACKOFF_START;
        loop {
            let res = conn.call(prepare).await;
            let err = match res {
                Ok(()) => return Ok(Self { conn }),
                Err(tokio_rusqlite::Error::Error(err)) => err,
                Err(other) => anyhow::bail!("preparing session database: {other}"),
            };
            if !is_locked(&err) || Instant::now() >= deadline {
                return Err(anyhow::Error::from(err).context("preparing session database"));
            }
            tracing::warn!(wait_for = ?backoff, "session database locked, retrying");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(LOCK_BACKOFF_CAP);
        }
    }

    /// Runs `function` against the connection on the worker thread.
    pub async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn
            .call(move |conn| function(conn))
            .await
            .map_err(|e: tokio_rusqlite::Error<anyhow::Error>| match e {
                tokio_rusqlite::Error::Error(err) => err,
                tokio_rusqlite::Error::ConnectionClosed => {
                    anyhow::anyhow!("session database connection closed")
                }
                other => anyhow::anyhow!("session database: {other}"),
            })
    }

    /// [`Self::call`] plus `pool_db_query_latency_ms{op,status}` and
    /// `pool_db_query_errors_total{op}`.
    pub async fn call_named<F, R>(&self, op: &'static str, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let started = Instant::now();
        let res = self.call(function).await;
        let status = if res.is_ok() { "ok" } else { "err" };
        metrics::histogram!("pool_db_query_latency_ms", "op" => op, "status" => status)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        if res.is_err() {
            metrics::counter!("pool_db_query_errors_total", "op" => op).increment(1);
        }
        res
    }

    pub async fn get(&self, op: &'static str, key: &'static str) -> Result<Option<String>> {
        self.call_named(op, move |conn| {
            Ok(conn
                .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?)
        })
        .await
    }

    /// Inserts or overwrites `key`, stamping `updated_at`.
    pub async fn put(&self, op: &'static str, key: &'static str, value: String) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.call_named(op, move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete(&self, op: &'static str, key: &'static str) -> Result<()> {
        self.call_named(op, move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let db = AsyncDb::open_memory().await.unwrap();
        assert_eq!(db.get("t.get", "greeting").await.unwrap(), None);

        db.put("t.put", "greeting", "hello".to_string()).await.unwrap();
        db.put("t.put", "greeting", "hola".to_string()).await.unwrap();
        assert_eq!(
            db.get("t.get", "greeting").await.unwrap().as_deref(),
            Some("hola")
        );

        db.delete("t.delete", "greeting").await.unwrap();
        assert_eq!(db.get("t.get", "greeting").await.unwrap(), None);
        db.delete("t.delete", "greeting").await.unwrap();
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pool.db");
        let db = AsyncDb::open(path.to_str().unwrap()).await.unwrap();
        db.put("t.put", "k", "v".to_string()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let db = AsyncDb::open(&path).await.unwrap();
        db.put("t.put", "a", "1".to_string()).await.unwrap();
        drop(db);

        let db = AsyncDb::open(&path).await.unwrap();
        assert_eq!(db.get("t.get", "a").await.unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_is_locked_only_for_busy_and_locked() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(is_locked(&busy));
        assert!(!is_locked(&rusqlite::Error::QueryReturnedNoRows));
    }
}
