//! # SQLite
//!
//! Local relational file. Two tables:
//!
//! - `counters(key, value)` for the integers
//! - `fields(map, name, value)` for the named mappings
//!
//! The connection sits behind a mutex and every call hops onto the blocking pool.
use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::task::spawn_blocking;

use super::{Batch, CounterStore, Op};
use crate::error::StoreError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS counters (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS fields (
        map TEXT NOT NULL,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (map, name)
    );
";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .map_err(StoreError::from)
    }
}

fn apply_op(conn: &Connection, op: &Op) -> Result<usize, rusqlite::Error> {
    match op {
        Op::Set { key, value } => conn.execute(
            "INSERT INTO counters (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        ),
        Op::SetIfAbsent { key, value } => conn.execute(
            "INSERT OR IGNORE INTO counters (key, value) VALUES (?1, ?2)",
            params![key, value],
        ),
        Op::Incr { key, delta } => conn.execute(
            "INSERT INTO counters (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = value + excluded.value",
            params![key, delta],
        ),
        Op::SetField { map, name, value } => conn.execute(
            "INSERT INTO fields (map, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(map, name) DO UPDATE SET value = excluded.value",
            params![map, name, value],
        ),
        Op::SetFieldIfAbsent { map, name, value } => conn.execute(
            "INSERT OR IGNORE INTO fields (map, name, value) VALUES (?1, ?2, ?3)",
            params![map, name, value],
        ),
        Op::DeleteField { map, name } => conn.execute(
            "DELETE FROM fields WHERE map = ?1 AND name = ?2",
            params![map, name],
        ),
        Op::DeleteMap { map } => conn.execute("DELETE FROM fields WHERE map = ?1", params![map]),
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let key = key.to_string();

        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM counters WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let key = key.to_string();

        self.with_conn(move |conn| {
            conn.query_row(
                "INSERT INTO counters (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = value + excluded.value
                 RETURNING value",
                params![key, delta],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn field(&self, map: &str, name: &str) -> Result<Option<String>, StoreError> {
        let (map, name) = (map.to_string(), name.to_string());

        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM fields WHERE map = ?1 AND name = ?2",
                params![map, name],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn fields(&self, map: &str) -> Result<Vec<(String, String)>, StoreError> {
        let map = map.to_string();

        self.with_conn(move |conn| {
            let mut statement =
                conn.prepare("SELECT name, value FROM fields WHERE map = ?1 ORDER BY name")?;
            let rows = statement.query_map(params![map], |row| Ok((row.get(0)?, row.get(1)?)))?;

            rows.collect()
        })
        .await
    }

    async fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for op in &batch.ops {
                apply_op(&tx, op)?;
            }

            tx.commit()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_incr_and_get() {
        let store = SqliteStore::in_memory().unwrap();

        assert_eq!(store.get("votes:yes").await.unwrap(), None);
        assert_eq!(store.incr("votes:yes", 1).await.unwrap(), 1);
        assert_eq!(store.incr("votes:yes", 2).await.unwrap(), 3);
        assert_eq!(store.incr("votes:yes", -1).await.unwrap(), 2);
        assert_eq!(store.get("votes:yes").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_batch_is_one_transaction() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .apply(
                Batch::new()
                    .set_if_absent("votes:no", 0)
                    .incr("votes:no", 1)
                    .set_field("votes:voters", "ada", "no")
                    .set_field_if_absent("votes:voters", "ada", "none")
                    .set_field_if_absent("votes:voters", "bob", "none"),
            )
            .await
            .unwrap();

        assert_eq!(store.get("votes:no").await.unwrap(), Some(1));
        assert_eq!(
            store.fields("votes:voters").await.unwrap(),
            vec![
                ("ada".to_string(), "no".to_string()),
                ("bob".to_string(), "none".to_string())
            ]
        );

        store
            .apply(Batch::new().set("votes:no", 0).delete_map("votes:voters"))
            .await
            .unwrap();
        assert_eq!(store.get("votes:no").await.unwrap(), Some(0));
        assert!(store.fields("votes:voters").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("votes.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.incr("votes:yes", 4).await.unwrap();
            store
                .apply(Batch::new().set_field("votes:voters", "ada", "yes"))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("votes:yes").await.unwrap(), Some(4));
        assert_eq!(
            store.field("votes:voters", "ada").await.unwrap().as_deref(),
            Some("yes")
        );
    }
}
