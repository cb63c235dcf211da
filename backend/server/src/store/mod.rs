//! # Counter Store
//!
//! The only thing the vote logic needs from persistence:
//!
//! - get/increment an integer by key
//! - get/set/delete a field within a named mapping
//! - apply several of those as one transaction
//!
//! Three backends implement it. Memory doubles as the fake for tests.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub mod memory;
pub mod redis;
pub mod sqlite;

use crate::{
    config::{Backend, Config},
    error::StoreError,
};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::sqlite::SqliteStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Set { key: String, value: i64 },
    SetIfAbsent { key: String, value: i64 },
    Incr { key: String, delta: i64 },
    SetField { map: String, name: String, value: String },
    SetFieldIfAbsent { map: String, name: String, value: String },
    DeleteField { map: String, name: String },
    DeleteMap { map: String },
}

/// Operations applied all-or-nothing, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    pub ops: Vec<Op>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: i64) -> Self {
        self.ops.push(Op::Set {
            key: key.to_string(),
            value,
        });
        self
    }

    pub fn set_if_absent(mut self, key: &str, value: i64) -> Self {
        self.ops.push(Op::SetIfAbsent {
            key: key.to_string(),
            value,
        });
        self
    }

    pub fn incr(mut self, key: &str, delta: i64) -> Self {
        self.ops.push(Op::Incr {
            key: key.to_string(),
            delta,
        });
        self
    }

    pub fn set_field(mut self, map: &str, name: &str, value: &str) -> Self {
        self.ops.push(Op::SetField {
            map: map.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn set_field_if_absent(mut self, map: &str, name: &str, value: &str) -> Self {
        self.ops.push(Op::SetFieldIfAbsent {
            map: map.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn delete_field(mut self, map: &str, name: &str) -> Self {
        self.ops.push(Op::DeleteField {
            map: map.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn delete_map(mut self, map: &str) -> Self {
        self.ops.push(Op::DeleteMap {
            map: map.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Atomic add, returning the new value. Missing keys start at 0.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    async fn field(&self, map: &str, name: &str) -> Result<Option<String>, StoreError>;

    async fn fields(&self, map: &str) -> Result<Vec<(String, String)>, StoreError>;

    async fn apply(&self, batch: Batch) -> Result<(), StoreError>;
}

pub async fn open(config: &Config) -> Result<Arc<dyn CounterStore>, StoreError> {
    let store: Arc<dyn CounterStore> = match config.backend {
        Backend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        Backend::Sqlite => {
            info!("Using SQLite store at {}", config.sqlite_path);
            Arc::new(SqliteStore::open(&config.sqlite_path)?)
        }
        Backend::Redis => {
            info!("Using Redis store");
            Arc::new(RedisStore::connect(&config.redis_url).await?)
        }
    };

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keeps_order() {
        let batch = Batch::new()
            .incr("a", -1)
            .incr("b", 1)
            .set_field("m", "ada", "b");

        assert_eq!(
            batch.ops,
            vec![
                Op::Incr {
                    key: "a".to_string(),
                    delta: -1
                },
                Op::Incr {
                    key: "b".to_string(),
                    delta: 1
                },
                Op::SetField {
                    map: "m".to_string(),
                    name: "ada".to_string(),
                    value: "b".to_string()
                },
            ]
        );
    }
}
