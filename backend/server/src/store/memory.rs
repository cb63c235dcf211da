use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Batch, CounterStore, Op};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    ints: HashMap<String, i64>,
    maps: HashMap<String, BTreeMap<String, String>>,
}

impl Inner {
    fn apply(&mut self, op: Op) {
        match op {
            Op::Set { key, value } => {
                self.ints.insert(key, value);
            }
            Op::SetIfAbsent { key, value } => {
                self.ints.entry(key).or_insert(value);
            }
            Op::Incr { key, delta } => {
                *self.ints.entry(key).or_insert(0) += delta;
            }
            Op::SetField { map, name, value } => {
                self.maps.entry(map).or_default().insert(name, value);
            }
            Op::SetFieldIfAbsent { map, name, value } => {
                self.maps.entry(map).or_default().entry(name).or_insert(value);
            }
            Op::DeleteField { map, name } => {
                if let Some(fields) = self.maps.get_mut(&map) {
                    fields.remove(&name);
                }
            }
            Op::DeleteMap { map } => {
                self.maps.remove(&map);
            }
        }
    }
}

/// Process-local store. `set_offline` makes every call fail, which is how
/// tests reach the store-unreachable paths.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.reachable()?;

        Ok(self.inner.lock().ints.get(key).copied())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.reachable()?;

        let mut inner = self.inner.lock();
        let value = inner.ints.entry(key.to_string()).or_insert(0);
        *value += delta;

        Ok(*value)
    }

    async fn field(&self, map: &str, name: &str) -> Result<Option<String>, StoreError> {
        self.reachable()?;

        Ok(self
            .inner
            .lock()
            .maps
            .get(map)
            .and_then(|fields| fields.get(name).cloned()))
    }

    async fn fields(&self, map: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.reachable()?;

        Ok(self
            .inner
            .lock()
            .maps
            .get(map)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        self.reachable()?;

        let mut inner = self.inner.lock();
        for op in batch.ops {
            inner.apply(op);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_from_missing() {
        let store = MemoryStore::new();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.incr("k", 1).await.unwrap(), 1);
        assert_eq!(store.incr("k", -1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_field_ops() {
        let store = MemoryStore::new();
        store
            .apply(
                Batch::new()
                    .set_field("m", "ada", "yes")
                    .set_field_if_absent("m", "ada", "none")
                    .set_field_if_absent("m", "bob", "none")
                    .set_if_absent("k", 5)
                    .set_if_absent("k", 9),
            )
            .await
            .unwrap();

        assert_eq!(store.field("m", "ada").await.unwrap().as_deref(), Some("yes"));
        assert_eq!(store.fields("m").await.unwrap().len(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(5));

        store
            .apply(Batch::new().delete_field("m", "ada"))
            .await
            .unwrap();
        assert_eq!(store.field("m", "ada").await.unwrap(), None);

        store.apply(Batch::new().delete_map("m")).await.unwrap();
        assert!(store.fields("m").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_rejects_everything() {
        let store = MemoryStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.apply(Batch::new().incr("k", 1)).await.is_err());

        store.set_offline(false);
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
