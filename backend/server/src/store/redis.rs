//! # Redis
//!
//! RAM database.
//!
//! Holds the two vote counters, the reset epochs and the voter hash. Used for its atomic
//! increment/decrements.
//!
//! ## Implementation
//!
//! - Plain keys: `votes:yes`, `votes:no`, `votes:epoch`, `votes:purge`
//! - Redis hash: `votes:voters`, one field per display name holding `yes`, `no` or `none`
//! - Batches go out as one `MULTI`/`EXEC` pipeline, so a vote switch lands all at once
//! - `INCR` assumes 0 if the key does not exist, no need to seed anything
use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
    pipe,
};
use tracing::info;

use super::{Batch, CounterStore, Op};
use crate::error::StoreError;

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        info!("Connected to Redis");

        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.get(key).await?)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.incr(key, delta).await?)
    }

    async fn field(&self, map: &str, name: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();

        Ok(connection.hget(map, name).await?)
    }

    async fn fields(&self, map: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut connection = self.connection.clone();
        let fields: BTreeMap<String, String> = connection.hgetall(map).await?;

        Ok(fields.into_iter().collect())
    }

    async fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        #[cfg(feature = "verbose")]
        info!("Redis transaction: {:?}", batch.ops);

        let mut transaction = pipe();
        transaction.atomic();

        for op in batch.ops {
            match op {
                Op::Set { key, value } => transaction.set(key, value).ignore(),
                Op::SetIfAbsent { key, value } => transaction.set_nx(key, value).ignore(),
                Op::Incr { key, delta } => transaction.incr(key, delta).ignore(),
                Op::SetField { map, name, value } => transaction.hset(map, name, value).ignore(),
                Op::SetFieldIfAbsent { map, name, value } => {
                    transaction.hset_nx(map, name, value).ignore()
                }
                Op::DeleteField { map, name } => transaction.hdel(map, name).ignore(),
                Op::DeleteMap { map } => transaction.del(map).ignore(),
            };
        }

        let mut connection = self.connection.clone();
        transaction.query_async::<()>(&mut connection).await?;

        Ok(())
    }
}
