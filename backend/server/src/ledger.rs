//! # Vote Store
//!
//! Shared counters plus the optional voter hash, on top of any [`CounterStore`].
//!
//! ## Writes
//!
//! - Every mutation takes the writer lock first, so writes from this process never interleave
//! - Anything touching more than one key goes out as a single [`Batch`]
//! - A vote switch is decrement old, increment new, update record: one batch, never half applied
//!
//! ## Resets
//!
//! - `reset_counts`: zero counters, keep names with choice `none`, bump the reset epoch
//! - `reset_all`: zero counters, drop every voter, bump the reset epoch and the purge epoch
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    config::{Config, ResetScope},
    error::{AppError, StoreError},
    models::{
        CastOutcome, Choice, EPOCH_KEY, NO_KEY, PURGE_KEY, Tally, VOTERS_MAP, VoterRecord, YES_KEY,
    },
    store::{Batch, CounterStore},
};

#[derive(Clone, Copy, Debug)]
pub struct LedgerOptions {
    pub track_names: bool,
    pub allow_switch: bool,
    pub reset_scope: ResetScope,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            track_names: true,
            allow_switch: true,
            reset_scope: ResetScope::Global,
        }
    }
}

impl From<&Config> for LedgerOptions {
    fn from(config: &Config) -> Self {
        Self {
            track_names: config.track_names,
            allow_switch: config.allow_switch,
            reset_scope: config.reset_scope,
        }
    }
}

pub struct Ledger {
    store: Arc<dyn CounterStore>,
    options: LedgerOptions,
    writer: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Arc<dyn CounterStore>, options: LedgerOptions) -> Self {
        Self {
            store,
            options,
            writer: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    /// Seeds the counter keys, leaving existing values alone.
    pub async fn init(&self) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;

        self.store
            .apply(
                Batch::new()
                    .set_if_absent(YES_KEY, 0)
                    .set_if_absent(NO_KEY, 0)
                    .set_if_absent(EPOCH_KEY, 0)
                    .set_if_absent(PURGE_KEY, 0),
            )
            .await
    }

    pub async fn get_counts(&self) -> Result<Tally, StoreError> {
        Ok(Tally {
            yes: self.read(YES_KEY).await?,
            no: self.read(NO_KEY).await?,
            epoch: self.read(EPOCH_KEY).await?,
            purge: self.read(PURGE_KEY).await?,
        })
    }

    // Missing and negative both read as 0.
    async fn read(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self
            .store
            .get(key)
            .await?
            .map_or(0, |value| u64::try_from(value).unwrap_or(0)))
    }

    pub async fn choice_of(&self, name: &str) -> Result<Option<Choice>, StoreError> {
        self.store
            .field(VOTERS_MAP, name)
            .await?
            .map(|value| {
                value.parse::<Choice>().map_err(|_| StoreError::Corrupt {
                    key: format!("{VOTERS_MAP}/{name}"),
                    value,
                })
            })
            .transpose()
    }

    pub async fn cast(&self, voter: Option<&str>, choice: Choice) -> Result<CastOutcome, AppError> {
        let Some(target) = choice.key() else {
            return Err(AppError::MalformedPayload);
        };

        let _writer = self.writer.lock().await;

        let name = match voter {
            Some(name) if self.options.track_names => name,
            _ => {
                self.store.incr(target, 1).await?;
                debug!("Anonymous vote for {choice}");

                return Ok(CastOutcome::Recorded);
            }
        };

        let previous = self.choice_of(name).await?.unwrap_or_default();

        let outcome = match previous {
            Choice::None => {
                let batch = Batch::new()
                    .incr(target, 1)
                    .set_field(VOTERS_MAP, name, choice.as_str());
                self.store.apply(batch).await?;

                CastOutcome::Recorded
            }
            same if same == choice => CastOutcome::Unchanged,
            from => {
                if !self.options.allow_switch {
                    return Err(AppError::AlreadyVoted);
                }

                let Some(old) = from.key() else {
                    return Err(AppError::InternalError(format!("no counter for {from}")));
                };

                let batch = Batch::new()
                    .incr(old, -1)
                    .incr(target, 1)
                    .set_field(VOTERS_MAP, name, choice.as_str());
                self.store.apply(batch).await?;

                CastOutcome::Switched { from }
            }
        };

        debug!("{name} voted {choice}: {outcome:?}");

        Ok(outcome)
    }

    /// Makes a name show up in listings before it has voted.
    pub async fn register(&self, name: &str) -> Result<(), StoreError> {
        if !self.options.track_names {
            return Ok(());
        }

        let _writer = self.writer.lock().await;

        self.store
            .apply(Batch::new().set_field_if_absent(VOTERS_MAP, name, Choice::None.as_str()))
            .await
    }

    pub async fn reset_counts(&self) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;

        let mut batch = Batch::new().set(YES_KEY, 0).set(NO_KEY, 0);

        if self.options.track_names {
            for (name, _) in self.store.fields(VOTERS_MAP).await? {
                batch = batch.set_field(VOTERS_MAP, &name, Choice::None.as_str());
            }
        }

        if self.options.reset_scope == ResetScope::Global {
            batch = batch.incr(EPOCH_KEY, 1);
        }

        self.store.apply(batch).await?;
        info!("Counts reset");

        Ok(())
    }

    pub async fn reset_all(&self) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;

        self.store
            .apply(
                Batch::new()
                    .set(YES_KEY, 0)
                    .set(NO_KEY, 0)
                    .delete_map(VOTERS_MAP)
                    .incr(EPOCH_KEY, 1)
                    .incr(PURGE_KEY, 1),
            )
            .await?;
        info!("All votes and voters discarded");

        Ok(())
    }

    pub async fn voters(&self) -> Result<Vec<VoterRecord>, StoreError> {
        if !self.options.track_names {
            return Ok(Vec::new());
        }

        self.store
            .fields(VOTERS_MAP)
            .await?
            .into_iter()
            .map(|(name, value)| match value.parse() {
                Ok(choice) => Ok(VoterRecord { name, choice }),
                Err(_) => Err(StoreError::Corrupt {
                    key: format!("{VOTERS_MAP}/{name}"),
                    value,
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|mut records| {
                records.sort_by(|a, b| a.name.cmp(&b.name));
                records
            })
    }
}
