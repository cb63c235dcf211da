//! # Optimistic Updates
//!
//! Every user action is a [`Command`]:
//!
//! 1. apply it to the shadow tally and the session gate right away
//! 2. replay it against the ledger
//! 3. on failure put the shadow and the gate back, then run the command's compensation
//!
//! No retry, no idempotency key. A client retrying after a partial remote failure can double count.
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    error::{AppError, StoreError},
    ledger::Ledger,
    models::{CastOutcome, Choice, Tally},
    session::SessionGate,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Cast(CastOutcome),
    Reset,
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply_local(&self, tally: &mut Tally, gate: &mut SessionGate);

    async fn apply_remote(&self, ledger: &Ledger, gate: &SessionGate) -> Result<Applied, AppError>;

    /// Runs after the snapshot is restored.
    fn compensate(&self, _gate: &mut SessionGate) {}

    /// Corrects the optimistic tally once the real outcome is known and a fresh read failed.
    fn settle(&self, _tally: &mut Tally, _applied: Applied) {}
}

pub struct CastVote {
    pub choice: Choice,
}

#[async_trait]
impl Command for CastVote {
    fn name(&self) -> &'static str {
        "cast"
    }

    fn apply_local(&self, tally: &mut Tally, gate: &mut SessionGate) {
        tally.bump(self.choice);
        gate.record_vote(self.choice);
    }

    async fn apply_remote(&self, ledger: &Ledger, gate: &SessionGate) -> Result<Applied, AppError> {
        ledger
            .cast(gate.display_name(), self.choice)
            .await
            .map(Applied::Cast)
    }

    // voted is cleared so the user may retry
    fn compensate(&self, gate: &mut SessionGate) {
        gate.unlock();
    }

    fn settle(&self, tally: &mut Tally, applied: Applied) {
        match applied {
            Applied::Cast(CastOutcome::Switched { from }) => tally.drop_one(from),
            Applied::Cast(CastOutcome::Unchanged) => tally.drop_one(self.choice),
            Applied::Cast(CastOutcome::Recorded) | Applied::Reset => {}
        }
    }
}

pub struct ResetCounts;

#[async_trait]
impl Command for ResetCounts {
    fn name(&self) -> &'static str {
        "reset_counts"
    }

    fn apply_local(&self, tally: &mut Tally, gate: &mut SessionGate) {
        tally.zero();
        gate.unlock();
    }

    async fn apply_remote(&self, ledger: &Ledger, _: &SessionGate) -> Result<Applied, AppError> {
        ledger.reset_counts().await?;

        Ok(Applied::Reset)
    }
}

pub struct ResetAll;

#[async_trait]
impl Command for ResetAll {
    fn name(&self) -> &'static str {
        "reset_all"
    }

    fn apply_local(&self, tally: &mut Tally, gate: &mut SessionGate) {
        tally.zero();
        gate.forget();
    }

    async fn apply_remote(&self, ledger: &Ledger, _: &SessionGate) -> Result<Applied, AppError> {
        ledger.reset_all().await?;

        Ok(Applied::Reset)
    }
}

/// A tally read that fell back to the shadow when the store was unreachable.
#[derive(Debug)]
pub struct Reading {
    pub tally: Tally,
    pub error: Option<StoreError>,
}

impl Reading {
    pub fn is_stale(&self) -> bool {
        self.error.is_some()
    }
}

/// Last known-good counters.
#[derive(Default)]
pub struct Shadow {
    tally: RwLock<Tally>,
}

impl Shadow {
    pub fn new(tally: Tally) -> Self {
        Self {
            tally: RwLock::new(tally),
        }
    }

    pub fn get(&self) -> Tally {
        *self.tally.read()
    }

    pub fn store(&self, tally: Tally) {
        *self.tally.write() = tally;
    }

    pub async fn read(&self, ledger: &Ledger) -> Reading {
        match ledger.get_counts().await {
            Ok(tally) => {
                self.store(tally);

                Reading { tally, error: None }
            }
            Err(e) => {
                warn!("Falling back to cached counts: {e}");

                Reading {
                    tally: self.get(),
                    error: Some(e),
                }
            }
        }
    }

    pub async fn execute(
        &self,
        ledger: &Ledger,
        gate: &mut SessionGate,
        command: &dyn Command,
    ) -> Result<Applied, AppError> {
        let gate_before = gate.clone();

        let (tally_before, optimistic) = {
            let mut tally = self.tally.write();
            let before = *tally;
            command.apply_local(&mut tally, gate);

            (before, *tally)
        };

        match command.apply_remote(ledger, gate).await {
            Ok(applied) => {
                debug!("{} applied: {applied:?}", command.name());

                match ledger.get_counts().await {
                    Ok(tally) => self.store(tally),
                    Err(e) => {
                        warn!("Could not re-read counts after {}: {e}", command.name());
                        command.settle(&mut self.tally.write(), applied);
                    }
                }

                Ok(applied)
            }
            Err(e) => {
                warn!("{} failed, rolling back: {e}", command.name());

                // Someone else may have stored newer counts meanwhile.
                let mut tally = self.tally.write();
                if *tally == optimistic {
                    *tally = tally_before;
                }
                drop(tally);

                *gate = gate_before;
                command.compensate(gate);

                Err(e)
            }
        }
    }
}
