//! # Session Gate
//!
//! Per-browser lock state. One gate per `voter_session` cookie, invisible to every other session.
//!
//! ## Phases
//!
//! - `Anonymous`: no name, has not voted
//! - `Named`: has a display name, has not voted
//! - `Voted`: buttons disabled until a reset is observed
//!
//! A global reset reaches idle tabs through the reset epoch: the next request from that tab sees a
//! newer epoch than the gate last saw and unlocks. A `reset_all` also bumps the purge epoch, which
//! clears the name, since its voter record is gone.
use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, header::COOKIE, request::Parts},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Choice, Tally},
};

pub const SESSION_COOKIE: &str = "voter_session";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Anonymous,
    Named,
    Voted,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionGate {
    voted: bool,
    choice: Choice,
    last_seen_epoch: u64,
    last_seen_purge: u64,
    display_name: Option<String>,
}

impl SessionGate {
    /// Fresh gate that has already "seen" the current epochs.
    pub fn new(tally: &Tally) -> Self {
        Self {
            last_seen_epoch: tally.epoch,
            last_seen_purge: tally.purge,
            ..Self::default()
        }
    }

    pub fn voted(&self) -> bool {
        self.voted
    }

    pub fn choice(&self) -> Choice {
        self.choice
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn last_seen_epoch(&self) -> u64 {
        self.last_seen_epoch
    }

    pub fn can_vote(&self) -> bool {
        !self.voted
    }

    pub fn phase(&self) -> Phase {
        match (self.voted, &self.display_name) {
            (true, _) => Phase::Voted,
            (false, Some(_)) => Phase::Named,
            (false, None) => Phase::Anonymous,
        }
    }

    /// Unlocks when someone reset since this gate last looked.
    pub fn check_unlock(&mut self, current_epoch: u64) -> bool {
        if current_epoch <= self.last_seen_epoch {
            return false;
        }

        self.last_seen_epoch = current_epoch;
        self.unlock();

        true
    }

    pub fn check_purge(&mut self, current_purge: u64) -> bool {
        if current_purge <= self.last_seen_purge {
            return false;
        }

        self.last_seen_purge = current_purge;
        self.display_name = None;

        true
    }

    pub fn reconcile(&mut self, tally: &Tally) -> bool {
        let unlocked = self.check_unlock(tally.epoch);
        let purged = self.check_purge(tally.purge);

        unlocked || purged
    }

    pub fn record_vote(&mut self, choice: Choice) {
        self.voted = true;
        self.choice = choice;
    }

    /// Rejects blank input and leaves the current name untouched.
    pub fn set_name(&mut self, input: &str) -> Result<&str, AppError> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(AppError::InvalidName);
        }

        Ok(self.display_name.insert(trimmed.to_string()).as_str())
    }

    pub fn unlock(&mut self) {
        self.voted = false;
        self.choice = Choice::None;
    }

    /// Back to defaults, keeping the epochs.
    pub fn forget(&mut self) {
        self.unlock();
        self.display_name = None;
    }
}

struct Slot {
    gate: Arc<Mutex<SessionGate>>,
    touched: Instant,
}

/// Every live gate, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    gates: DashMap<Uuid, Slot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gate for `id`, created on first contact.
    pub fn open(&self, id: Uuid, tally: &Tally) -> Arc<Mutex<SessionGate>> {
        let mut slot = self.gates.entry(id).or_insert_with(|| {
            debug!("New session {id}");
            Slot {
                gate: Arc::new(Mutex::new(SessionGate::new(tally))),
                touched: Instant::now(),
            }
        });
        slot.touched = Instant::now();

        slot.gate.clone()
    }

    /// The gate for `id` if it exists. Never registers one.
    pub fn get(&self, id: Uuid) -> Option<Arc<Mutex<SessionGate>>> {
        self.gates.get_mut(&id).map(|mut slot| {
            slot.touched = Instant::now();
            slot.gate.clone()
        })
    }

    /// Drops gates untouched for `idle` as of `now`. Gates held by a request stay.
    pub fn evict_idle(&self, now: Instant, idle: Duration) -> usize {
        let before = self.gates.len();

        self.gates.retain(|_, slot| {
            now.saturating_duration_since(slot.touched) < idle || Arc::strong_count(&slot.gate) > 1
        });

        let evicted = before.saturating_sub(self.gates.len());
        if evicted > 0 {
            debug!("Evicted {evicted} idle sessions");
        }

        evicted
    }

    /// Sweeps every `idle / 4`, at least once a second, until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, idle: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = (idle / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(live) = registry.upgrade() else {
                    break;
                };
                live.evict_idle(Instant::now(), idle);
            }
        })
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

/// Which browser session a request belongs to.
#[derive(Clone, Copy, Debug)]
pub struct SessionContext {
    pub id: Uuid,
    pub fresh: bool,
}

impl SessionContext {
    pub fn cookie(&self) -> Option<HeaderValue> {
        if !self.fresh {
            return None;
        }

        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            self.id
        ))
        .ok()
    }
}

fn session_id(parts: &Parts) -> Option<Uuid> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

impl<S: Send + Sync> FromRequestParts<S> for SessionContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(match session_id(parts) {
            Some(id) => SessionContext { id, fresh: false },
            None => SessionContext {
                id: Uuid::new_v4(),
                fresh: true,
            },
        })
    }
}
