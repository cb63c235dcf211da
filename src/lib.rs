//! # One-Time Voter Documentation
//!
//! Vote once, yes or no. A shared counter pair, one lock per browser session.
//!
//! Backend lives in `backend/server`, the command line tab in `backend/tester`.
//!
//! ## Notes
//!
//! ### Variants we collapsed into config
//! - Session-only reset (no epoch, only the clicking tab unlocks): `RESET_SCOPE=session`
//! - Named voters and vote switching: `TRACK_NAMES`, `ALLOW_SWITCH`
//! - Memory, SQLite or Redis counters: `STORE_BACKEND`

pub mod user;
