//! # Frontend Specifications
//!
//! Client logic/relevant structures.
//!
//! ## Overall Payloads
//!
//! Responses/requests between the frontend and backend. All JSON.
//!
//! ### Session
//! Cookies
//! - voter_session: UUID v4 string, minted by the backend on first contact, no expiry
//!
//! Losing the cookie means a new session. A new session can vote again, same hole as a browser-only
//! lock, we accept it.
//!
//! ### Every Response
//! - counts: yes, no, total, yes_pct, no_pct
//! - session: voted, choice, name, phase, can_vote
//! - voters: list of name + choice, only when names are tracked
//! - headline, message: text to show under the buttons
//! - warning: set when the action failed, view is still valid
//! - refresh_ms: how often to poll `/state`
//!
//! ### Vote
//! To backend
//! - `POST /vote`, `{"choice": "yes"}` or `{"choice": "no"}`
//!
//! From backend
//! - 200 + view, buttons now disabled
//! - 409 + view if this session already voted
//! - 503 + view with last known counts if the store is down, buttons stay enabled
//!
//! ### Name
//! To backend
//! - `POST /name`, `{"name": "ada"}`
//!
//! From backend
//! - 200 + view, name trimmed, shows up in voters with choice `none`
//! - 422 + view if blank, nothing changes
//!
//! ### Resets
//! - `POST /reset/counts`: counters to 0, names kept with choice `none`, every tab unlocks on its next poll
//! - `POST /reset/all`: counters to 0, names gone, every tab unlocks and forgets its name
//!
//!
//!
//! ## Flow
//!
//! - Page load: `GET /state`, render buttons enabled iff `session.can_vote`
//! - Optional: enter a name, same name from another device switches that name's vote
//! - Click: `POST /vote`, render the returned view
//! - Poll `GET /state` every `refresh_ms`, counts converge eventually, tabs are not synchronized
