//! Backend of a one-time voter.
//!
//!
//!
//! # General Infrastructure
//! - Browser (or `tester`) talks JSON to this server
//! - Server keeps one gate per browser session, keyed by the `voter_session` cookie
//! - A gate is only created once a session acts, and is dropped after `SESSION_IDLE_SECS` idle
//! - Counters and voter records live in whichever store `STORE_BACKEND` picks
//! - Every response is the full view, so a front end only ever re-renders
//!
//!
//!
//! # Stores
//!
//! **Goal**: Same semantics no matter where the counters live.
//!
//! - `memory`: process maps, gone on restart, also the test fake
//! - `sqlite`: local file, survives restarts, single machine
//! - `redis`: shared across server replicas, atomic `INCR` and `MULTI`/`EXEC`
//!
//! Writes from one server go through a single writer lock. Across replicas we rely on the store's
//! own transactions. A vote switch from two replicas at the same instant for the same name can
//! still race, this is a tradeoff we are okay with.
//!
//!
//!
//! # Optimistic Updates
//!
//! - Each action is applied to a shadow copy of the counters first
//! - Then replayed against the store
//! - If the store refuses, the shadow and the session gate are rolled back and the user may retry
//! - Reads fall back to the shadow with a warning when the store is unreachable
//!
//!
//!
//! # Setup
//!
//! Run with the in-memory store.
//! ```sh
//! cargo run --bin voter-server
//! ```
//!
//! Run against Redis.
//! ```sh
//! STORE_BACKEND=redis REDIS_URL=redis://127.0.0.1:6379 cargo run --bin voter-server
//! ```
//!
//! Poke it.
//! ```sh
//! cargo run --bin tester -- vote yes
//! cargo run --bin tester -- watch
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod optimistic;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod view;

use config::Config;
use error::StartupError;
use routes::{
    health_handler, name_handler, reset_all_handler, reset_counts_handler, state_handler,
    vote_handler, voters_handler,
};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/state", get(state_handler))
        .route("/vote", post(vote_handler))
        .route("/name", post(name_handler))
        .route("/reset/counts", post(reset_counts_handler))
        .route("/reset/all", post(reset_all_handler))
        .route("/voters", get(voters_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), StartupError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    let idle = Duration::from_secs(state.config.session_idle_secs);
    let _sweeper = state.sessions.spawn_sweeper(idle);
    info!("Dropping sessions idle for {}s", idle.as_secs());

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
