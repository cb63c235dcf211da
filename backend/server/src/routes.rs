use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::{
    error::AppError,
    models::Choice,
    optimistic::{CastVote, Command, ResetAll, ResetCounts},
    session::{SessionContext, SessionGate},
    state::AppState,
    view::View,
};

#[derive(Deserialize)]
pub struct VotePayload {
    choice: Choice,
}

#[derive(Deserialize)]
pub struct NamePayload {
    name: String,
}

/// Locks this session's gate and brings it up to date with the store.
async fn enter(state: &AppState, session: &SessionContext) -> OwnedMutexGuard<SessionGate> {
    let reading = state.shadow.read(&state.ledger).await;
    let mut gate = state
        .sessions
        .open(session.id, &reading.tally)
        .lock_owned()
        .await;

    if !reading.is_stale() && gate.reconcile(&reading.tally) {
        debug!("Session {} observed a reset", session.id);
    }

    gate
}

async fn render(state: &AppState, gate: &mut SessionGate, warning: Option<String>) -> View {
    let reading = state.shadow.read(&state.ledger).await;

    if !reading.is_stale() {
        gate.reconcile(&reading.tally);
    }

    let mut warning = warning.or_else(|| reading.error.map(|e| AppError::from(e).to_string()));

    let voters = if state.ledger.options().track_names {
        match state.ledger.voters().await {
            Ok(voters) => Some(voters),
            Err(e) => {
                warn!("Voter listing unavailable: {e}");
                if warning.is_none() {
                    warning = Some(AppError::from(e).to_string());
                }

                None
            }
        }
    } else {
        None
    };

    View::new(
        &reading.tally,
        gate,
        voters,
        warning,
        state.config.refresh_ms,
    )
}

/// Every path, failed or not, ends with the same view.
async fn finish(
    state: &AppState,
    session: &SessionContext,
    gate: &mut SessionGate,
    result: Result<(), AppError>,
) -> Response {
    let (status, warning) = match result {
        Ok(()) => (StatusCode::OK, None),
        Err(e) => {
            warn!("Session {}: {e}", session.id);
            (e.status(), Some(e.to_string()))
        }
    };

    let view = render(state, gate, warning).await;
    let mut response = (status, Json(view)).into_response();

    if let Some(cookie) = session.cookie() {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }

    response
}

async fn run(
    state: &AppState,
    gate: &mut SessionGate,
    command: &dyn Command,
) -> Result<(), AppError> {
    state
        .shadow
        .execute(&state.ledger, gate, command)
        .await
        .map(|_| ())
}

pub async fn state_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Response {
    // Looking does not register a gate, only acting does.
    let Some(gate) = state.sessions.get(session.id) else {
        let mut gate = SessionGate::new(&state.shadow.get());

        return finish(&state, &session, &mut gate, Ok(())).await;
    };
    let mut gate = gate.lock_owned().await;

    finish(&state, &session, &mut gate, Ok(())).await
}

pub async fn vote_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    payload: Result<Json<VotePayload>, JsonRejection>,
) -> Response {
    let mut gate = enter(&state, &session).await;

    let result = match payload {
        Err(_) => Err(AppError::MalformedPayload),
        Ok(Json(VotePayload {
            choice: Choice::None,
        })) => Err(AppError::MalformedPayload),
        Ok(_) if !gate.can_vote() => Err(AppError::AlreadyVoted),
        Ok(Json(VotePayload { choice })) => run(&state, &mut gate, &CastVote { choice }).await,
    };

    finish(&state, &session, &mut gate, result).await
}

pub async fn name_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    payload: Result<Json<NamePayload>, JsonRejection>,
) -> Response {
    let mut gate = enter(&state, &session).await;

    let result = match payload {
        Err(_) => Err(AppError::MalformedPayload),
        Ok(Json(NamePayload { name })) => set_name(&state, &mut gate, &name).await,
    };

    finish(&state, &session, &mut gate, result).await
}

// The gate only changes once the record exists.
async fn set_name(state: &AppState, gate: &mut SessionGate, input: &str) -> Result<(), AppError> {
    let mut next = gate.clone();
    let name = next.set_name(input)?.to_string();

    state.ledger.register(&name).await?;
    *gate = next;

    Ok(())
}

pub async fn reset_counts_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Response {
    let mut gate = enter(&state, &session).await;
    let result = run(&state, &mut gate, &ResetCounts).await;

    finish(&state, &session, &mut gate, result).await
}

pub async fn reset_all_handler(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Response {
    let mut gate = enter(&state, &session).await;
    let result = run(&state, &mut gate, &ResetAll).await;

    finish(&state, &session, &mut gate, result).await
}

pub async fn voters_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.ledger.voters().await {
        Ok(voters) => (StatusCode::OK, Json(voters)).into_response(),
        Err(e) => {
            let e = AppError::from(e);
            (e.status(), e.to_string()).into_response()
        }
    }
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
