//! REST endpoints for driving an onboarding session.
//!
//! The session sits behind a Tokio mutex. Handlers never wait for it: if an
//! action is already in flight the request is rejected with 409 and the
//! status observed through the watch channel.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard, watch};
use tower_http::cors::CorsLayer;
use tracing::debug;

use super::manager::OnboardingSession;
use super::model::{AnswerValue, QUICK_PICKS, find_quick_pick};
use super::state::SessionStatus;
use crate::error::SessionError;

type Reply = (StatusCode, Json<serde_json::Value>);

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub session: Arc<Mutex<OnboardingSession>>,
    pub status: watch::Receiver<SessionStatus>,
}

impl OnboardingRouteState {
    pub fn new(session: OnboardingSession) -> Self {
        let status = session.watch_status();
        Self {
            session: Arc::new(Mutex::new(session)),
            status,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, OnboardingSession>, Reply> {
        self.session.try_lock().map_err(|_| {
            let status = *self.status.borrow();
            debug!(%status, "Rejected request, session busy");
            error_reply(StatusCode::CONFLICT, SessionError::Busy { status })
        })
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/state", get(get_state))
        .route("/api/onboarding/progress", get(get_progress))
        .route("/api/onboarding/quick-picks", get(list_quick_picks))
        .route("/api/onboarding/start", post(start))
        .route("/api/onboarding/next", post(next_question))
        .route("/api/onboarding/answer", post(answer))
        .route("/api/onboarding/skip", post(skip))
        .route("/api/onboarding/quick-pick", post(quick_pick))
        .route("/api/onboarding/undo", post(undo))
        .route("/api/onboarding/reset", post(reset))
        .route("/api/onboarding/tracks/{id}/accept", post(accept_track))
        .route("/api/onboarding/tracks/{id}/swap", post(swap_track))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_reply(status: StatusCode, error: impl std::fmt::Display) -> Reply {
    (status, Json(json!({ "error": error.to_string() })))
}

fn view_reply(session: &OnboardingSession) -> Reply {
    (StatusCode::OK, Json(json!(session.view())))
}

// ── Reads ───────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "onboard-assist"
    }))
}

/// GET /api/onboarding/state
///
/// Full session view, or just the status while an action is running.
async fn get_state(State(state): State<OnboardingRouteState>) -> Reply {
    match state.session.try_lock() {
        Ok(session) => view_reply(&session),
        Err(_) => {
            let status = *state.status.borrow();
            (StatusCode::OK, Json(json!({ "status": status, "busy": true })))
        }
    }
}

/// GET /api/onboarding/progress
async fn get_progress(State(state): State<OnboardingRouteState>) -> Reply {
    match state.lock() {
        Ok(session) => (StatusCode::OK, Json(json!(session.progress_summary()))),
        Err(reply) => reply,
    }
}

async fn list_quick_picks() -> impl IntoResponse {
    Json(json!(QUICK_PICKS))
}

// ── Actions ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StartRequest {
    #[serde(default)]
    resume: bool,
}

/// POST /api/onboarding/start
///
/// `{"resume": true}` continues a persisted session when one exists.
async fn start(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<StartRequest>,
) -> Reply {
    let mut session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    if body.resume {
        session.resume().await;
    } else {
        session.initialize().await;
    }
    view_reply(&session)
}

/// POST /api/onboarding/next
///
/// Fetch a question without touching answers or the step counter. Used after
/// undo or a failed round trip left the session without one.
async fn next_question(State(state): State<OnboardingRouteState>) -> Reply {
    let mut session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    session.fetch_next_question().await;
    view_reply(&session)
}

#[derive(Deserialize)]
struct AnswerRequest {
    value: AnswerValue,
}

async fn answer(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<AnswerRequest>,
) -> Reply {
    let mut session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    if !session.answer_question(body.value).await {
        return error_reply(StatusCode::BAD_REQUEST, "No question to answer");
    }
    view_reply(&session)
}

async fn skip(State(state): State<OnboardingRouteState>) -> Reply {
    let mut session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    session.skip_question().await;
    view_reply(&session)
}

#[derive(Deserialize)]
struct QuickPickRequest {
    id: String,
}

async fn quick_pick(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<QuickPickRequest>,
) -> Reply {
    let Some(pick) = find_quick_pick(&body.id) else {
        return error_reply(StatusCode::NOT_FOUND, SessionError::UnknownQuickPick(body.id));
    };
    let mut session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    session.handle_quick_pick(pick).await;
    view_reply(&session)
}

async fn undo(State(state): State<OnboardingRouteState>) -> Reply {
    let mut session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    let undone = session.undo();
    (
        StatusCode::OK,
        Json(json!({ "undone": undone, "state": session.view() })),
    )
}

async fn reset(State(state): State<OnboardingRouteState>) -> Reply {
    let mut session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    session.reset().await;
    view_reply(&session)
}

async fn accept_track(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Reply {
    let session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    match session.accept_track(&id) {
        Some(track) => (StatusCode::OK, Json(json!(track))),
        None => error_reply(StatusCode::NOT_FOUND, SessionError::UnknownTrack(id)),
    }
}

async fn swap_track(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Reply {
    let session = match state.lock() {
        Ok(session) => session,
        Err(reply) => return reply,
    };
    if session.swap_track(&id) {
        (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "swap_requested", "trackId": id })),
        )
    } else {
        error_reply(StatusCode::NOT_FOUND, SessionError::UnknownTrack(id))
    }
}
