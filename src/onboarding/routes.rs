//! REST endpoints for the session view and the onboarding form.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::OnboardingError;
use crate::session::{Role, SessionStore};

use super::form::FormDraft;
use super::workflow::OnboardingWorkflow;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub session: SessionStore,
    pub workflow: Arc<OnboardingWorkflow>,
}

#[derive(Debug, Deserialize)]
struct TextInput {
    text: String,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    role: Role,
}

/// GET /api/session
///
/// Current `{identity, profile, loading}` view.
async fn get_session(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    Json(state.session.view())
}

/// POST /api/onboarding/name
async fn set_name(
    State(state): State<OnboardingRouteState>,
    Json(input): Json<TextInput>,
) -> Json<FormDraft> {
    Json(state.workflow.on_name_change(&input.text))
}

/// POST /api/onboarding/phone
///
/// Returns the draft with the masked phone number.
async fn set_phone(
    State(state): State<OnboardingRouteState>,
    Json(input): Json<TextInput>,
) -> Json<FormDraft> {
    Json(state.workflow.on_phone_change(&input.text))
}

/// POST /api/onboarding/submit
///
/// 201 with the created profile, 422 on validation failure, 409 while
/// another submission is running, 502 when the profile store write failed,
/// 410 once the workflow was dismissed.
async fn submit(
    State(state): State<OnboardingRouteState>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    match state.workflow.submit(request.role).await {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(OnboardingError::Validation(e)) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation",
            e.title(),
            &e.to_string(),
        ),
        Err(OnboardingError::Submission(e)) => {
            error_response(StatusCode::BAD_GATEWAY, "submission", "Error", &e.to_string())
        }
        Err(e @ OnboardingError::InFlight) => {
            error_response(StatusCode::CONFLICT, "in_flight", "Error", &e.to_string())
        }
        Err(e @ OnboardingError::Disposed) => {
            error_response(StatusCode::GONE, "disposed", "Error", &e.to_string())
        }
    }
}

fn error_response(status: StatusCode, error: &str, title: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "title": title,
            "message": message,
        })),
    )
        .into_response()
}

/// Build the session and onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/onboarding/name", post(set_name))
        .route("/api/onboarding/phone", post(set_phone))
        .route("/api/onboarding/submit", post(submit))
        .with_state(state)
}
