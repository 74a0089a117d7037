//! HTTP endpoint handlers. These are thin wrappers that forward intents to the
//! session. Each handler is instrumented; accepted intents answer with the
//! session snapshot, rejected ones with a status and a message.

use std::sync::Arc;
use axum::{extract::State, http::StatusCode, response::{IntoResponse, Response}, Json};
use tracing::{info, instrument, warn};

use crate::domain::SubjectInfo;
use crate::error::IntentError;
use crate::protocol::*;
use crate::state::AppState;

impl IntoResponse for IntentError {
  fn into_response(self) -> Response {
    let status = match &self {
      IntentError::WrongPhase { .. } => StatusCode::CONFLICT,
      _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    warn!(target: "exam", %status, error = %self, "Intent rejected");
    (status, Json(ErrorOut { message: self.to_string() })).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info")]
pub async fn http_get_schemes() -> impl IntoResponse { Json(SchemesOut::current()) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.view().await)
}

#[instrument(level = "info", skip(state, body), fields(scheme = %body.scheme, subject_len = body.subject.len()))]
pub async fn http_post_setup(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubjectInfo>,
) -> Result<impl IntoResponse, IntentError> {
  let session = state.submit_setup(body).await?.detach();
  info!(target: "exam", generation = session.generation, "HTTP setup accepted");
  Ok((StatusCode::ACCEPTED, Json(session)))
}

#[instrument(level = "info", skip(state, body), fields(question = %body.question_number, text_len = body.text.len()))]
pub async fn http_put_answer(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnswerIn>,
) -> Result<impl IntoResponse, IntentError> {
  let out = state.update_answer(&body.question_number, body.text).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> Result<impl IntoResponse, IntentError> {
  let session = state.submit_answers(body.answers).await?.detach();
  info!(target: "exam", generation = session.generation, "HTTP submit accepted");
  Ok((StatusCode::ACCEPTED, Json(session)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_restart(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.restart().await)
}
