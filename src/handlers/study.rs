use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::deserialize_id;
use crate::{
    extractors::StudentGuard,
    models::Phase,
    names,
    progress::PositionalProgress,
    rejections::AppError,
    services::study::{CompleteRequest, SaveRequest, SaveResponse, SessionView, StartResponse},
    AppState,
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route(names::START_URL, post(start))
        .route(names::SAVE_URL, post(save))
        .route(names::FINISH_URL, post(finish))
        .route(names::COMPLETE_URL, post(complete))
        .route(names::SESSION_URL, get(get_session).delete(discard))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhaseBody {
    #[serde(deserialize_with = "deserialize_id")]
    assignment_id: i64,
    #[serde(deserialize_with = "deserialize_id")]
    module_id: i64,
    phase: Phase,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteBody {
    #[serde(deserialize_with = "deserialize_id")]
    assignment_id: i64,
    #[serde(deserialize_with = "deserialize_id")]
    module_id: i64,
    phase: Phase,
    #[serde(default)]
    is_review: bool,
    #[serde(default)]
    quiz_answers: Option<Value>,
    #[serde(default)]
    current_index: Option<Value>,
}

#[derive(Serialize)]
struct CompleteResponse {
    score: Option<i64>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

async fn start(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Json(body): Json<PhaseBody>,
) -> Result<Json<StartResponse>, AppError> {
    let response = state
        .study
        .start(principal, body.assignment_id, body.module_id, body.phase)
        .await?;
    Ok(Json(response))
}

async fn save(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<SaveResponse>, AppError> {
    let request = SaveRequest::from_map(body)?;
    let response = state.study.save(principal, request).await?;
    Ok(Json(response))
}

async fn finish(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Json(body): Json<PhaseBody>,
) -> Result<Json<PositionalProgress>, AppError> {
    let progress = state
        .study
        .finish(principal, body.assignment_id, body.module_id, body.phase)
        .await?;
    Ok(Json(progress))
}

async fn complete(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Json(body): Json<CompleteBody>,
) -> Result<Json<CompleteResponse>, AppError> {
    let request = CompleteRequest {
        assignment_id: body.assignment_id,
        module_id: body.module_id,
        phase: body.phase,
        is_review: body.is_review,
        quiz_answers: body.quiz_answers,
        current_index: body.current_index,
    };
    let score = state.study.complete(principal, request).await?;
    Ok(Json(CompleteResponse { score }))
}

async fn get_session(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.study.get_session(principal, session_id).await?;
    Ok(Json(session))
}

async fn discard(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<OkResponse>, AppError> {
    state.study.discard(principal, session_id).await?;
    Ok(Json(OkResponse { ok: true }))
}
