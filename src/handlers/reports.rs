use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    db::models::{AssignmentProgress, ScoreDailyRollup},
    extractors::StudentGuard,
    names,
    rejections::AppError,
    AppState,
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route(names::ASSIGNMENT_PROGRESS_URL, get(assignment_progress))
        .route(names::DAILY_SCORES_URL, get(daily_scores))
}

#[derive(Deserialize)]
struct RangeQuery {
    from: NaiveDate,
    to: NaiveDate,
}

async fn assignment_progress(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Path(assignment_id): Path<i64>,
) -> Result<Json<Vec<AssignmentProgress>>, AppError> {
    let progress = state
        .study
        .assignment_progress(principal, assignment_id)
        .await?;
    Ok(Json(progress))
}

async fn daily_scores(
    StudentGuard(principal): StudentGuard,
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<ScoreDailyRollup>>, AppError> {
    let rollups = state
        .study
        .daily_scores(principal, range.from, range.to)
        .await?;
    Ok(Json(rollups))
}
