pub mod db;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod names;
pub mod progress;
pub mod rejections;
pub mod scoring;
pub mod services;
pub mod session;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::services::study::{StudyConfig, StudyService};

#[derive(Clone)]
pub struct AppState {
    pub db: db::Db,
    pub study: StudyService,
}

impl AppState {
    pub fn new(db: db::Db, config: StudyConfig) -> Self {
        Self {
            study: StudyService::new(db.clone(), config),
            db,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::study::routes())
        .merge(handlers::reports::routes())
        .layer(middleware::from_fn(json_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Rejects state-changing requests that do not declare a JSON body.
async fn json_check(
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    use axum::http::{header, Method, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;

    let state_changing = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

    if state_changing.contains(req.method()) {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if !is_json {
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "error": "JSON_REQUIRED",
                    "message": "JSON body required",
                })),
            )
                .into_response();
        }
    }

    next.run(req).await
}
