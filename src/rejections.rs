use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::study::StudyError;

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    Forbidden,
    NotFound(&'static str),
    Input(String),
    Internal(&'static str),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Input(_) => (StatusCode::BAD_REQUEST, "INPUT_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Unauthorized => "login required".to_string(),
            AppError::Forbidden => "access denied".to_string(),
            AppError::NotFound(what) => format!("{what} not found"),
            AppError::Input(message) => message.clone(),
            AppError::Internal(message) => (*message).to_string(),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<StudyError> for AppError {
    fn from(err: StudyError) -> Self {
        match err {
            StudyError::AccessDenied => AppError::Forbidden,
            StudyError::NotFound(what) => AppError::NotFound(what),
            StudyError::Validation(message) => AppError::Input(message),
            StudyError::Store(report) => {
                tracing::error!("study operation failed: {report:?}");
                AppError::Internal("something went wrong, please retry")
            }
        }
    }
}

pub trait ResultExt<T> {
    /// Logs the error and turns it into an internal error with `message`.
    fn reject(self, message: &'static str) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for color_eyre::Result<T> {
    fn reject(self, message: &'static str) -> Result<T, AppError> {
        self.map_err(|e| {
            tracing::error!("{message}: {e:?}");
            AppError::Internal(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::eyre::eyre;

    use super::*;

    #[test]
    fn study_errors_map_to_their_status() {
        let cases = [
            (StudyError::AccessDenied, StatusCode::FORBIDDEN),
            (StudyError::NotFound("session"), StatusCode::NOT_FOUND),
            (
                StudyError::Validation("bad index".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (StudyError::Store(eyre!("disk full")), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn reject_hides_the_underlying_report() {
        let result: color_eyre::Result<()> = Err(eyre!("connection reset by peer"));
        let err = result.reject("could not load session").unwrap_err();
        assert!(matches!(err, AppError::Internal("could not load session")));
    }
}
