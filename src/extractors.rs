use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;

use crate::{models::Principal, names, rejections::{AppError, ResultExt}, AppState};

/// Guard extractor that resolves the student session cookie against the
/// database. Carries the caller's principal; the role is checked by the
/// study service.
pub struct StudentGuard(pub Principal);

impl FromRequestParts<AppState> for StudentGuard {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let Some(token) = jar
            .get(names::STUDENT_SESSION_COOKIE_NAME)
            .map(|c| c.value().to_string())
        else {
            return Err(AppError::Unauthorized);
        };

        let principal = state
            .db
            .get_principal_by_session(&token)
            .await
            .reject("could not resolve login session")?;

        principal.map(StudentGuard).ok_or(AppError::Unauthorized)
    }
}
