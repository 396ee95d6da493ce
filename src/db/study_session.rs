use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use sqlx::types::Json;
use sqlx::SqliteConnection;

use super::models::{SessionKey, StudySession};
use super::Db;
use crate::models::{PayloadPatch, Phase, SessionPayload, SessionStatus};
use crate::session::{plan_start, StartPlan};

pub(super) const SESSION_COLUMNS: &str = "id, student_id, assignment_id, module_id, phase, status, payload, score, created_at, updated_at, completed_at";

/// Result of opening a quiz-phase session.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedSession {
    pub session_id: i64,
    pub reused: bool,
    pub discarded: Vec<i64>,
    pub payload: SessionPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(SessionPayload),
    AlreadyCompleted,
    Missing,
}

pub(super) async fn in_progress_sessions(
    conn: &mut SqliteConnection,
    key: SessionKey,
) -> Result<Vec<StudySession>> {
    let sessions = sqlx::query_as::<_, StudySession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE student_id = $1 AND assignment_id = $2 AND module_id = $3 AND status = $4 ORDER BY id"
    ))
    .bind(key.student_id)
    .bind(key.assignment_id)
    .bind(key.module_id)
    .bind(SessionStatus::InProgress)
    .fetch_all(&mut *conn)
    .await?;

    Ok(sessions)
}

/// Most recently completed session of `phase` for the triple.
pub(super) async fn last_completed_session(
    conn: &mut SqliteConnection,
    key: SessionKey,
    phase: Phase,
) -> Result<Option<StudySession>> {
    let session = sqlx::query_as::<_, StudySession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE student_id = $1 AND assignment_id = $2 AND module_id = $3 AND phase = $4 AND status = $5 ORDER BY julianday(completed_at) DESC, id DESC LIMIT 1"
    ))
    .bind(key.student_id)
    .bind(key.assignment_id)
    .bind(key.module_id)
    .bind(phase)
    .bind(SessionStatus::Completed)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(session)
}

pub(super) async fn insert_session(
    conn: &mut SqliteConnection,
    key: SessionKey,
    payload: &SessionPayload,
    now: DateTime<Utc>,
) -> Result<i64> {
    let session_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO study_sessions
            (student_id, assignment_id, module_id, phase, status, payload, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        RETURNING id
        "#,
    )
    .bind(key.student_id)
    .bind(key.assignment_id)
    .bind(key.module_id)
    .bind(payload.phase())
    .bind(SessionStatus::InProgress)
    .bind(Json(payload.to_value()))
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(session_id)
}

pub(super) async fn delete_sessions(conn: &mut SqliteConnection, session_ids: &[i64]) -> Result<()> {
    for session_id in session_ids {
        sqlx::query("DELETE FROM study_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(super) fn decode_payload(session: &StudySession) -> Result<SessionPayload> {
    SessionPayload::from_value(session.payload.0.clone())
        .map_err(|e| eyre!("session {} has a corrupt payload: {e}", session.id))
}

fn is_unique_violation(err: &color_eyre::Report) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}

impl Db {
    /// Opens the quiz-phase session for `key`, reusing the in-progress one
    /// of the same phase and discarding in-progress ones of other phases.
    /// `fresh` is only stored when a new session is created.
    pub async fn open_quiz_session(
        &self,
        key: SessionKey,
        fresh: SessionPayload,
        now: DateTime<Utc>,
    ) -> Result<OpenedSession> {
        match self.try_open_quiz_session(key, &fresh, now).await {
            // a concurrent start created the session first; pick it up
            Err(e) if is_unique_violation(&e) => {
                tracing::info!("concurrent start for {key:?}, retrying");
                self.try_open_quiz_session(key, &fresh, now).await
            }
            other => other,
        }
    }

    async fn try_open_quiz_session(
        &self,
        key: SessionKey,
        fresh: &SessionPayload,
        now: DateTime<Utc>,
    ) -> Result<OpenedSession> {
        let phase = fresh.phase();
        let mut tx = self.begin_write().await?;

        let open = in_progress_sessions(&mut *tx, key).await?;
        let opened = match plan_start(&open, phase) {
            StartPlan::Reuse {
                session_id,
                discard,
            } => {
                delete_sessions(&mut *tx, &discard).await?;
                let session = open
                    .iter()
                    .find(|s| s.id == session_id)
                    .ok_or_else(|| eyre!("planned session {session_id} vanished"))?;
                OpenedSession {
                    session_id,
                    reused: true,
                    discarded: discard,
                    payload: decode_payload(session)?,
                }
            }
            StartPlan::Create { discard } => {
                delete_sessions(&mut *tx, &discard).await?;
                let session_id = insert_session(&mut *tx, key, fresh, now).await?;
                OpenedSession {
                    session_id,
                    reused: false,
                    discarded: discard,
                    payload: fresh.clone(),
                }
            }
        };

        super::progress::ensure_progress_row(&mut *tx, key).await?;

        tx.commit().await?;

        if !opened.discarded.is_empty() {
            tracing::warn!(
                "discarded stale sessions {:?} of {key:?} before starting {phase}",
                opened.discarded
            );
        }
        tracing::info!(
            "study session {} for {key:?}: session_id={}",
            if opened.reused { "reused" } else { "created" },
            opened.session_id
        );
        Ok(opened)
    }

    pub async fn get_study_session(&self, session_id: i64) -> Result<Option<StudySession>> {
        let session = sqlx::query_as::<_, StudySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn find_in_progress_session(
        &self,
        key: SessionKey,
        phase: Phase,
    ) -> Result<Option<StudySession>> {
        let session = sqlx::query_as::<_, StudySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE student_id = $1 AND assignment_id = $2 AND module_id = $3 AND phase = $4 AND status = $5"
        ))
        .bind(key.student_id)
        .bind(key.assignment_id)
        .bind(key.module_id)
        .bind(phase)
        .bind(SessionStatus::InProgress)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Merges `patch` into the payload of an in-progress session.
    pub async fn save_session_payload(
        &self,
        session_id: i64,
        patch: PayloadPatch,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome> {
        let mut tx = self.begin_write().await?;

        let session = sqlx::query_as::<_, StudySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(session) = session else {
            return Ok(SaveOutcome::Missing);
        };
        if session.status == SessionStatus::Completed {
            return Ok(SaveOutcome::AlreadyCompleted);
        }

        let mut payload = decode_payload(&session)?;
        payload.merge(patch)?;

        sqlx::query("UPDATE study_sessions SET payload = $1, updated_at = $2 WHERE id = $3")
            .bind(Json(payload.to_value()))
            .bind(now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            "session {session_id} saved: phase={}, current_index={}",
            payload.phase(),
            payload.current_index()
        );
        Ok(SaveOutcome::Saved(payload))
    }

    /// Returns whether a session was deleted.
    pub async fn delete_study_session(&self, session_id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM study_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!("deleted study session {session_id}: {}", deleted > 0);
        Ok(deleted > 0)
    }

    /// All sessions of a triple, newest first.
    pub async fn sessions_for(&self, key: SessionKey) -> Result<Vec<StudySession>> {
        let sessions = sqlx::query_as::<_, StudySession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE student_id = $1 AND assignment_id = $2 AND module_id = $3 ORDER BY id DESC"
        ))
        .bind(key.student_id)
        .bind(key.assignment_id)
        .bind(key.module_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }
}
