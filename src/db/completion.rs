use chrono::{DateTime, Duration, FixedOffset, Utc};
use color_eyre::{eyre::eyre, Result};
use sqlx::types::Json;

use super::models::SessionKey;
use super::score::{record_score, ScoreRecord};
use super::study_session::{
    decode_payload, delete_sessions, in_progress_sessions, insert_session, last_completed_session,
};
use super::Db;
use crate::models::{ActivityType, PayloadPatch, Phase, SessionPayload, SessionStatus, StudyItem};
use crate::scoring;
use crate::session::{plan_completion, CompletionPlan};

/// Everything `complete` needs, resolved by the caller before the
/// transaction starts.
#[derive(Debug, Clone)]
pub struct CompletionAttempt {
    pub key: SessionKey,
    pub phase: Phase,
    pub is_review: bool,
    /// Request-supplied answers and position; they win over stored ones.
    pub patch: PayloadPatch,
    /// Payload to open with when no usable session exists.
    pub fallback: SessionPayload,
    /// Authoritative items, used unless the payload carries a snapshot.
    pub module_items: Vec<StudyItem>,
    pub campus_id: i64,
    pub class_id: i64,
    pub carries_score: bool,
    pub now: DateTime<Utc>,
    pub duplicate_window: Duration,
    pub report_offset: FixedOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub session_id: i64,
    pub score: Option<i64>,
    /// The attempt had already been completed; nothing was written.
    pub duplicate: bool,
}

impl Db {
    /// Resolves, scores and closes a quiz-phase attempt. The session update,
    /// the completion flag, the score log and the rollup commit together.
    pub async fn complete_attempt(&self, attempt: CompletionAttempt) -> Result<CompletionOutcome> {
        let CompletionAttempt {
            key,
            phase,
            is_review,
            patch,
            fallback,
            module_items,
            campus_id,
            class_id,
            carries_score,
            now,
            duplicate_window,
            report_offset,
        } = attempt;

        let mut tx = self.begin_write().await?;

        let open = in_progress_sessions(&mut *tx, key).await?;
        let last_completed = last_completed_session(&mut *tx, key, phase).await?;
        let plan = plan_completion(&open, last_completed.as_ref(), phase, now, duplicate_window);

        let (session_id, mut payload) = match plan {
            CompletionPlan::AlreadyCompleted { session_id, score } => {
                tx.commit().await?;
                tracing::info!(
                    "completion for {key:?} {phase} repeats session {session_id}, nothing recorded"
                );
                return Ok(CompletionOutcome {
                    session_id,
                    score,
                    duplicate: true,
                });
            }
            CompletionPlan::Complete { session_id } => {
                let session = open
                    .iter()
                    .find(|s| s.id == session_id)
                    .ok_or_else(|| eyre!("planned session {session_id} vanished"))?;
                (session_id, decode_payload(session)?)
            }
            CompletionPlan::Synthesize { discard } => {
                if !discard.is_empty() {
                    tracing::warn!(
                        "discarding stale sessions {discard:?} of {key:?} before completing {phase}"
                    );
                    delete_sessions(&mut *tx, &discard).await?;
                }
                let session_id = insert_session(&mut *tx, key, &fallback, now).await?;
                tracing::warn!("no session to complete for {key:?} {phase}, opened {session_id}");
                (session_id, fallback)
            }
        };

        payload.merge(patch)?;

        let score = if carries_score {
            let items = payload.final_test_items().unwrap_or(module_items.as_slice());
            let answers = payload.answers().cloned().unwrap_or_default();
            Some(i64::from(scoring::score(items, &answers)))
        } else {
            None
        };

        let updated = sqlx::query(
            r#"
            UPDATE study_sessions
            SET status = $1, payload = $2, score = $3, completed_at = $4, updated_at = $4
            WHERE id = $5 AND status = $6
            "#,
        )
        .bind(SessionStatus::Completed)
        .bind(Json(payload.to_value()))
        .bind(score)
        .bind(now)
        .bind(session_id)
        .bind(SessionStatus::InProgress)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // another request closed the session between our read and this write
        if updated == 0 {
            tx.rollback().await?;
            tracing::info!("session {session_id} was completed concurrently, nothing recorded");
            return Ok(CompletionOutcome {
                session_id,
                score,
                duplicate: true,
            });
        }

        if !is_review {
            super::progress::mark_completed(&mut *tx, key, now).await?;
        }

        if let Some(score) = score {
            let record = ScoreRecord {
                student_id: key.student_id,
                campus_id,
                class_id,
                session_id: Some(session_id),
                activity_type: ActivityType::from_phase(phase, is_review),
                score,
                at: now,
            };
            record_score(&mut *tx, record, report_offset).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "session {session_id} completed for {key:?}: phase={phase}, review={is_review}, score={score:?}"
        );
        Ok(CompletionOutcome {
            session_id,
            score,
            duplicate: false,
        })
    }
}
