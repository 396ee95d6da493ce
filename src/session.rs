// Transition rules of the study session state machine.
//
// The store executes these plans inside a transaction; keeping the
// decisions here makes them testable without a database.

use chrono::{DateTime, Duration, Utc};

use crate::db::models::StudySession;
use crate::models::{Phase, SessionStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPlan {
    /// An in-progress session for the phase exists; hand it back.
    Reuse { session_id: i64, discard: Vec<i64> },
    /// No session for the phase; open a new one.
    Create { discard: Vec<i64> },
}

/// Decide what `start` does given the in-progress sessions of one
/// (student, assignment, module). In-progress sessions of any other phase
/// are stale and get discarded.
pub fn plan_start(in_progress: &[StudySession], phase: Phase) -> StartPlan {
    let discard = in_progress
        .iter()
        .filter(|s| s.phase != phase)
        .map(|s| s.id)
        .collect();

    match in_progress.iter().find(|s| s.phase == phase) {
        Some(session) => StartPlan::Reuse {
            session_id: session.id,
            discard,
        },
        None => StartPlan::Create { discard },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionPlan {
    /// Score and close this in-progress session.
    Complete { session_id: i64 },
    /// The attempt was already completed moments ago; report its score.
    AlreadyCompleted { session_id: i64, score: Option<i64> },
    /// No usable session: drop stale sessions of other phases, then open one
    /// from the request and complete it.
    Synthesize { discard: Vec<i64> },
}

/// Decide which session `complete` acts on.
///
/// `open` holds the in-progress sessions of one (student, assignment,
/// module) and `last_completed` the most recently completed session of the
/// requested phase. Resolution order: the in-progress session of the phase;
/// else a completion of the phase within `duplicate_window`, which makes the
/// request a retry that touches nothing; else a new session. The client may
/// have lost its session after a disconnect, so a missing session never
/// blocks a submission.
pub fn plan_completion(
    open: &[StudySession],
    last_completed: Option<&StudySession>,
    phase: Phase,
    now: DateTime<Utc>,
    duplicate_window: Duration,
) -> CompletionPlan {
    if let Some(session) = open.iter().find(|s| s.phase == phase) {
        return CompletionPlan::Complete {
            session_id: session.id,
        };
    }

    let retry = last_completed.filter(|s| {
        s.phase == phase
            && s.status == SessionStatus::Completed
            && s.completed_at.is_some_and(|at| now - at <= duplicate_window)
    });
    if let Some(session) = retry {
        return CompletionPlan::AlreadyCompleted {
            session_id: session.id,
            score: session.score,
        };
    }

    CompletionPlan::Synthesize {
        discard: open.iter().map(|s| s.id).collect(),
    }
}
