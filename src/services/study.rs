use std::future::Future;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use color_eyre::Result;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::db::models::{
    Assignment, AssignmentProgress, ScoreDailyRollup, SessionKey, StudyContext, StudySession,
};
use crate::db::{CompletionAttempt, CompletionOutcome, Db, OpenedSession, SaveOutcome};
use crate::models::{
    LearningItem, PayloadError, PayloadPatch, Phase, PositionalMode, Principal, Role,
    SessionPayload, SessionStatus, StudyItem,
};
use crate::names;
use crate::progress::PositionalProgress;

// ---------------------------------------------------------------------------
// Configuration and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyConfig {
    /// Size of the frozen final-test subset.
    pub final_test_item_count: usize,
    /// Offset whose calendar day a score is rolled up under.
    pub report_offset: FixedOffset,
    /// A repeated completion within this window of the previous one is a retry.
    pub duplicate_window: Duration,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            final_test_item_count: names::DEFAULT_FINAL_TEST_ITEM_COUNT,
            report_offset: FixedOffset::east_opt(names::DEFAULT_REPORT_UTC_OFFSET_MINUTES * 60)
                .unwrap_or_else(|| Utc.fix()),
            duplicate_window: Duration::seconds(names::DEFAULT_DUPLICATE_COMPLETION_WINDOW_SECS),
        }
    }
}

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("access denied")]
    AccessDenied,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] color_eyre::Report),
}

impl From<PayloadError> for StudyError {
    fn from(e: PayloadError) -> Self {
        StudyError::Validation(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// StudyRepository trait (the store operations the service depends on)
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait StudyRepository: Send + Sync {
    fn study_context(
        &self,
        student_id: i64,
        assignment_id: i64,
        module_id: i64,
    ) -> impl Future<Output = Result<Option<StudyContext>>> + Send;

    fn module_items(&self, module_id: i64) -> impl Future<Output = Result<Vec<LearningItem>>> + Send;

    fn get_assignment(
        &self,
        assignment_id: i64,
    ) -> impl Future<Output = Result<Option<Assignment>>> + Send;

    fn is_enrolled(&self, student_id: i64, class_id: i64) -> impl Future<Output = Result<bool>> + Send;

    fn open_quiz_session(
        &self,
        key: SessionKey,
        fresh: SessionPayload,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<OpenedSession>> + Send;

    fn get_study_session(
        &self,
        session_id: i64,
    ) -> impl Future<Output = Result<Option<StudySession>>> + Send;

    fn find_in_progress_session(
        &self,
        key: SessionKey,
        phase: Phase,
    ) -> impl Future<Output = Result<Option<StudySession>>> + Send;

    fn save_session_payload(
        &self,
        session_id: i64,
        patch: PayloadPatch,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<SaveOutcome>> + Send;

    fn delete_study_session(&self, session_id: i64) -> impl Future<Output = Result<bool>> + Send;

    fn advance_progress(
        &self,
        key: SessionKey,
        mode: PositionalMode,
        current_index: i64,
        total: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<PositionalProgress>> + Send;

    fn finish_progress(
        &self,
        key: SessionKey,
        mode: PositionalMode,
        total: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<PositionalProgress>> + Send;

    fn get_progress(
        &self,
        key: SessionKey,
    ) -> impl Future<Output = Result<Option<AssignmentProgress>>> + Send;

    fn progress_for_assignment(
        &self,
        student_id: i64,
        assignment_id: i64,
    ) -> impl Future<Output = Result<Vec<AssignmentProgress>>> + Send;

    fn complete_attempt(
        &self,
        attempt: CompletionAttempt,
    ) -> impl Future<Output = Result<CompletionOutcome>> + Send;

    fn daily_rollups(
        &self,
        student_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ScoreDailyRollup>>> + Send;
}

impl StudyRepository for Db {
    fn study_context(
        &self,
        student_id: i64,
        assignment_id: i64,
        module_id: i64,
    ) -> impl Future<Output = Result<Option<StudyContext>>> + Send {
        Db::study_context(self, student_id, assignment_id, module_id)
    }

    fn module_items(&self, module_id: i64) -> impl Future<Output = Result<Vec<LearningItem>>> + Send {
        Db::module_items(self, module_id)
    }

    fn get_assignment(
        &self,
        assignment_id: i64,
    ) -> impl Future<Output = Result<Option<Assignment>>> + Send {
        Db::get_assignment(self, assignment_id)
    }

    fn is_enrolled(&self, student_id: i64, class_id: i64) -> impl Future<Output = Result<bool>> + Send {
        Db::is_enrolled(self, student_id, class_id)
    }

    fn open_quiz_session(
        &self,
        key: SessionKey,
        fresh: SessionPayload,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<OpenedSession>> + Send {
        Db::open_quiz_session(self, key, fresh, now)
    }

    fn get_study_session(
        &self,
        session_id: i64,
    ) -> impl Future<Output = Result<Option<StudySession>>> + Send {
        Db::get_study_session(self, session_id)
    }

    fn find_in_progress_session(
        &self,
        key: SessionKey,
        phase: Phase,
    ) -> impl Future<Output = Result<Option<StudySession>>> + Send {
        Db::find_in_progress_session(self, key, phase)
    }

    fn save_session_payload(
        &self,
        session_id: i64,
        patch: PayloadPatch,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<SaveOutcome>> + Send {
        Db::save_session_payload(self, session_id, patch, now)
    }

    fn delete_study_session(&self, session_id: i64) -> impl Future<Output = Result<bool>> + Send {
        Db::delete_study_session(self, session_id)
    }

    fn advance_progress(
        &self,
        key: SessionKey,
        mode: PositionalMode,
        current_index: i64,
        total: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<PositionalProgress>> + Send {
        Db::advance_progress(self, key, mode, current_index, total, now)
    }

    fn finish_progress(
        &self,
        key: SessionKey,
        mode: PositionalMode,
        total: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<PositionalProgress>> + Send {
        Db::finish_progress(self, key, mode, total, now)
    }

    fn get_progress(
        &self,
        key: SessionKey,
    ) -> impl Future<Output = Result<Option<AssignmentProgress>>> + Send {
        Db::get_progress(self, key)
    }

    fn progress_for_assignment(
        &self,
        student_id: i64,
        assignment_id: i64,
    ) -> impl Future<Output = Result<Vec<AssignmentProgress>>> + Send {
        Db::progress_for_assignment(self, student_id, assignment_id)
    }

    fn complete_attempt(
        &self,
        attempt: CompletionAttempt,
    ) -> impl Future<Output = Result<CompletionOutcome>> + Send {
        Db::complete_attempt(self, attempt)
    }

    fn daily_rollups(
        &self,
        student_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ScoreDailyRollup>>> + Send {
        Db::daily_rollups(self, student_id, from, to)
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    /// `None` for the view phases, which carry no session.
    pub session_id: Option<i64>,
    pub phase: Phase,
    pub items: Vec<StudyItem>,
    pub progress: Option<AssignmentProgress>,
}

/// Which session a save applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTarget {
    Session(i64),
    Module {
        assignment_id: i64,
        module_id: i64,
        phase: Phase,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub target: SaveTarget,
    pub patch: PayloadPatch,
}

impl SaveRequest {
    /// Splits a save body into its target and the payload keys to merge.
    /// The body either names a `sessionId` or an `assignmentId`, `moduleId`
    /// and `phase`; every other key is payload.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, StudyError> {
        let session_id = take_id(&mut map, "sessionId")?;
        let assignment_id = take_id(&mut map, "assignmentId")?;
        let module_id = take_id(&mut map, "moduleId")?;
        let patch = PayloadPatch::from_map(map)?;

        let target = match (session_id, assignment_id, module_id, patch.phase) {
            (Some(session_id), _, _, _) => SaveTarget::Session(session_id),
            (None, Some(assignment_id), Some(module_id), Some(phase)) => SaveTarget::Module {
                assignment_id,
                module_id,
                phase,
            },
            _ => {
                return Err(StudyError::Validation(
                    "either sessionId or assignmentId, moduleId and phase are required".to_string(),
                ))
            }
        };

        Ok(Self { target, patch })
    }
}

fn take_id(map: &mut Map<String, Value>, key: &'static str) -> Result<Option<i64>, StudyError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| StudyError::Validation(format!("{key} must be an integer"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StudyError::Validation(format!("{key} must be an integer"))),
        Some(_) => Err(StudyError::Validation(format!("{key} must be an integer"))),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub progress: Option<PositionalProgress>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompleteRequest {
    pub assignment_id: i64,
    pub module_id: i64,
    pub phase: Phase,
    pub is_review: bool,
    pub quiz_answers: Option<Value>,
    pub current_index: Option<Value>,
}

/// A session as returned to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: i64,
    pub assignment_id: i64,
    pub module_id: i64,
    pub phase: Phase,
    pub status: SessionStatus,
    pub payload: Value,
    pub score: Option<i64>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<StudySession> for SessionView {
    fn from(session: StudySession) -> Self {
        Self {
            id: session.id,
            assignment_id: session.assignment_id,
            module_id: session.module_id,
            phase: session.phase,
            status: session.status,
            payload: session.payload.0,
            score: session.score,
            updated_at: session.updated_at,
            completed_at: session.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Final-test selection
// ---------------------------------------------------------------------------

/// Picks the final-test subset of a module. The selection is a pure
/// function of `seed`, so a session synthesized at completion time sees the
/// same items the student was shown.
pub fn select_final_test_items(items: &[StudyItem], count: usize, seed: u64) -> Vec<StudyItem> {
    let mut selected = items.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    selected.shuffle(&mut rng);
    selected.truncate(count);
    selected
}

fn final_test_seed(key: SessionKey) -> u64 {
    let mix = |acc: u64, v: i64| acc.rotate_left(21) ^ (v as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    [key.student_id, key.assignment_id, key.module_id]
        .into_iter()
        .fold(0, mix)
}

// ---------------------------------------------------------------------------
// StudyService
// ---------------------------------------------------------------------------

pub struct StudyService<R: StudyRepository = Db> {
    repo: R,
    config: StudyConfig,
}

impl<R: StudyRepository + Clone> Clone for StudyService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            config: self.config,
        }
    }
}

impl<R: StudyRepository> StudyService<R> {
    pub fn new(repo: R, config: StudyConfig) -> Self {
        Self { repo, config }
    }

    /// Resolves the context of a module of an assignment and checks that
    /// the principal may study it.
    async fn authorize(
        &self,
        principal: Principal,
        assignment_id: i64,
        module_id: i64,
    ) -> Result<StudyContext, StudyError> {
        ensure_student(principal)?;

        let context = self
            .repo
            .study_context(principal.student_id, assignment_id, module_id)
            .await?
            .ok_or(StudyError::NotFound("assignment or module"))?;

        if !context.module_assigned || !context.student_enrolled {
            tracing::warn!(
                "student {} denied module {module_id} of assignment {assignment_id}: assigned={}, enrolled={}",
                principal.student_id,
                context.module_assigned,
                context.student_enrolled
            );
            return Err(StudyError::AccessDenied);
        }

        Ok(context)
    }

    async fn owned_session(
        &self,
        principal: Principal,
        session_id: i64,
    ) -> Result<StudySession, StudyError> {
        ensure_student(principal)?;

        let session = self
            .repo
            .get_study_session(session_id)
            .await?
            .ok_or(StudyError::NotFound("session"))?;

        if session.student_id != principal.student_id {
            tracing::warn!(
                "student {} tried to access session {session_id} of student {}",
                principal.student_id,
                session.student_id
            );
            return Err(StudyError::AccessDenied);
        }

        Ok(session)
    }

    async fn study_items(&self, module_id: i64) -> Result<Vec<StudyItem>, StudyError> {
        let items = self.repo.module_items(module_id).await?;
        Ok(items.iter().map(StudyItem::from).collect())
    }

    fn fresh_payload(&self, key: SessionKey, phase: Phase, items: &[StudyItem]) -> SessionPayload {
        match phase {
            Phase::FinalTest => SessionPayload::new(
                phase,
                select_final_test_items(items, self.config.final_test_item_count, final_test_seed(key)),
            ),
            _ => SessionPayload::new(phase, Vec::new()),
        }
    }

    pub async fn start(
        &self,
        principal: Principal,
        assignment_id: i64,
        module_id: i64,
        phase: Phase,
    ) -> Result<StartResponse, StudyError> {
        self.authorize(principal, assignment_id, module_id).await?;
        let key = SessionKey {
            student_id: principal.student_id,
            assignment_id,
            module_id,
        };
        let items = self.study_items(module_id).await?;

        if !phase.is_quiz() {
            let progress = self.repo.get_progress(key).await?;
            return Ok(StartResponse {
                session_id: None,
                phase,
                items,
                progress,
            });
        }

        let fresh = self.fresh_payload(key, phase, &items);
        let opened = self.repo.open_quiz_session(key, fresh, Utc::now()).await?;
        let items = match opened.payload.final_test_items() {
            Some(snapshot) => snapshot.to_vec(),
            None => items,
        };
        let progress = self.repo.get_progress(key).await?;

        Ok(StartResponse {
            session_id: Some(opened.session_id),
            phase,
            items,
            progress,
        })
    }

    pub async fn save(
        &self,
        principal: Principal,
        request: SaveRequest,
    ) -> Result<SaveResponse, StudyError> {
        let SaveRequest { target, patch } = request;
        let now = Utc::now();

        let (session_id, key) = match target {
            SaveTarget::Session(session_id) => {
                let session = self.owned_session(principal, session_id).await?;
                let key = SessionKey {
                    student_id: session.student_id,
                    assignment_id: session.assignment_id,
                    module_id: session.module_id,
                };
                (session_id, key)
            }
            SaveTarget::Module {
                assignment_id,
                module_id,
                phase,
            } => {
                self.authorize(principal, assignment_id, module_id).await?;
                let key = SessionKey {
                    student_id: principal.student_id,
                    assignment_id,
                    module_id,
                };

                if let Some(mode) = phase.positional_mode() {
                    let progress = match patch.current_index {
                        Some(index) => Some(self.advance(key, mode, index, now).await?),
                        None => None,
                    };
                    return Ok(SaveResponse { ok: true, progress });
                }

                let session = self
                    .repo
                    .find_in_progress_session(key, phase)
                    .await?
                    .ok_or(StudyError::NotFound("session"))?;
                (session.id, key)
            }
        };

        match self.repo.save_session_payload(session_id, patch, now).await? {
            SaveOutcome::Saved(payload) => {
                let progress = match payload.phase().positional_mode() {
                    Some(mode) => Some(self.advance(key, mode, payload.current_index(), now).await?),
                    None => None,
                };
                Ok(SaveResponse { ok: true, progress })
            }
            SaveOutcome::AlreadyCompleted => {
                tracing::warn!("save for completed session {session_id} ignored");
                Ok(SaveResponse {
                    ok: true,
                    progress: None,
                })
            }
            SaveOutcome::Missing => Err(StudyError::NotFound("session")),
        }
    }

    async fn advance(
        &self,
        key: SessionKey,
        mode: PositionalMode,
        current_index: i64,
        now: DateTime<Utc>,
    ) -> Result<PositionalProgress, StudyError> {
        let total = self.repo.module_items(key.module_id).await?.len() as i64;
        let progress = self
            .repo
            .advance_progress(key, mode, current_index, total, now)
            .await?;
        Ok(progress)
    }

    /// Marks a view phase as fully seen.
    pub async fn finish(
        &self,
        principal: Principal,
        assignment_id: i64,
        module_id: i64,
        phase: Phase,
    ) -> Result<PositionalProgress, StudyError> {
        let mode = phase.positional_mode().ok_or_else(|| {
            StudyError::Validation(format!("{phase} is finished by completing it"))
        })?;
        self.authorize(principal, assignment_id, module_id).await?;

        let key = SessionKey {
            student_id: principal.student_id,
            assignment_id,
            module_id,
        };
        let total = self.repo.module_items(module_id).await?.len() as i64;
        let progress = self
            .repo
            .finish_progress(key, mode, total, Utc::now())
            .await?;
        Ok(progress)
    }

    /// Scores and closes an attempt. `None` when nothing is scored.
    pub async fn complete(
        &self,
        principal: Principal,
        request: CompleteRequest,
    ) -> Result<Option<i64>, StudyError> {
        let CompleteRequest {
            assignment_id,
            module_id,
            phase,
            is_review,
            quiz_answers,
            current_index,
        } = request;

        let context = self.authorize(principal, assignment_id, module_id).await?;

        if !phase.is_quiz() {
            tracing::warn!(
                "complete called for view phase {phase} of module {module_id}, use finish instead"
            );
            return Ok(None);
        }

        let mut fields = Map::new();
        if let Some(answers) = quiz_answers {
            fields.insert("quizAnswers".to_string(), answers);
        }
        if let Some(index) = current_index {
            fields.insert("currentIndex".to_string(), index);
        }
        let mut patch = PayloadPatch::from_map(fields)?;
        patch.phase = Some(phase);

        let key = SessionKey {
            student_id: principal.student_id,
            assignment_id,
            module_id,
        };
        let module_items = self.study_items(module_id).await?;
        let fallback = self.fresh_payload(key, phase, &module_items);

        let attempt = CompletionAttempt {
            key,
            phase,
            is_review,
            patch,
            fallback,
            module_items,
            campus_id: context.campus_id,
            class_id: context.class_id,
            carries_score: context.module_type.carries_score(),
            now: Utc::now(),
            duplicate_window: self.config.duplicate_window,
            report_offset: self.config.report_offset,
        };

        let outcome = self.repo.complete_attempt(attempt).await?;
        Ok(outcome.score)
    }

    pub async fn get_session(
        &self,
        principal: Principal,
        session_id: i64,
    ) -> Result<SessionView, StudyError> {
        let session = self.owned_session(principal, session_id).await?;
        Ok(SessionView::from(session))
    }

    /// Deletes a session of the caller so the phase can be restarted.
    pub async fn discard(&self, principal: Principal, session_id: i64) -> Result<(), StudyError> {
        self.owned_session(principal, session_id).await?;

        if !self.repo.delete_study_session(session_id).await? {
            return Err(StudyError::NotFound("session"));
        }
        tracing::info!(
            "student {} discarded session {session_id}",
            principal.student_id
        );
        Ok(())
    }

    pub async fn assignment_progress(
        &self,
        principal: Principal,
        assignment_id: i64,
    ) -> Result<Vec<AssignmentProgress>, StudyError> {
        ensure_student(principal)?;

        let assignment = self
            .repo
            .get_assignment(assignment_id)
            .await?
            .ok_or(StudyError::NotFound("assignment"))?;
        if !self
            .repo
            .is_enrolled(principal.student_id, assignment.class_id)
            .await?
        {
            return Err(StudyError::AccessDenied);
        }

        let progress = self
            .repo
            .progress_for_assignment(principal.student_id, assignment_id)
            .await?;
        Ok(progress)
    }

    pub async fn daily_scores(
        &self,
        principal: Principal,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScoreDailyRollup>, StudyError> {
        ensure_student(principal)?;
        if from > to {
            return Err(StudyError::Validation(format!(
                "range start {from} is after its end {to}"
            )));
        }

        let rollups = self
            .repo
            .daily_rollups(principal.student_id, from, to)
            .await?;
        Ok(rollups)
    }
}

fn ensure_student(principal: Principal) -> Result<(), StudyError> {
    if principal.role != Role::Student {
        tracing::warn!(
            "{:?} principal {} attempted a study operation",
            principal.role,
            principal.student_id
        );
        return Err(StudyError::AccessDenied);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
