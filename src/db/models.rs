// Database model structs

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::types::Json;

use crate::models::{ActivityType, ModuleType, Phase, SessionStatus};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudySession {
    pub id: i64,
    pub student_id: i64,
    pub assignment_id: i64,
    pub module_id: i64,
    pub phase: Phase,
    pub status: SessionStatus,
    pub payload: Json<serde_json::Value>,
    pub score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Everything needed to authorize and attribute work on one module of one
/// assignment for one student.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StudyContext {
    pub assignment_id: i64,
    pub class_id: i64,
    pub campus_id: i64,
    pub module_id: i64,
    pub module_type: ModuleType,
    pub module_assigned: bool,
    pub student_enrolled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentProgress {
    pub student_id: i64,
    pub assignment_id: i64,
    pub module_id: i64,
    pub wordlist_max_index: Option<i64>,
    pub wordlist_progress_pct: i64,
    pub memorize_max_index: Option<i64>,
    pub memorize_progress_pct: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScoreLogEntry {
    pub id: i64,
    pub student_id: i64,
    pub campus_id: i64,
    pub class_id: i64,
    pub session_id: Option<i64>,
    pub activity_type: ActivityType,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDailyRollup {
    pub day: NaiveDate,
    pub campus_id: i64,
    pub class_id: i64,
    pub student_id: i64,
    pub total_score: i64,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LearningModule {
    pub id: i64,
    pub name: String,
    pub module_type: ModuleType,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Assignment {
    pub id: i64,
    pub class_id: i64,
    pub assigned_on: NaiveDate,
}

/// Identifies one module of one assignment as studied by one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub student_id: i64,
    pub assignment_id: i64,
    pub module_id: i64,
}
