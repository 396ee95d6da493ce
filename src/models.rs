// Domain models shared by the store, the services and the HTTP layer

mod answers;
mod item;
mod payload;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use answers::QuizAnswers;
pub use item::{ItemError, LearningItem, NewItem, StudyItem};
pub use payload::{PayloadError, PayloadPatch, PhaseState, SessionPayload};

/// Phase of a learning module a study session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Phase {
    Wordlist,
    Memorization,
    Test,
    #[serde(rename = "finaltest")]
    #[sqlx(rename = "finaltest")]
    FinalTest,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Wordlist => "wordlist",
            Phase::Memorization => "memorization",
            Phase::Test => "test",
            Phase::FinalTest => "finaltest",
        }
    }

    /// Quiz phases are the ones that are scored and tracked with a session.
    pub fn is_quiz(&self) -> bool {
        matches!(self, Phase::Test | Phase::FinalTest)
    }

    /// The progress columns a view phase advances, `None` for quiz phases.
    pub fn positional_mode(&self) -> Option<PositionalMode> {
        match self {
            Phase::Wordlist => Some(PositionalMode::Wordlist),
            Phase::Memorization => Some(PositionalMode::Memorize),
            Phase::Test | Phase::FinalTest => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wordlist" => Ok(Phase::Wordlist),
            "memorization" => Ok(Phase::Memorization),
            "test" => Ok(Phase::Test),
            "finaltest" => Ok(Phase::FinalTest),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleType {
    PairText,
    PairImage,
}

impl ModuleType {
    /// Whether completing a quiz phase of this module produces a score.
    pub fn carries_score(&self) -> bool {
        match self {
            ModuleType::PairText | ModuleType::PairImage => true,
        }
    }
}

/// Which pair of progress columns a view phase updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionalMode {
    Wordlist,
    Memorize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Learning,
    Review,
    FinalTest,
    FinalTestReview,
}

impl ActivityType {
    pub fn from_phase(phase: Phase, is_review: bool) -> Self {
        match (phase, is_review) {
            (Phase::FinalTest, false) => ActivityType::FinalTest,
            (Phase::FinalTest, true) => ActivityType::FinalTestReview,
            (_, false) => ActivityType::Learning,
            (_, true) => ActivityType::Review,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentStatus {
    Active,
    Inactive,
}

/// The authenticated caller, resolved before any study operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct Principal {
    pub student_id: i64,
    pub role: Role,
}
