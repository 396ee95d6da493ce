use serde_json::{Map, Value};
use thiserror::Error;

use super::{Phase, QuizAnswers, StudyItem};

const PHASE_KEY: &str = "phase";
const CURRENT_INDEX_KEY: &str = "currentIndex";
const QUIZ_ANSWERS_KEY: &str = "quizAnswers";
const FINAL_TEST_ITEMS_KEY: &str = "finalTestItems";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("payload has no valid phase")]
    MissingPhase,
    #[error("currentIndex must be a non-negative integer")]
    InvalidCurrentIndex,
    #[error("finalTestItems is frozen when the final test starts")]
    FrozenItems,
    #[error("cannot move a {from} session to phase {to}")]
    PhaseChange { from: Phase, to: Phase },
}

/// Phase-specific part of a session payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseState {
    Wordlist {
        current_index: i64,
    },
    Memorization {
        current_index: i64,
    },
    Test {
        current_index: i64,
        answers: QuizAnswers,
    },
    FinalTest {
        current_index: i64,
        answers: QuizAnswers,
        items: Vec<StudyItem>,
    },
}

/// The payload of a study session: the typed phase state plus whatever
/// other keys clients have stored alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPayload {
    pub state: PhaseState,
    pub extra: Map<String, Value>,
}

/// A partial payload sent by a client. Present fields overwrite, absent
/// fields leave the stored payload alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadPatch {
    pub phase: Option<Phase>,
    pub current_index: Option<i64>,
    pub quiz_answers: Option<QuizAnswers>,
    pub extra: Map<String, Value>,
}

impl SessionPayload {
    /// Fresh payload for a phase. `items` is only kept for the final test.
    pub fn new(phase: Phase, items: Vec<StudyItem>) -> Self {
        let state = match phase {
            Phase::Wordlist => PhaseState::Wordlist { current_index: 0 },
            Phase::Memorization => PhaseState::Memorization { current_index: 0 },
            Phase::Test => PhaseState::Test {
                current_index: 0,
                answers: QuizAnswers::new(),
            },
            Phase::FinalTest => PhaseState::FinalTest {
                current_index: 0,
                answers: QuizAnswers::new(),
                items,
            },
        };
        Self {
            state,
            extra: Map::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            PhaseState::Wordlist { .. } => Phase::Wordlist,
            PhaseState::Memorization { .. } => Phase::Memorization,
            PhaseState::Test { .. } => Phase::Test,
            PhaseState::FinalTest { .. } => Phase::FinalTest,
        }
    }

    pub fn current_index(&self) -> i64 {
        match &self.state {
            PhaseState::Wordlist { current_index }
            | PhaseState::Memorization { current_index }
            | PhaseState::Test { current_index, .. }
            | PhaseState::FinalTest { current_index, .. } => *current_index,
        }
    }

    pub fn answers(&self) -> Option<&QuizAnswers> {
        match &self.state {
            PhaseState::Test { answers, .. } | PhaseState::FinalTest { answers, .. } => {
                Some(answers)
            }
            _ => None,
        }
    }

    pub fn final_test_items(&self) -> Option<&[StudyItem]> {
        match &self.state {
            PhaseState::FinalTest { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Shallow merge of `patch` into this payload.
    pub fn merge(&mut self, patch: PayloadPatch) -> Result<(), PayloadError> {
        let phase = self.phase();
        if let Some(to) = patch.phase {
            if to != phase {
                return Err(PayloadError::PhaseChange { from: phase, to });
            }
        }

        match &mut self.state {
            PhaseState::Wordlist { current_index } | PhaseState::Memorization { current_index } => {
                if let Some(index) = patch.current_index {
                    *current_index = index;
                }
                // view phases keep answers untyped, like any other client key
                if let Some(answers) = patch.quiz_answers {
                    let value = serde_json::to_value(answers).unwrap_or(Value::Null);
                    self.extra.insert(QUIZ_ANSWERS_KEY.to_string(), value);
                }
            }
            PhaseState::Test {
                current_index,
                answers,
            }
            | PhaseState::FinalTest {
                current_index,
                answers,
                ..
            } => {
                if let Some(index) = patch.current_index {
                    *current_index = index;
                }
                if let Some(new_answers) = patch.quiz_answers {
                    *answers = new_answers;
                }
            }
        }

        self.extra.extend(patch.extra);
        Ok(())
    }

    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let Value::Object(mut map) = value else {
            return Err(PayloadError::NotAnObject);
        };

        let phase = map
            .remove(PHASE_KEY)
            .and_then(|v| v.as_str().and_then(|s| s.parse::<Phase>().ok()))
            .ok_or(PayloadError::MissingPhase)?;
        let current_index = match map.remove(CURRENT_INDEX_KEY) {
            Some(v) => parse_index(&v).ok_or(PayloadError::InvalidCurrentIndex)?,
            None => 0,
        };

        let state = match phase {
            Phase::Wordlist => PhaseState::Wordlist { current_index },
            Phase::Memorization => PhaseState::Memorization { current_index },
            Phase::Test => PhaseState::Test {
                current_index,
                answers: take_answers(&mut map),
            },
            Phase::FinalTest => {
                let answers = take_answers(&mut map);
                let items = map
                    .remove(FINAL_TEST_ITEMS_KEY)
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                PhaseState::FinalTest {
                    current_index,
                    answers,
                    items,
                }
            }
        };

        Ok(Self { state, extra: map })
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert(PHASE_KEY.to_string(), Value::from(self.phase().as_str()));
        map.insert(CURRENT_INDEX_KEY.to_string(), Value::from(self.current_index()));
        if let Some(answers) = self.answers() {
            map.insert(
                QUIZ_ANSWERS_KEY.to_string(),
                serde_json::to_value(answers).unwrap_or(Value::Null),
            );
        }
        if let Some(items) = self.final_test_items() {
            map.insert(
                FINAL_TEST_ITEMS_KEY.to_string(),
                serde_json::to_value(items).unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }
}

impl PayloadPatch {
    /// Split a client-sent object into the recognised keys and the rest.
    pub fn from_map(mut map: Map<String, Value>) -> Result<Self, PayloadError> {
        if map.contains_key(FINAL_TEST_ITEMS_KEY) {
            return Err(PayloadError::FrozenItems);
        }

        let phase = match map.remove(PHASE_KEY) {
            Some(Value::Null) | None => None,
            Some(v) => Some(
                v.as_str()
                    .and_then(|s| s.parse::<Phase>().ok())
                    .ok_or(PayloadError::MissingPhase)?,
            ),
        };
        let current_index = match map.remove(CURRENT_INDEX_KEY) {
            Some(Value::Null) | None => None,
            Some(v) => Some(parse_index(&v).ok_or(PayloadError::InvalidCurrentIndex)?),
        };
        let quiz_answers = map
            .remove(QUIZ_ANSWERS_KEY)
            .filter(|v| !v.is_null())
            .map(|v| QuizAnswers::from_value(&v));

        Ok(Self {
            phase,
            current_index,
            quiz_answers,
            extra: map,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.current_index.is_none()
            && self.quiz_answers.is_none()
            && self.extra.is_empty()
    }
}

fn take_answers(map: &mut Map<String, Value>) -> QuizAnswers {
    map.remove(QUIZ_ANSWERS_KEY)
        .map(|v| QuizAnswers::from_value(&v))
        .unwrap_or_default()
}

/// Accepts `3` as well as `"3"`.
fn parse_index(value: &Value) -> Option<i64> {
    let index = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (index >= 0).then_some(index)
}
