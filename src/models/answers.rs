use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Answers given in a quiz phase, keyed by item position.
///
/// Clients send positions as object keys (always strings in JSON) and the
/// chosen choice either as a number or as a numeric string, so both are
/// normalized to integers here. An entry whose value is `null` or not a
/// number is kept as unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizAnswers(BTreeMap<usize, Option<i64>>);

impl QuizAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chosen choice index at `position`, if one was answered.
    pub fn choice(&self, position: usize) -> Option<i64> {
        self.0.get(&position).copied().flatten()
    }

    pub fn insert(&mut self, position: usize, choice: Option<i64>) {
        self.0.insert(position, choice);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<i64>)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Build from a loosely typed JSON value (object or array).
    pub fn from_value(value: &Value) -> Self {
        let mut answers = Self::new();
        match value {
            Value::Object(map) => {
                for (key, choice) in map {
                    if let Some(position) = parse_position(key) {
                        answers.insert(position, parse_choice(choice));
                    }
                }
            }
            Value::Array(choices) => {
                for (position, choice) in choices.iter().enumerate() {
                    answers.insert(position, parse_choice(choice));
                }
            }
            _ => {}
        }
        answers
    }
}

impl FromIterator<(usize, i64)> for QuizAnswers {
    fn from_iter<T: IntoIterator<Item = (usize, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

fn parse_position(key: &str) -> Option<usize> {
    key.trim().parse().ok()
}

fn parse_choice(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Serialize for QuizAnswers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for QuizAnswers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}
