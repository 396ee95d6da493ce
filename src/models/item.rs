use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ModuleType;

pub const CHOICE_COUNT: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("item {0}: prompt is empty")]
    EmptyPrompt(usize),
    #[error("item {0}: expected 4 choices, got {1}")]
    ChoiceCount(usize, usize),
    #[error("item {0}: correct choice index {1} is out of range")]
    CorrectIndexOutOfRange(usize, i64),
    #[error("item {0}: text pairs cannot carry an image")]
    ImageNotAllowed(usize),
    #[error("item {0}: image pairs need an uploaded image or an image url")]
    ImageRequired(usize),
    #[error("item {0}: set either an uploaded image or an image url, not both")]
    AmbiguousImage(usize),
}

/// A new item as submitted to the catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub prompt: String,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub choices: Vec<String>,
    pub correct_choice_index: Option<i64>,
}

impl NewItem {
    /// Checks the shape of the item and the media rule of its module type.
    pub fn validate(&self, position: usize, module_type: ModuleType) -> Result<(), ItemError> {
        if self.prompt.trim().is_empty() {
            return Err(ItemError::EmptyPrompt(position));
        }
        if self.choices.len() != CHOICE_COUNT {
            return Err(ItemError::ChoiceCount(position, self.choices.len()));
        }
        if let Some(index) = self.correct_choice_index {
            if !(0..CHOICE_COUNT as i64).contains(&index) {
                return Err(ItemError::CorrectIndexOutOfRange(position, index));
            }
        }

        let has_path = self.image_path.as_deref().is_some_and(|p| !p.trim().is_empty());
        let has_url = self.image_url.as_deref().is_some_and(|u| !u.trim().is_empty());
        match module_type {
            ModuleType::PairText if has_path || has_url => Err(ItemError::ImageNotAllowed(position)),
            ModuleType::PairText => Ok(()),
            ModuleType::PairImage if has_path && has_url => {
                Err(ItemError::AmbiguousImage(position))
            }
            ModuleType::PairImage if !has_path && !has_url => {
                Err(ItemError::ImageRequired(position))
            }
            ModuleType::PairImage => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LearningItem {
    pub id: i64,
    pub module_id: i64,
    pub position: i64,
    pub prompt: String,
    pub image_path: Option<String>,
    pub image_url: Option<String>,
    pub choice1: String,
    pub choice2: String,
    pub choice3: String,
    pub choice4: String,
    pub correct_choice_index: Option<i64>,
}

/// An item as handed to a student, and as frozen into a final test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyItem {
    pub item_id: i64,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub choices: Vec<String>,
    #[serde(default)]
    pub correct_choice_index: Option<i64>,
}

impl From<&LearningItem> for StudyItem {
    fn from(item: &LearningItem) -> Self {
        Self {
            item_id: item.id,
            prompt: item.prompt.clone(),
            image: item.image_path.clone().or_else(|| item.image_url.clone()),
            choices: vec![
                item.choice1.clone(),
                item.choice2.clone(),
                item.choice3.clone(),
                item.choice4.clone(),
            ],
            correct_choice_index: item.correct_choice_index,
        }
    }
}
