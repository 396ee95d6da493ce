// Quiz scoring

use crate::models::{QuizAnswers, StudyItem};

/// Percentage of items answered correctly, rounded half up, in `0..=100`.
///
/// Answers are matched by position. An item without a known correct choice
/// can never be answered correctly, answers for positions past the last
/// item are ignored, and an empty item list scores 0.
pub fn score(items: &[StudyItem], answers: &QuizAnswers) -> i32 {
    let total = items.len();
    if total == 0 {
        return 0;
    }

    let correct = items
        .iter()
        .enumerate()
        .filter(|(position, item)| match (item.correct_choice_index, answers.choice(*position)) {
            (Some(expected), Some(chosen)) => expected == chosen,
            _ => false,
        })
        .count();

    percentage(correct, total)
}

fn percentage(correct: usize, total: usize) -> i32 {
    // integer form of round(correct / total * 100)
    ((200 * correct + total) / (2 * total)) as i32
}
