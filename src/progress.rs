// Monotonic progress for the word-list and memorization phases

use serde::Serialize;

/// Progress of one view phase for one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionalProgress {
    /// Furthest item position reached, `None` before the first advance.
    pub max_index: Option<i64>,
    pub progress_pct: i64,
}

/// Folds a reported position into the stored progress.
///
/// The position is clamped to the last item and the furthest position
/// ever seen wins, so moving backwards never lowers progress. With no items
/// there is nothing to advance and the stored progress is returned as is.
pub fn advance(existing: PositionalProgress, current_index: i64, total: i64) -> PositionalProgress {
    if total <= 0 || current_index < 0 {
        return existing;
    }

    let clamped = current_index.min(total - 1);
    let max_index = existing.max_index.map_or(clamped, |max| max.max(clamped));
    let pct = ((max_index + 1) * 100 / total).min(100);

    PositionalProgress {
        max_index: Some(max_index),
        progress_pct: pct.max(existing.progress_pct),
    }
}
