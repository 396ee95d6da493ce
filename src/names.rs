pub const START_URL: &str = "/study/start";
pub const SAVE_URL: &str = "/study/save";
pub const FINISH_URL: &str = "/study/finish";
pub const COMPLETE_URL: &str = "/study/complete";
pub const SESSION_URL: &str = "/study/sessions/{session_id}";
pub const ASSIGNMENT_PROGRESS_URL: &str = "/assignments/{assignment_id}/progress";
pub const DAILY_SCORES_URL: &str = "/scores/daily";

pub const STUDENT_SESSION_COOKIE_NAME: &str = "student_session";

pub fn session_url(session_id: i64) -> String {
    format!("/study/sessions/{session_id}")
}

pub fn assignment_progress_url(assignment_id: i64) -> String {
    format!("/assignments/{assignment_id}/progress")
}

pub fn daily_scores_url(from: &str, to: &str) -> String {
    format!("{DAILY_SCORES_URL}?from={from}&to={to}")
}

// Study defaults
pub const DEFAULT_FINAL_TEST_ITEM_COUNT: usize = 20;
pub const DEFAULT_REPORT_UTC_OFFSET_MINUTES: i32 = 540;
pub const DEFAULT_DUPLICATE_COMPLETION_WINDOW_SECS: i64 = 600;
