use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use color_eyre::Result;
use sqlx::SqliteConnection;

use super::models::{ScoreDailyRollup, ScoreLogEntry};
use super::Db;
use crate::models::ActivityType;

/// One score to be logged and folded into the daily rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRecord {
    pub student_id: i64,
    pub campus_id: i64,
    pub class_id: i64,
    pub session_id: Option<i64>,
    pub activity_type: ActivityType,
    pub score: i64,
    pub at: DateTime<Utc>,
}

/// The reporting day of an instant in the configured local offset.
pub fn report_day(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// Appends to the score log and adds the score to the day's rollup row.
pub(super) async fn record_score(
    conn: &mut SqliteConnection,
    record: ScoreRecord,
    offset: FixedOffset,
) -> Result<i64> {
    let log_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO score_logs
            (student_id, campus_id, class_id, session_id, activity_type, score, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(record.student_id)
    .bind(record.campus_id)
    .bind(record.class_id)
    .bind(record.session_id)
    .bind(record.activity_type)
    .bind(record.score)
    .bind(record.at)
    .fetch_one(&mut *conn)
    .await?;

    let day = report_day(record.at, offset);
    sqlx::query(
        r#"
        INSERT INTO score_daily (day, campus_id, class_id, student_id, total_score, total_count)
        VALUES ($1, $2, $3, $4, $5, 1)
        ON CONFLICT (day, campus_id, class_id, student_id) DO UPDATE SET
            total_score = score_daily.total_score + excluded.total_score,
            total_count = score_daily.total_count + 1
        "#,
    )
    .bind(day)
    .bind(record.campus_id)
    .bind(record.class_id)
    .bind(record.student_id)
    .bind(record.score)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        "score logged: log_id={log_id}, student_id={}, activity={:?}, score={}, day={day}",
        record.student_id,
        record.activity_type,
        record.score
    );
    Ok(log_id)
}

impl Db {
    /// Records a score outside of a session completion, such as an import.
    pub async fn record_score(&self, record: ScoreRecord, offset: FixedOffset) -> Result<i64> {
        let mut tx = self.begin_write().await?;
        let log_id = record_score(&mut *tx, record, offset).await?;
        tx.commit().await?;
        Ok(log_id)
    }

    pub async fn score_logs_for_student(&self, student_id: i64) -> Result<Vec<ScoreLogEntry>> {
        let logs = sqlx::query_as::<_, ScoreLogEntry>(
            r#"
            SELECT id, student_id, campus_id, class_id, session_id, activity_type, score, created_at
            FROM score_logs
            WHERE student_id = $1
            ORDER BY id
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    /// Daily rollups of a student for the inclusive range `from..=to`.
    pub async fn daily_rollups(
        &self,
        student_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScoreDailyRollup>> {
        let rollups = sqlx::query_as::<_, ScoreDailyRollup>(
            r#"
            SELECT day, campus_id, class_id, student_id, total_score, total_count
            FROM score_daily
            WHERE student_id = $1 AND day >= $2 AND day <= $3
            ORDER BY day, class_id
            "#,
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rollups)
    }
}
