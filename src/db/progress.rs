use chrono::{DateTime, Utc};
use color_eyre::Result;
use sqlx::SqliteConnection;

use super::models::{AssignmentProgress, SessionKey};
use super::Db;
use crate::models::PositionalMode;
use crate::progress::{advance, PositionalProgress};

const PROGRESS_COLUMNS: &str = "student_id, assignment_id, module_id, wordlist_max_index, wordlist_progress_pct, memorize_max_index, memorize_progress_pct, completed, completed_at";

/// Creates the progress row at zero if it does not exist yet.
pub(super) async fn ensure_progress_row(conn: &mut SqliteConnection, key: SessionKey) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_assignment_progress (student_id, assignment_id, module_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (student_id, assignment_id, module_id) DO NOTHING
        "#,
    )
    .bind(key.student_id)
    .bind(key.assignment_id)
    .bind(key.module_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(super) async fn read_progress(
    conn: &mut SqliteConnection,
    key: SessionKey,
) -> Result<Option<AssignmentProgress>> {
    let progress = sqlx::query_as::<_, AssignmentProgress>(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM student_assignment_progress WHERE student_id = $1 AND assignment_id = $2 AND module_id = $3"
    ))
    .bind(key.student_id)
    .bind(key.assignment_id)
    .bind(key.module_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(progress)
}

/// Sets the overall completion flag; the first completion time is kept.
pub(super) async fn mark_completed(
    conn: &mut SqliteConnection,
    key: SessionKey,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_assignment_progress
            (student_id, assignment_id, module_id, completed, completed_at, updated_at)
        VALUES ($1, $2, $3, 1, $4, $4)
        ON CONFLICT (student_id, assignment_id, module_id) DO UPDATE SET
            completed = 1,
            completed_at = COALESCE(student_assignment_progress.completed_at, excluded.completed_at),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key.student_id)
    .bind(key.assignment_id)
    .bind(key.module_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn mode_fields(progress: &AssignmentProgress, mode: PositionalMode) -> PositionalProgress {
    match mode {
        PositionalMode::Wordlist => PositionalProgress {
            max_index: progress.wordlist_max_index,
            progress_pct: progress.wordlist_progress_pct,
        },
        PositionalMode::Memorize => PositionalProgress {
            max_index: progress.memorize_max_index,
            progress_pct: progress.memorize_progress_pct,
        },
    }
}

// MAX() in the update keeps the columns monotonic even against a writer
// that read an older row.
fn guarded_update(mode: PositionalMode) -> &'static str {
    match mode {
        PositionalMode::Wordlist => {
            r#"
            UPDATE student_assignment_progress SET
                wordlist_max_index = MAX(COALESCE(wordlist_max_index, -1), $1),
                wordlist_progress_pct = MAX(wordlist_progress_pct, $2),
                updated_at = $3
            WHERE student_id = $4 AND assignment_id = $5 AND module_id = $6
            RETURNING wordlist_max_index, wordlist_progress_pct
            "#
        }
        PositionalMode::Memorize => {
            r#"
            UPDATE student_assignment_progress SET
                memorize_max_index = MAX(COALESCE(memorize_max_index, -1), $1),
                memorize_progress_pct = MAX(memorize_progress_pct, $2),
                updated_at = $3
            WHERE student_id = $4 AND assignment_id = $5 AND module_id = $6
            RETURNING memorize_max_index, memorize_progress_pct
            "#
        }
    }
}

impl Db {
    /// Folds a reported position into the progress of `mode`. Only the
    /// columns of that mode change.
    pub async fn advance_progress(
        &self,
        key: SessionKey,
        mode: PositionalMode,
        current_index: i64,
        total: i64,
        now: DateTime<Utc>,
    ) -> Result<PositionalProgress> {
        let mut tx = self.begin_write().await?;

        ensure_progress_row(&mut *tx, key).await?;
        let existing = read_progress(&mut *tx, key)
            .await?
            .map(|p| mode_fields(&p, mode))
            .unwrap_or_default();

        let next = advance(existing, current_index, total);
        if next == existing {
            tx.commit().await?;
            return Ok(existing);
        }

        let (max_index, progress_pct): (Option<i64>, i64) = sqlx::query_as(guarded_update(mode))
            .bind(next.max_index)
            .bind(next.progress_pct)
            .bind(now)
            .bind(key.student_id)
            .bind(key.assignment_id)
            .bind(key.module_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            "progress advanced for {key:?} mode={mode:?}: max_index={max_index:?}, pct={progress_pct}"
        );
        Ok(PositionalProgress {
            max_index,
            progress_pct,
        })
    }

    /// Marks every item of `mode` as seen.
    pub async fn finish_progress(
        &self,
        key: SessionKey,
        mode: PositionalMode,
        total: i64,
        now: DateTime<Utc>,
    ) -> Result<PositionalProgress> {
        self.advance_progress(key, mode, total - 1, total, now).await
    }

    pub async fn get_progress(&self, key: SessionKey) -> Result<Option<AssignmentProgress>> {
        let mut conn = self.pool.acquire().await?;
        read_progress(&mut conn, key).await
    }

    /// Progress of a student on every module of an assignment, in
    /// assignment order. Modules never touched report zero progress.
    pub async fn progress_for_assignment(
        &self,
        student_id: i64,
        assignment_id: i64,
    ) -> Result<Vec<AssignmentProgress>> {
        let rows = sqlx::query_as::<_, AssignmentProgress>(
            r#"
            SELECT
                $1 AS student_id,
                am.assignment_id AS assignment_id,
                am.module_id AS module_id,
                p.wordlist_max_index AS wordlist_max_index,
                COALESCE(p.wordlist_progress_pct, 0) AS wordlist_progress_pct,
                p.memorize_max_index AS memorize_max_index,
                COALESCE(p.memorize_progress_pct, 0) AS memorize_progress_pct,
                COALESCE(p.completed, 0) AS completed,
                p.completed_at AS completed_at
            FROM assignment_modules am
            LEFT JOIN student_assignment_progress p
                ON p.assignment_id = am.assignment_id
                AND p.module_id = am.module_id
                AND p.student_id = $1
            WHERE am.assignment_id = $2
            ORDER BY am.position
            "#,
        )
        .bind(student_id)
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
