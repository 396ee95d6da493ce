use color_eyre::Result;
use ulid::Ulid;

use super::Db;
use crate::models::{Principal, Role, StudentStatus};

impl Db {
    pub async fn create_campus(&self, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar("INSERT INTO campuses (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!("campus created: campus_id={id}");
        Ok(id)
    }

    pub async fn create_class(&self, campus_id: i64, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO classes (campus_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(campus_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("class created: class_id={id}, campus_id={campus_id}");
        Ok(id)
    }

    pub async fn create_student(&self, campus_id: i64, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO students (campus_id, name, status) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(campus_id)
        .bind(name)
        .bind(StudentStatus::Active)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("student created: student_id={id}, campus_id={campus_id}");
        Ok(id)
    }

    pub async fn set_student_status(&self, student_id: i64, status: StudentStatus) -> Result<()> {
        sqlx::query("UPDATE students SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(student_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("student {student_id} status set to {status:?}");
        Ok(())
    }

    pub async fn enroll_student(&self, class_id: i64, student_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO class_students (class_id, student_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(class_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn withdraw_student(&self, class_id: i64, student_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM class_students WHERE class_id = $1 AND student_id = $2")
            .bind(class_id)
            .bind(student_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Whether an active student is currently enrolled in the class.
    pub async fn is_enrolled(&self, student_id: i64, class_id: i64) -> Result<bool> {
        let enrolled: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM class_students cs
                JOIN students s ON s.id = cs.student_id
                WHERE cs.class_id = $1 AND cs.student_id = $2 AND s.status = $3
            )
            "#,
        )
        .bind(class_id)
        .bind(student_id)
        .bind(StudentStatus::Active)
        .fetch_one(&self.pool)
        .await?;

        Ok(enrolled)
    }

    /// Issues a login token. Normally done by the identity service that
    /// shares this database; kept here for seeding and tests.
    pub async fn create_student_session(&self, student_id: i64, role: Role) -> Result<String> {
        let token = Ulid::new().to_string();

        sqlx::query("INSERT INTO student_sessions (token, student_id, role) VALUES ($1, $2, $3)")
            .bind(&token)
            .bind(student_id)
            .bind(role)
            .execute(&self.pool)
            .await?;

        tracing::info!("login session created for student_id={student_id}");
        Ok(token)
    }

    pub async fn get_principal_by_session(&self, token: &str) -> Result<Option<Principal>> {
        let principal = sqlx::query_as::<_, Principal>(
            "SELECT student_id, role FROM student_sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(principal)
    }
}
