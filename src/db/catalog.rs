use chrono::NaiveDate;
use color_eyre::Result;

use super::models::{Assignment, LearningModule, StudyContext};
use super::Db;
use crate::models::{LearningItem, ModuleType, NewItem, StudentStatus};

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Db {
    /// Creates a module with its items. Every item is validated against the
    /// module type first; a single invalid item rejects the whole module.
    pub async fn create_module(
        &self,
        name: &str,
        module_type: ModuleType,
        items: &[NewItem],
    ) -> Result<i64> {
        for (position, item) in items.iter().enumerate() {
            item.validate(position, module_type)?;
        }

        let mut tx = self.begin_write().await?;

        let module_id: i64 = sqlx::query_scalar(
            "INSERT INTO learning_modules (name, module_type) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(module_type)
        .fetch_one(&mut *tx)
        .await?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO learning_items
                    (module_id, position, prompt, image_path, image_url,
                     choice1, choice2, choice3, choice4, correct_choice_index)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(module_id)
            .bind(position as i64)
            .bind(item.prompt.trim())
            .bind(non_blank(&item.image_path))
            .bind(non_blank(&item.image_url))
            .bind(&item.choices[0])
            .bind(&item.choices[1])
            .bind(&item.choices[2])
            .bind(&item.choices[3])
            .bind(item.correct_choice_index)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "module created: module_id={module_id}, type={module_type:?}, items={}",
            items.len()
        );
        Ok(module_id)
    }

    pub async fn get_module(&self, module_id: i64) -> Result<Option<LearningModule>> {
        let module = sqlx::query_as::<_, LearningModule>(
            "SELECT id, name, module_type FROM learning_modules WHERE id = $1",
        )
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(module)
    }

    /// Items of a module in their authoritative order.
    pub async fn module_items(&self, module_id: i64) -> Result<Vec<LearningItem>> {
        let items = sqlx::query_as::<_, LearningItem>(
            r#"
            SELECT id, module_id, position, prompt, image_path, image_url,
                   choice1, choice2, choice3, choice4, correct_choice_index
            FROM learning_items
            WHERE module_id = $1
            ORDER BY position
            "#,
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Adds a module to the class's assignment for `date`, creating the
    /// assignment on first use. Returns the assignment id.
    pub async fn assign_module(&self, class_id: i64, date: NaiveDate, module_id: i64) -> Result<i64> {
        let mut tx = self.begin_write().await?;

        let assignment_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO assignments (class_id, assigned_on) VALUES ($1, $2)
            ON CONFLICT (class_id, assigned_on) DO UPDATE SET class_id = excluded.class_id
            RETURNING id
            "#,
        )
        .bind(class_id)
        .bind(date)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO assignment_modules (assignment_id, module_id, position)
            SELECT $1, $2, COALESCE(MAX(position) + 1, 0)
            FROM assignment_modules WHERE assignment_id = $1
            ON CONFLICT (assignment_id, module_id) DO NOTHING
            "#,
        )
        .bind(assignment_id)
        .bind(module_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::info!(
            "module {module_id} assigned to class={class_id} on {date}: assignment_id={assignment_id}, new={}",
            inserted > 0
        );
        Ok(assignment_id)
    }

    pub async fn get_assignment(&self, assignment_id: i64) -> Result<Option<Assignment>> {
        let assignment = sqlx::query_as::<_, Assignment>(
            "SELECT id, class_id, assigned_on FROM assignments WHERE id = $1",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(assignment)
    }

    pub async fn find_assignment(&self, class_id: i64, date: NaiveDate) -> Result<Option<Assignment>> {
        let assignment = sqlx::query_as::<_, Assignment>(
            "SELECT id, class_id, assigned_on FROM assignments WHERE class_id = $1 AND assigned_on = $2",
        )
        .bind(class_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(assignment)
    }

    /// Modules of an assignment in the order they were assigned.
    pub async fn assignment_modules(&self, assignment_id: i64) -> Result<Vec<LearningModule>> {
        let modules = sqlx::query_as::<_, LearningModule>(
            r#"
            SELECT m.id, m.name, m.module_type
            FROM assignment_modules am
            JOIN learning_modules m ON m.id = am.module_id
            WHERE am.assignment_id = $1
            ORDER BY am.position
            "#,
        )
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(modules)
    }

    /// `None` when the assignment or the module does not exist.
    pub async fn study_context(
        &self,
        student_id: i64,
        assignment_id: i64,
        module_id: i64,
    ) -> Result<Option<StudyContext>> {
        let context = sqlx::query_as::<_, StudyContext>(
            r#"
            SELECT
                a.id AS assignment_id,
                a.class_id AS class_id,
                c.campus_id AS campus_id,
                m.id AS module_id,
                m.module_type AS module_type,
                EXISTS(
                    SELECT 1 FROM assignment_modules am
                    WHERE am.assignment_id = a.id AND am.module_id = m.id
                ) AS module_assigned,
                EXISTS(
                    SELECT 1 FROM class_students cs
                    JOIN students s ON s.id = cs.student_id
                    WHERE cs.class_id = a.class_id AND cs.student_id = $3 AND s.status = $4
                ) AS student_enrolled
            FROM assignments a
            JOIN classes c ON c.id = a.class_id
            JOIN learning_modules m ON m.id = $2
            WHERE a.id = $1
            "#,
        )
        .bind(assignment_id)
        .bind(module_id)
        .bind(student_id)
        .bind(StudentStatus::Active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(context)
    }
}
