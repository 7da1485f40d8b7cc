//! PostgreSQL database operations

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};

use gramoteka_core::error::{Result as CoreResult, TaskError};
use gramoteka_core::selection::{AnswerLog, ExerciseSelector};
use gramoteka_core::types::{AnswerRecord, Exercise};

use crate::error::{ApiError, Result};
use crate::models::{DbCategory, DbExercise, DbUser};

const EXERCISE_COLUMNS: &str = "id, category_id, group_id, content, answer, explanation, is_active";

/// Expression giving every row a group key, null groups being singletons.
const GROUP_KEY: &str = "COALESCE(group_id::text, gen_random_uuid()::text)";

fn provider_error(e: sqlx::Error) -> TaskError {
    TaskError::Provider(anyhow::Error::new(e))
}

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === User Repository ===

    /// Create or refresh a user keyed by its external (messenger) id
    pub async fn sync_user(
        &self,
        external_id: i64,
        username: Option<&str>,
        full_name: &str,
    ) -> Result<DbUser> {
        let user = sqlx::query_as::<_, DbUser>(
            r#"
            INSERT INTO users (external_id, username, full_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id)
            DO UPDATE SET username = EXCLUDED.username, full_name = EXCLUDED.full_name
            RETURNING id, external_id, username, full_name,
                      exercise_started_at, current_task_config, current_category_id
            "#,
        )
        .bind(external_id)
        .bind(username)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: i64) -> Result<Option<DbUser>> {
        let user = sqlx::query_as::<_, DbUser>(
            r#"
            SELECT id, external_id, username, full_name,
                   exercise_started_at, current_task_config, current_category_id
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Point the user at a category for subsequent tasks
    pub async fn set_current_category(&self, user_id: i64, category_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET current_category_id = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a freshly created task onto the session: the displayed
    /// exercises, the start timestamp and the opaque config blob.
    pub async fn set_current_task(
        &self,
        user_id: i64,
        exercise_ids: &[i64],
        task_config: Option<Value>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET exercise_started_at = NOW(), current_task_config = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(task_config)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM user_current_exercises WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if !exercise_ids.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO user_current_exercises (user_id, exercise_id)
                SELECT $1, unnest($2::bigint[])
                "#,
            )
            .bind(user_id)
            .bind(exercise_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// The exercises currently displayed to the user. Display order lives in
    /// the task config, not here.
    pub async fn get_current_exercises(&self, user_id: i64) -> Result<Vec<DbExercise>> {
        let exercises = sqlx::query_as::<_, DbExercise>(
            r#"
            SELECT e.id, e.category_id, e.group_id, e.content, e.answer, e.explanation, e.is_active
            FROM exercises e
            JOIN user_current_exercises uce ON uce.exercise_id = e.id
            WHERE uce.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(exercises)
    }

    // === Category Repository ===

    /// Get category by ID
    pub async fn get_category(&self, category_id: i64) -> Result<Option<DbCategory>> {
        let category = sqlx::query_as::<_, DbCategory>(
            r#"
            SELECT id, name, handler_type, parent_id
            FROM categories
            WHERE id = $1
            "#,
        )
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    /// Children of a category, or the roots when no parent is given
    pub async fn list_categories(&self, parent_id: Option<i64>) -> Result<Vec<DbCategory>> {
        let categories = match parent_id {
            Some(parent_id) => {
                sqlx::query_as::<_, DbCategory>(
                    r#"
                    SELECT id, name, handler_type, parent_id
                    FROM categories
                    WHERE parent_id = $1
                    ORDER BY id ASC
                    "#,
                )
                .bind(parent_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DbCategory>(
                    r#"
                    SELECT id, name, handler_type, parent_id
                    FROM categories
                    WHERE parent_id IS NULL
                    ORDER BY id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(categories)
    }

    // === Exercise selection internals ===

    async fn fetch_random(
        &self,
        category_id: i64,
        limit: usize,
        extra_predicate: &str,
        binds: &[&str],
    ) -> CoreResult<Vec<Exercise>> {
        let sql = format!(
            "SELECT {EXERCISE_COLUMNS} FROM exercises \
             WHERE category_id = $1 AND is_active {extra_predicate} \
             ORDER BY random() LIMIT $2"
        );
        let mut query = sqlx::query_as::<_, DbExercise>(&sql)
            .bind(category_id)
            .bind(limit as i64);
        for bind in binds {
            query = query.bind(*bind);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(provider_error)?;
        Ok(rows.iter().map(DbExercise::to_core).collect())
    }
}

#[async_trait]
impl ExerciseSelector for Database {
    async fn random(&self, category_id: i64, limit: usize) -> CoreResult<Vec<Exercise>> {
        self.fetch_random(category_id, limit, "", &[]).await
    }

    async fn random_with_content_field(
        &self,
        category_id: i64,
        field: &str,
        limit: usize,
    ) -> CoreResult<Vec<Exercise>> {
        self.fetch_random(category_id, limit, "AND content ->> $3 IS NOT NULL", &[field])
            .await
    }

    async fn random_distinct_groups(
        &self,
        category_id: i64,
        limit: usize,
        require_field: Option<&str>,
    ) -> CoreResult<Vec<Exercise>> {
        let field = match require_field {
            None => {
                let sql = format!(
                    "SELECT DISTINCT ON ({GROUP_KEY}) {EXERCISE_COLUMNS} \
                     FROM exercises \
                     WHERE category_id = $1 AND is_active \
                     ORDER BY {GROUP_KEY}, random() \
                     LIMIT $2"
                );
                let rows = sqlx::query_as::<_, DbExercise>(&sql)
                    .bind(category_id)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(provider_error)?;
                return Ok(rows.iter().map(DbExercise::to_core).collect());
            }
            Some(field) => field,
        };

        // One exercise carrying the field comes first; the rest fill up the
        // remaining slots from other groups.
        let required = self
            .fetch_random(category_id, 1, "AND content ->> $3 IS NOT NULL", &[field])
            .await?;
        let required = match required.into_iter().next() {
            Some(exercise) => exercise,
            None => return Ok(Vec::new()),
        };

        let sql = format!(
            "SELECT DISTINCT ON ({GROUP_KEY}) {EXERCISE_COLUMNS} \
             FROM exercises \
             WHERE category_id = $1 AND is_active AND id <> $2 \
               AND (group_id IS NULL OR group_id IS DISTINCT FROM $3) \
             ORDER BY {GROUP_KEY}, random() \
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, DbExercise>(&sql)
            .bind(category_id)
            .bind(required.id)
            .bind(required.group_id)
            .bind(limit.saturating_sub(1) as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(provider_error)?;

        let mut result = vec![required];
        result.extend(rows.iter().map(DbExercise::to_core));
        Ok(result)
    }

    async fn random_by_answer(
        &self,
        category_id: i64,
        answer: &str,
        limit: usize,
    ) -> CoreResult<Vec<Exercise>> {
        self.fetch_random(category_id, limit, "AND answer = $3", &[answer])
            .await
    }

    async fn random_excluding_answer(
        &self,
        category_id: i64,
        answer: &str,
        limit: usize,
    ) -> CoreResult<Vec<Exercise>> {
        self.fetch_random(category_id, limit, "AND answer <> $3", &[answer])
            .await
    }

    async fn random_with_distinct_answers(
        &self,
        category_id: i64,
        exclude_answer: &str,
        limit: usize,
    ) -> CoreResult<Vec<Exercise>> {
        let sql = format!(
            "SELECT DISTINCT ON (answer) {EXERCISE_COLUMNS} \
             FROM exercises \
             WHERE category_id = $1 AND is_active AND answer <> $3 \
             ORDER BY answer, random() \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, DbExercise>(&sql)
            .bind(category_id)
            .bind(limit as i64)
            .bind(exclude_answer)
            .fetch_all(&self.pool)
            .await
            .map_err(provider_error)?;
        Ok(rows.iter().map(DbExercise::to_core).collect())
    }

    async fn random_same_answer_groups(
        &self,
        category_id: i64,
        group_size: usize,
        num_groups: usize,
    ) -> CoreResult<Vec<Exercise>> {
        // Answers with enough members first; the per-answer picks depend on
        // that list, so the calls run sequentially.
        let answers: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT answer FROM exercises
            WHERE category_id = $1 AND is_active
            GROUP BY answer
            HAVING COUNT(*) >= $2
            ORDER BY random()
            LIMIT $3
            "#,
        )
        .bind(category_id)
        .bind(group_size as i64)
        .bind(num_groups as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(provider_error)?;

        let mut clustered = Vec::with_capacity(num_groups * group_size);
        for answer in &answers {
            let members = self.random_by_answer(category_id, answer, group_size).await?;
            clustered.extend(members);
        }
        Ok(clustered)
    }

    async fn random_by_content_value(
        &self,
        category_id: i64,
        field: &str,
        value: &str,
        limit: usize,
    ) -> CoreResult<Vec<Exercise>> {
        self.fetch_random(category_id, limit, "AND content ->> $3 = $4", &[field, value])
            .await
    }

    async fn random_by_answer_and_content_value(
        &self,
        category_id: i64,
        answer: &str,
        field: &str,
        value: &str,
        limit: usize,
    ) -> CoreResult<Vec<Exercise>> {
        self.fetch_random(
            category_id,
            limit,
            "AND answer = $3 AND content ->> $4 = $5",
            &[answer, field, value],
        )
        .await
    }
}

#[async_trait]
impl AnswerLog for Database {
    async fn append(&self, entry: AnswerRecord) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_answers
                (is_correct, user_response, solve_time, group_id, user_id, exercise_id, category_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.is_correct)
        .bind(&entry.response)
        .bind(entry.solve_time_secs as i32)
        .bind(entry.batch_id)
        .bind(entry.user_id)
        .bind(entry.exercise_id)
        .bind(entry.category_id)
        .execute(&self.pool)
        .await
        .map_err(provider_error)?;

        Ok(())
    }
}
