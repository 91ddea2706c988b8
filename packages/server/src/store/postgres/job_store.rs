use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{JobId, UserId};
use crate::domain::{Job, JobStatus};
use crate::store::types::{JobPatch, NewJob};
use crate::store::BaseJobStore;

const JOB_COLUMNS: &str = "id, user_id, name, description, status, created_at, updated_at";

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseJobStore for PgJobStore {
    async fn create_job(&self, new: NewJob) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (id, user_id, name, description, status, created_at, updated_at)
            VALUES (gen_random_uuid(), $1, $2, $3, 'active', NOW(), NOW())
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(new.name)
        .bind(new.description)
        .fetch_one(&self.pool)
        .await
        .context("create_job")?;
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("get_job")?;
        Ok(job)
    }

    async fn list_jobs_by_user(&self, user_id: UserId) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("list_jobs_by_user")?;
        Ok(jobs)
    }

    async fn update_job(&self, id: JobId, patch: JobPatch) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET name = COALESCE($2, name),
                description = CASE WHEN $3 THEN $4 ELSE description END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.description.is_some())
        .bind(patch.description.flatten())
        .fetch_one(&self.pool)
        .await
        .context("update_job")?;
        Ok(job)
    }

    async fn set_job_status(&self, id: JobId, status: JobStatus, now: DateTime<Utc>) -> Result<Job> {
        let mut tx = self.pool.begin().await.context("set_job_status begin")?;

        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs SET status = $2, updated_at = $3 WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("set_job_status update job")?;

        if status == JobStatus::Archived {
            sqlx::query(
                "UPDATE endpoints SET archived_at = $2, updated_at = $2 WHERE job_id = $1 AND archived_at IS NULL",
            )
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("set_job_status cascade archive endpoints")?;
        }

        tx.commit().await.context("set_job_status commit")?;
        Ok(job)
    }
}
