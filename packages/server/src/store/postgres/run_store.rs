use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{EndpointId, JobId, RunId, UserId};
use crate::domain::{FilteredMetrics, HealthSummary, Run, SiblingResponse, WindowHealth};
use crate::store::types::{NewRun, RunOutcome};
use crate::store::BaseRunStore;

const RUN_COLUMNS: &str = r#"
    id, endpoint_id, attempt, started_at, finished_at, status,
    duration_ms, status_code, response_body, error_message, source
"#;

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseRunStore for PgRunStore {
    async fn create_run(&self, new: NewRun) -> Result<Run> {
        let query = format!(
            r#"
            INSERT INTO runs (id, endpoint_id, attempt, started_at, status, source)
            VALUES ($1, $2, $3, $4, 'running', $5)
            RETURNING {RUN_COLUMNS}
            "#
        );
        let run = sqlx::query_as::<_, Run>(&query)
            .bind(RunId::new())
            .bind(new.endpoint_id)
            .bind(new.attempt)
            .bind(new.started_at)
            .bind(new.source)
            .fetch_one(&self.pool)
            .await
            .context("create_run")?;
        Ok(run)
    }

    async fn finish_run(
        &self,
        endpoint_id: EndpointId,
        attempt: i32,
        finished_at: DateTime<Utc>,
        outcome: RunOutcome,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE runs SET
                finished_at = $3, status = $4, duration_ms = $5,
                status_code = $6, response_body = $7, error_message = $8
            WHERE endpoint_id = $1 AND attempt = $2
            "#,
        )
        .bind(endpoint_id)
        .bind(attempt)
        .bind(finished_at)
        .bind(outcome.status)
        .bind(outcome.duration_ms)
        .bind(outcome.status_code)
        .bind(outcome.response_body)
        .bind(outcome.error_message)
        .execute(&self.pool)
        .await
        .context("finish_run")?;
        Ok(())
    }

    async fn get_latest_response(&self, endpoint_id: EndpointId) -> Result<Option<Run>> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE endpoint_id = $1 AND finished_at IS NOT NULL ORDER BY started_at DESC LIMIT 1"
        );
        let run = sqlx::query_as::<_, Run>(&query)
            .bind(endpoint_id)
            .fetch_optional(&self.pool)
            .await
            .context("get_latest_response")?;
        Ok(run)
    }

    async fn get_response_history(
        &self,
        endpoint_id: EndpointId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Run>> {
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE endpoint_id = $1 ORDER BY started_at DESC LIMIT $2 OFFSET $3"
        );
        let runs = sqlx::query_as::<_, Run>(&query)
            .bind(endpoint_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("get_response_history")?;
        Ok(runs)
    }

    async fn get_sibling_latest_responses(
        &self,
        job_id: JobId,
        exclude_endpoint_id: EndpointId,
    ) -> Result<Vec<SiblingResponse>> {
        let rows: Vec<(EndpointId, String, crate::domain::RunStatus, Option<String>, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                r#"
                SELECT DISTINCT ON (e.id)
                    e.id, e.name, r.status, r.response_body, r.finished_at
                FROM endpoints e
                JOIN runs r ON r.endpoint_id = e.id
                WHERE e.job_id = $1 AND e.id != $2 AND r.finished_at IS NOT NULL
                ORDER BY e.id, r.started_at DESC
                "#,
            )
            .bind(job_id)
            .bind(exclude_endpoint_id)
            .fetch_all(&self.pool)
            .await
            .context("get_sibling_latest_responses")?;

        Ok(rows
            .into_iter()
            .map(
                |(endpoint_id, endpoint_name, status, response_body, finished_at)| SiblingResponse {
                    endpoint_id,
                    endpoint_name,
                    status,
                    response_body,
                    finished_at,
                },
            )
            .collect())
    }

    async fn get_health_summary_multi_window(
        &self,
        endpoint_id: EndpointId,
        now: DateTime<Utc>,
    ) -> Result<HealthSummary> {
        const WINDOW_QUERY: &str = r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'success'),
                COUNT(*) FILTER (WHERE status IN ('failed', 'timeout'))
            FROM runs
            WHERE endpoint_id = $1 AND started_at >= $2 AND finished_at IS NOT NULL
        "#;

        let (s1, f1): (i64, i64) = sqlx::query_as(WINDOW_QUERY)
            .bind(endpoint_id)
            .bind(now - chrono::Duration::hours(1))
            .fetch_one(&self.pool)
            .await
            .context("health window 1h")?;
        let (s4, f4): (i64, i64) = sqlx::query_as(WINDOW_QUERY)
            .bind(endpoint_id)
            .bind(now - chrono::Duration::hours(4))
            .fetch_one(&self.pool)
            .await
            .context("health window 4h")?;
        let (s24, f24): (i64, i64) = sqlx::query_as(WINDOW_QUERY)
            .bind(endpoint_id)
            .bind(now - chrono::Duration::hours(24))
            .fetch_one(&self.pool)
            .await
            .context("health window 24h")?;

        let avg_duration_ms: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(duration_ms)::float8
            FROM runs
            WHERE endpoint_id = $1 AND started_at >= $2 AND finished_at IS NOT NULL
            "#,
        )
        .bind(endpoint_id)
        .bind(now - chrono::Duration::hours(24))
        .fetch_one(&self.pool)
        .await
        .context("health avg duration")?;

        // Failure streak: count of most-recent consecutive non-success runs.
        let recent: Vec<crate::domain::RunStatus> = sqlx::query_scalar(
            "SELECT status FROM runs WHERE endpoint_id = $1 AND finished_at IS NOT NULL ORDER BY started_at DESC LIMIT 50",
        )
        .bind(endpoint_id)
        .fetch_all(&self.pool)
        .await
        .context("health failure streak")?;

        let failure_streak = recent
            .iter()
            .take_while(|s| !s.is_success())
            .count() as i64;

        Ok(HealthSummary {
            window_1h: WindowHealth::from_counts(s1, f1),
            window_4h: WindowHealth::from_counts(s4, f4),
            window_24h: WindowHealth::from_counts(s24, f24),
            avg_duration_ms,
            failure_streak,
        })
    }

    async fn get_filtered_metrics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<FilteredMetrics> {
        let row: (i64, i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE r.status = 'success'),
                COUNT(*) FILTER (WHERE r.status IN ('failed', 'timeout')),
                AVG(r.duration_ms)::float8
            FROM runs r
            JOIN endpoints e ON e.id = r.endpoint_id
            WHERE e.tenant_id = $1 AND r.started_at >= $2 AND r.finished_at IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("get_filtered_metrics")?;

        Ok(FilteredMetrics {
            total_runs: row.0,
            success_count: row.1,
            failure_count: row.2,
            avg_duration_ms: row.3,
        })
    }

    async fn cleanup_zombie_runs(&self, now: DateTime<Utc>, zombie_age_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET
                status = 'failed',
                finished_at = $1,
                duration_ms = EXTRACT(EPOCH FROM ($1 - started_at)) * 1000,
                error_message = 'zombie'
            WHERE status = 'running'
              AND started_at < $1 - ($2 || ' milliseconds')::INTERVAL
            "#,
        )
        .bind(now)
        .bind(zombie_age_ms.to_string())
        .execute(&self.pool)
        .await
        .context("cleanup_zombie_runs")?;

        Ok(result.rows_affected())
    }
}
