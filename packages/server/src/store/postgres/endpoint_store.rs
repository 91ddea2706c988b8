use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{EndpointId, JobId, UserId};
use crate::domain::{Endpoint, Tier};
use crate::store::types::{AiHintWrite, EndpointPatch, NewEndpoint};
use crate::store::BaseEndpointStore;

const ENDPOINT_COLUMNS: &str = r#"
    id, job_id, tenant_id, name, description,
    baseline_cron, baseline_interval_ms, min_interval_ms, max_interval_ms,
    url, method, headers, body, timeout_ms, max_execution_time_ms, max_response_size_kb,
    next_run_at, last_run_at, failure_count, paused_until, locked_until,
    ai_hint_interval_ms, ai_hint_next_run_at, ai_hint_expires_at, ai_hint_reason,
    archived_at, created_at, updated_at
"#;

pub struct PgEndpointStore {
    pool: PgPool,
}

impl PgEndpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseEndpointStore for PgEndpointStore {
    async fn claim_due_endpoints(
        &self,
        now: DateTime<Utc>,
        lease_ms: i64,
        limit: i64,
    ) -> Result<Vec<Endpoint>> {
        let query = format!(
            r#"
            WITH next_endpoints AS (
                SELECT e.id
                FROM endpoints e
                JOIN jobs j ON j.id = e.job_id
                WHERE e.archived_at IS NULL
                  AND j.status = 'active'
                  AND e.next_run_at <= $1
                  AND (e.locked_until IS NULL OR e.locked_until <= $1)
                  AND (e.paused_until IS NULL OR e.paused_until <= $1)
                ORDER BY e.next_run_at
                LIMIT $2
                FOR UPDATE OF e SKIP LOCKED
            )
            UPDATE endpoints
            SET locked_until = $1 + ($3 || ' milliseconds')::INTERVAL
            WHERE id IN (SELECT id FROM next_endpoints)
            RETURNING {ENDPOINT_COLUMNS}
            "#
        );

        let endpoints = sqlx::query_as::<_, Endpoint>(&query)
            .bind(now)
            .bind(limit)
            .bind(lease_ms.to_string())
            .fetch_all(&self.pool)
            .await
            .context("claim_due_endpoints")?;

        Ok(endpoints)
    }

    async fn get_endpoint(&self, id: EndpointId) -> Result<Option<Endpoint>> {
        let query = format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE id = $1");
        let endpoint = sqlx::query_as::<_, Endpoint>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("get_endpoint")?;
        Ok(endpoint)
    }

    async fn list_endpoints_by_job(&self, job_id: JobId) -> Result<Vec<Endpoint>> {
        let query = format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE job_id = $1 AND archived_at IS NULL ORDER BY created_at"
        );
        let endpoints = sqlx::query_as::<_, Endpoint>(&query)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .context("list_endpoints_by_job")?;
        Ok(endpoints)
    }

    async fn list_endpoints_due_for_analysis(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Endpoint>> {
        let query = format!(
            r#"
            SELECT {ENDPOINT_COLUMNS} FROM endpoints e
            LEFT JOIN LATERAL (
                SELECT s.next_analysis_at, s.analyzed_at
                FROM ai_sessions s
                WHERE s.endpoint_id = e.id
                ORDER BY s.analyzed_at DESC
                LIMIT 1
            ) latest ON true
            WHERE e.archived_at IS NULL
              AND (latest.analyzed_at IS NULL OR COALESCE(latest.next_analysis_at, latest.analyzed_at) <= $1)
            ORDER BY e.id
            LIMIT $2
            "#
        );
        let endpoints = sqlx::query_as::<_, Endpoint>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("list_endpoints_due_for_analysis")?;
        Ok(endpoints)
    }

    async fn count_active_endpoints_by_user(&self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM endpoints WHERE tenant_id = $1 AND archived_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("count_active_endpoints_by_user")?;
        Ok(count)
    }

    async fn create_endpoint(&self, new: NewEndpoint) -> Result<Endpoint> {
        let query = format!(
            r#"
            INSERT INTO endpoints (
                id, job_id, tenant_id, name, description,
                baseline_cron, baseline_interval_ms, min_interval_ms, max_interval_ms,
                url, method, headers, body, timeout_ms, max_execution_time_ms, max_response_size_kb,
                next_run_at, failure_count, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, 0, NOW(), NOW()
            )
            RETURNING {ENDPOINT_COLUMNS}
            "#
        );

        let endpoint = sqlx::query_as::<_, Endpoint>(&query)
            .bind(EndpointId::new())
            .bind(new.job_id)
            .bind(new.tenant_id)
            .bind(new.name)
            .bind(new.description)
            .bind(new.baseline_cron)
            .bind(new.baseline_interval_ms)
            .bind(new.min_interval_ms)
            .bind(new.max_interval_ms)
            .bind(new.url)
            .bind(new.method)
            .bind(new.headers)
            .bind(new.body)
            .bind(new.timeout_ms)
            .bind(new.max_execution_time_ms)
            .bind(new.max_response_size_kb)
            .bind(new.next_run_at)
            .fetch_one(&self.pool)
            .await
            .context("create_endpoint")?;

        Ok(endpoint)
    }

    async fn update_endpoint(&self, id: EndpointId, patch: EndpointPatch) -> Result<Endpoint> {
        // COALESCE-style partial update: a bound NULL leaves the column
        // untouched only when the caller passed `None` at the Rust level,
        // which we model by fetching-then-merging instead of a dynamic
        // query (patch columns are few and this keeps the SQL static).
        let current = self
            .get_endpoint(id)
            .await?
            .context("endpoint not found for update")?;

        let name = patch.name.unwrap_or(current.name);
        let description = patch.description.unwrap_or(current.description);
        let url = patch.url.unwrap_or(current.url);
        let method = patch.method.unwrap_or(current.method);
        let headers = patch.headers.unwrap_or(current.headers);
        let body = patch.body.unwrap_or(current.body);
        let timeout_ms = patch.timeout_ms.unwrap_or(current.timeout_ms);
        let max_execution_time_ms = patch
            .max_execution_time_ms
            .unwrap_or(current.max_execution_time_ms);
        let max_response_size_kb = patch
            .max_response_size_kb
            .unwrap_or(current.max_response_size_kb);
        let min_interval_ms = patch.min_interval_ms.unwrap_or(current.min_interval_ms);
        let max_interval_ms = patch.max_interval_ms.unwrap_or(current.max_interval_ms);

        let query = format!(
            r#"
            UPDATE endpoints SET
                name = $2, description = $3, url = $4, method = $5, headers = $6, body = $7,
                timeout_ms = $8, max_execution_time_ms = $9, max_response_size_kb = $10,
                min_interval_ms = $11, max_interval_ms = $12, updated_at = NOW()
            WHERE id = $1
            RETURNING {ENDPOINT_COLUMNS}
            "#
        );

        let endpoint = sqlx::query_as::<_, Endpoint>(&query)
            .bind(id)
            .bind(name)
            .bind(description)
            .bind(url)
            .bind(method)
            .bind(headers)
            .bind(body)
            .bind(timeout_ms)
            .bind(max_execution_time_ms)
            .bind(max_response_size_kb)
            .bind(min_interval_ms)
            .bind(max_interval_ms)
            .fetch_one(&self.pool)
            .await
            .context("update_endpoint")?;

        Ok(endpoint)
    }

    async fn archive_endpoint(&self, id: EndpointId, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE endpoints SET archived_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("archive_endpoint")?;
        Ok(())
    }

    async fn update_after_run(
        &self,
        id: EndpointId,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        failure_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE endpoints
            SET last_run_at = $2, next_run_at = $3, failure_count = $4,
                locked_until = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(last_run_at)
        .bind(next_run_at)
        .bind(failure_count)
        .execute(&self.pool)
        .await
        .context("update_after_run")?;
        Ok(())
    }

    async fn set_next_run_at_if_earlier(
        &self,
        id: EndpointId,
        candidate: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE endpoints SET next_run_at = $2, updated_at = NOW() WHERE id = $1 AND next_run_at > $2",
        )
        .bind(id)
        .bind(candidate)
        .execute(&self.pool)
        .await
        .context("set_next_run_at_if_earlier")?;
        Ok(())
    }

    async fn set_next_run_at(&self, id: EndpointId, next_run_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE endpoints SET next_run_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(next_run_at)
            .execute(&self.pool)
            .await
            .context("set_next_run_at")?;
        Ok(())
    }

    async fn write_ai_hint(&self, id: EndpointId, hint: AiHintWrite) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE endpoints SET
                ai_hint_interval_ms = $2,
                ai_hint_next_run_at = $3,
                ai_hint_expires_at = $4,
                ai_hint_reason = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hint.interval_ms)
        .bind(hint.next_run_at)
        .bind(hint.expires_at)
        .bind(hint.reason)
        .execute(&self.pool)
        .await
        .context("write_ai_hint")?;
        Ok(())
    }

    async fn clear_ai_hints(&self, id: EndpointId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE endpoints SET
                ai_hint_interval_ms = NULL,
                ai_hint_next_run_at = NULL,
                ai_hint_expires_at = NULL,
                ai_hint_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("clear_ai_hints")?;
        Ok(())
    }

    async fn set_paused_until(
        &self,
        id: EndpointId,
        paused_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE endpoints SET paused_until = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(paused_until)
            .execute(&self.pool)
            .await
            .context("set_paused_until")?;
        Ok(())
    }

    async fn clear_expired_lease(&self, id: EndpointId) -> Result<()> {
        sqlx::query("UPDATE endpoints SET locked_until = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("clear_expired_lease")?;
        Ok(())
    }

    async fn get_user_tier(&self, user_id: UserId) -> Result<Tier> {
        let tier: Tier = sqlx::query_scalar("SELECT tier FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("get_user_tier")?;
        Ok(tier)
    }
}
