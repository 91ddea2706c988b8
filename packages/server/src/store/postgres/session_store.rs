use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{AiSessionId, EndpointId, UserId};
use crate::domain::AiSession;
use crate::store::types::NewAiSession;
use crate::store::BaseSessionStore;

const SESSION_COLUMNS: &str = r#"
    id, endpoint_id, analyzed_at, tool_calls, reasoning,
    token_usage, duration_ms, next_analysis_at, endpoint_failure_count
"#;

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseSessionStore for PgSessionStore {
    async fn create_session(&self, new: NewAiSession) -> Result<AiSession> {
        let query = format!(
            r#"
            INSERT INTO ai_sessions (
                id, endpoint_id, analyzed_at, tool_calls, reasoning,
                token_usage, duration_ms, next_analysis_at, endpoint_failure_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let session = sqlx::query_as::<_, AiSession>(&query)
            .bind(AiSessionId::new())
            .bind(new.endpoint_id)
            .bind(new.analyzed_at)
            .bind(new.tool_calls)
            .bind(new.reasoning)
            .bind(new.token_usage)
            .bind(new.duration_ms)
            .bind(new.next_analysis_at)
            .bind(new.endpoint_failure_count)
            .fetch_one(&self.pool)
            .await
            .context("create_session")?;
        Ok(session)
    }

    async fn list_by_endpoint(&self, endpoint_id: EndpointId, limit: i64) -> Result<Vec<AiSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM ai_sessions WHERE endpoint_id = $1 ORDER BY analyzed_at DESC LIMIT $2"
        );
        let sessions = sqlx::query_as::<_, AiSession>(&query)
            .bind(endpoint_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("list_by_endpoint")?;
        Ok(sessions)
    }

    async fn get_token_usage_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(s.token_usage)
            FROM ai_sessions s
            JOIN endpoints e ON e.id = s.endpoint_id
            WHERE e.tenant_id = $1 AND s.analyzed_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .context("get_token_usage_since")?;
        Ok(total.unwrap_or(0))
    }

    async fn get_ai_session(&self, id: AiSessionId) -> Result<Option<AiSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM ai_sessions WHERE id = $1");
        let session = sqlx::query_as::<_, AiSession>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("get_ai_session")?;
        Ok(session)
    }
}
