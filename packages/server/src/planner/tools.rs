//! Tool Surface (C11, §4.9): the concrete tools handed to the planner's
//! bounded tool-calling loop. Each tool is constructed fresh per session,
//! closing over the endpoint/job it's scoped to and the stores it needs —
//! there is no shared, long-lived tool registry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::{EndpointId, JobId};
use crate::domain::{truncate_for_llm, RunStatus, Tier};
use crate::store::types::AiHintWrite;
use crate::store::{BaseEndpointStore, BaseRunStore};

/// Default TTL applied to a `propose_interval` hint when the model omits
/// one (§4.9).
pub const PROPOSE_INTERVAL_DEFAULT_TTL_MINUTES: i64 = 60;

/// Default TTL applied to a `propose_next_time` hint when the model omits
/// one (§4.9).
pub const PROPOSE_NEXT_TIME_DEFAULT_TTL_MINUTES: i64 = 30;

/// Name of the terminal tool that ends a planner session (§4.8, §4.9).
pub const SUBMIT_ANALYSIS_TOOL_NAME: &str = "submit_analysis";

#[derive(Debug, Error)]
pub enum ToolExecError {
    #[error("{0}")]
    Rejected(String),
    #[error("store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for ToolExecError {
    fn from(e: anyhow::Error) -> Self {
        ToolExecError::Store(e.to_string())
    }
}

// ---------------------------------------------------------------------
// get_latest_response
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetLatestResponseArgs {}

#[derive(Debug, Serialize)]
pub struct GetLatestResponseOutput {
    pub found: bool,
    pub status: Option<RunStatus>,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct GetLatestResponseTool {
    pub endpoint_id: EndpointId,
    pub run_store: Arc<dyn BaseRunStore>,
}

#[async_trait]
impl openai_client::Tool for GetLatestResponseTool {
    const NAME: &'static str = "get_latest_response";
    type Args = GetLatestResponseArgs;
    type Output = GetLatestResponseOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Fetch the most recent completed response for this endpoint."
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        match self.run_store.get_latest_response(self.endpoint_id).await? {
            Some(run) => Ok(GetLatestResponseOutput {
                found: true,
                status: Some(run.status),
                status_code: run.status_code,
                response_body: run.response_body.as_deref().map(truncate_for_llm),
                finished_at: run.finished_at,
            }),
            None => Ok(GetLatestResponseOutput {
                found: false,
                status: None,
                status_code: None,
                response_body: None,
                finished_at: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------
// get_response_history
// ---------------------------------------------------------------------

/// Hard cap on history page size (§4.9): the tool clamps, it doesn't
/// error, since the model can always ask again with a smaller window.
const MAX_HISTORY_LIMIT: i64 = 10;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetResponseHistoryArgs {
    /// Number of past runs to return, capped at 10.
    pub limit: Option<u32>,
    /// How many of the most recent runs to skip before returning results.
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub status: RunStatus,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct GetResponseHistoryOutput {
    pub entries: Vec<HistoryEntry>,
}

pub struct GetResponseHistoryTool {
    pub endpoint_id: EndpointId,
    pub run_store: Arc<dyn BaseRunStore>,
}

#[async_trait]
impl openai_client::Tool for GetResponseHistoryTool {
    const NAME: &'static str = "get_response_history";
    type Args = GetResponseHistoryArgs;
    type Output = GetResponseHistoryOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Fetch up to the last 10 completed runs for this endpoint, most recent first."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let limit = (args.limit.unwrap_or(MAX_HISTORY_LIMIT as u32) as i64).min(MAX_HISTORY_LIMIT);
        let offset = args.offset.unwrap_or(0) as i64;
        let runs = self
            .run_store
            .get_response_history(self.endpoint_id, limit, offset)
            .await?;
        Ok(GetResponseHistoryOutput {
            entries: runs
                .into_iter()
                .map(|r| HistoryEntry {
                    status: r.status,
                    status_code: r.status_code,
                    response_body: r.response_body.as_deref().map(truncate_for_llm),
                    started_at: r.started_at,
                    finished_at: r.finished_at,
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------
// get_sibling_latest_responses
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetSiblingLatestResponsesArgs {}

#[derive(Debug, Serialize)]
pub struct SiblingEntry {
    pub endpoint_name: String,
    pub status: RunStatus,
    pub response_body: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct GetSiblingLatestResponsesOutput {
    pub siblings: Vec<SiblingEntry>,
}

pub struct GetSiblingLatestResponsesTool {
    pub job_id: JobId,
    pub endpoint_id: EndpointId,
    pub run_store: Arc<dyn BaseRunStore>,
}

#[async_trait]
impl openai_client::Tool for GetSiblingLatestResponsesTool {
    const NAME: &'static str = "get_sibling_latest_responses";
    type Args = GetSiblingLatestResponsesArgs;
    type Output = GetSiblingLatestResponsesOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Fetch the most recent response from every other endpoint under the same job, for cross-endpoint context."
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        let siblings = self
            .run_store
            .get_sibling_latest_responses(self.job_id, self.endpoint_id)
            .await?;
        Ok(GetSiblingLatestResponsesOutput {
            siblings: siblings
                .into_iter()
                .map(|s| SiblingEntry {
                    endpoint_name: s.endpoint_name,
                    status: s.status,
                    response_body: s.response_body.as_deref().map(truncate_for_llm),
                    finished_at: s.finished_at,
                })
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------
// propose_interval
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProposeIntervalArgs {
    /// Proposed interval in milliseconds between future runs.
    pub interval_ms: i64,
    /// Why this interval is being proposed.
    pub reason: Option<String>,
    /// How many minutes the hint should remain active before expiring.
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProposeIntervalOutput {
    pub accepted: bool,
    pub applied_interval_ms: i64,
    pub expires_at: DateTime<Utc>,
}

pub struct ProposeIntervalTool {
    pub endpoint_id: EndpointId,
    pub endpoint_store: Arc<dyn BaseEndpointStore>,
    pub tier: Tier,
    pub now: DateTime<Utc>,
}

#[async_trait]
impl openai_client::Tool for ProposeIntervalTool {
    const NAME: &'static str = "propose_interval";
    type Args = ProposeIntervalArgs;
    type Output = ProposeIntervalOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Propose a new recurring interval (in milliseconds) for this endpoint's schedule, overriding the baseline until it expires."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let endpoint = self
            .endpoint_store
            .get_endpoint(self.endpoint_id)
            .await?
            .ok_or_else(|| ToolExecError::Rejected("endpoint not found".into()))?;

        let floor = endpoint
            .min_interval_ms
            .unwrap_or(0)
            .max(self.tier.min_interval_ms());
        let ceiling = endpoint.max_interval_ms.unwrap_or(i64::MAX);

        if args.interval_ms < floor {
            return Err(ToolExecError::Rejected(format!(
                "interval_ms {} is below the effective floor of {}ms",
                args.interval_ms, floor
            )));
        }
        if args.interval_ms > ceiling {
            return Err(ToolExecError::Rejected(format!(
                "interval_ms {} exceeds this endpoint's max_interval_ms of {}ms",
                args.interval_ms, ceiling
            )));
        }

        let ttl_minutes = args
            .ttl_minutes
            .unwrap_or(PROPOSE_INTERVAL_DEFAULT_TTL_MINUTES);
        let expires_at = self.now + chrono::Duration::minutes(ttl_minutes);

        self.endpoint_store
            .write_ai_hint(
                self.endpoint_id,
                AiHintWrite {
                    interval_ms: Some(args.interval_ms),
                    next_run_at: None,
                    expires_at,
                    reason: args.reason,
                },
            )
            .await?;

        self.endpoint_store
            .set_next_run_at_if_earlier(self.endpoint_id, self.now + chrono::Duration::milliseconds(args.interval_ms))
            .await?;

        Ok(ProposeIntervalOutput {
            accepted: true,
            applied_interval_ms: args.interval_ms,
            expires_at,
        })
    }
}

// ---------------------------------------------------------------------
// propose_next_time
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProposeNextTimeArgs {
    /// Proposed next run time, RFC3339 (e.g. "2026-07-29T03:00:00Z").
    pub next_run_at: String,
    pub reason: Option<String>,
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ProposeNextTimeOutput {
    pub accepted: bool,
    pub applied_next_run_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct ProposeNextTimeTool {
    pub endpoint_id: EndpointId,
    pub endpoint_store: Arc<dyn BaseEndpointStore>,
    pub now: DateTime<Utc>,
}

#[async_trait]
impl openai_client::Tool for ProposeNextTimeTool {
    const NAME: &'static str = "propose_next_time";
    type Args = ProposeNextTimeArgs;
    type Output = ProposeNextTimeOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Propose a single one-shot next run time for this endpoint (RFC3339 timestamp)."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let next_run_at: DateTime<Utc> = args
            .next_run_at
            .parse()
            .map_err(|e| ToolExecError::Rejected(format!("invalid timestamp: {e}")))?;

        if next_run_at <= self.now {
            return Err(ToolExecError::Rejected(
                "next_run_at must be in the future".into(),
            ));
        }

        let ttl_minutes = args
            .ttl_minutes
            .unwrap_or(PROPOSE_NEXT_TIME_DEFAULT_TTL_MINUTES);
        let expires_at = self.now + chrono::Duration::minutes(ttl_minutes);

        self.endpoint_store
            .write_ai_hint(
                self.endpoint_id,
                AiHintWrite {
                    interval_ms: None,
                    next_run_at: Some(next_run_at),
                    expires_at,
                    reason: args.reason,
                },
            )
            .await?;

        self.endpoint_store
            .set_next_run_at_if_earlier(self.endpoint_id, next_run_at)
            .await?;

        Ok(ProposeNextTimeOutput {
            accepted: true,
            applied_next_run_at: next_run_at,
            expires_at,
        })
    }
}

// ---------------------------------------------------------------------
// pause_until
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PauseUntilArgs {
    /// RFC3339 timestamp to pause dispatch until.
    pub paused_until: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PauseUntilOutput {
    pub accepted: bool,
    pub paused_until: DateTime<Utc>,
}

pub struct PauseUntilTool {
    pub endpoint_id: EndpointId,
    pub endpoint_store: Arc<dyn BaseEndpointStore>,
    pub now: DateTime<Utc>,
}

#[async_trait]
impl openai_client::Tool for PauseUntilTool {
    const NAME: &'static str = "pause_until";
    type Args = PauseUntilArgs;
    type Output = PauseUntilOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Pause this endpoint's dispatch until a given RFC3339 timestamp."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let paused_until: DateTime<Utc> = args
            .paused_until
            .parse()
            .map_err(|e| ToolExecError::Rejected(format!("invalid timestamp: {e}")))?;

        if paused_until <= self.now {
            return Err(ToolExecError::Rejected(
                "paused_until must be in the future".into(),
            ));
        }

        self.endpoint_store
            .set_paused_until(self.endpoint_id, Some(paused_until))
            .await?;

        Ok(PauseUntilOutput {
            accepted: true,
            paused_until,
        })
    }
}

// ---------------------------------------------------------------------
// clear_hints
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ClearHintsArgs {}

#[derive(Debug, Serialize)]
pub struct ClearHintsOutput {
    pub cleared: bool,
}

pub struct ClearHintsTool {
    pub endpoint_id: EndpointId,
    pub endpoint_store: Arc<dyn BaseEndpointStore>,
}

#[async_trait]
impl openai_client::Tool for ClearHintsTool {
    const NAME: &'static str = "clear_hints";
    type Args = ClearHintsArgs;
    type Output = ClearHintsOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Clear any active AI scheduling hint on this endpoint, reverting to its baseline schedule."
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.endpoint_store.clear_ai_hints(self.endpoint_id).await?;
        Ok(ClearHintsOutput { cleared: true })
    }
}

// ---------------------------------------------------------------------
// submit_analysis (terminal tool)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubmitAnalysisArgs {
    /// Free-text summary of the analysis and the reasoning behind any
    /// action taken.
    pub reasoning: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnalysisOutput {
    pub received: bool,
}

pub struct SubmitAnalysisTool;

#[async_trait]
impl openai_client::Tool for SubmitAnalysisTool {
    const NAME: &'static str = SUBMIT_ANALYSIS_TOOL_NAME;
    type Args = SubmitAnalysisArgs;
    type Output = SubmitAnalysisOutput;
    type Error = ToolExecError;

    fn description(&self) -> &str {
        "Call this to end the analysis session, with a summary of what was found and any scheduling action taken."
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(SubmitAnalysisOutput { received: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;
    use openai_client::Tool;

    fn endpoint_with_bounds(
        store: &MemoryStore,
        min_interval_ms: Option<i64>,
        max_interval_ms: Option<i64>,
    ) -> EndpointId {
        let now = Utc::now();
        let endpoint = crate::domain::Endpoint {
            id: EndpointId::new(),
            job_id: JobId::new(),
            tenant_id: crate::common::UserId::new(),
            name: "test".into(),
            description: None,
            baseline_cron: None,
            baseline_interval_ms: Some(60_000),
            min_interval_ms,
            max_interval_ms,
            url: "https://example.com".into(),
            method: crate::domain::HttpMethod::Get,
            headers: None,
            body: None,
            timeout_ms: None,
            max_execution_time_ms: None,
            max_response_size_kb: None,
            next_run_at: now,
            last_run_at: None,
            failure_count: 0,
            paused_until: None,
            locked_until: None,
            ai_hint_interval_ms: None,
            ai_hint_next_run_at: None,
            ai_hint_expires_at: None,
            ai_hint_reason: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = endpoint.id;
        store.insert_endpoint(endpoint);
        id
    }

    #[tokio::test]
    async fn propose_interval_rejects_below_floor() {
        let store = Arc::new(MemoryStore::new());
        let endpoint_id = endpoint_with_bounds(&store, Some(30_000), None);
        let tool = ProposeIntervalTool {
            endpoint_id,
            endpoint_store: store.clone(),
            tier: Tier::Pro,
            now: Utc::now(),
        };
        let err = tool
            .call(ProposeIntervalArgs {
                interval_ms: 5_000,
                reason: None,
                ttl_minutes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolExecError::Rejected(_)));
    }

    #[tokio::test]
    async fn propose_interval_accepts_within_bounds() {
        let store = Arc::new(MemoryStore::new());
        let endpoint_id = endpoint_with_bounds(&store, Some(10_000), Some(600_000));
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let tool = ProposeIntervalTool {
            endpoint_id,
            endpoint_store: store.clone(),
            tier: Tier::Pro,
            now,
        };
        let output = tool
            .call(ProposeIntervalArgs {
                interval_ms: 120_000,
                reason: Some("elevated error rate".into()),
                ttl_minutes: None,
            })
            .await
            .unwrap();
        assert!(output.accepted);
        assert_eq!(
            output.expires_at,
            now + chrono::Duration::minutes(PROPOSE_INTERVAL_DEFAULT_TTL_MINUTES)
        );
    }

    #[tokio::test]
    async fn propose_next_time_rejects_past_timestamps() {
        let store = Arc::new(MemoryStore::new());
        let endpoint_id = endpoint_with_bounds(&store, None, None);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let tool = ProposeNextTimeTool {
            endpoint_id,
            endpoint_store: store.clone(),
            now,
        };
        let err = tool
            .call(ProposeNextTimeArgs {
                next_run_at: (now - chrono::Duration::minutes(5)).to_rfc3339(),
                reason: None,
                ttl_minutes: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolExecError::Rejected(_)));
    }
}
