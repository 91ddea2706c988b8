//! AI Planner Worker (C10, §4.8): on its own cadence, inspects endpoint
//! health, drives an LLM through the bounded tool set (C11), and persists
//! an `AiSession`. Mirrors the scheduler worker's tick-loop shape
//! (`scheduler::SchedulerWorker`) but polls `list_endpoints_due_for_analysis`
//! instead of claiming leases, since re-running a stale analysis is
//! harmless (§5 "single-flight per endpoint per cadence").

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use openai_client::tool::ErasedTool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::EndpointId;
use crate::domain::{Endpoint, HealthSummary, Tier};
use crate::kernel::traits::{BaseClock, BaseLlmClient};
use crate::planner::tools::{
    ClearHintsTool, GetLatestResponseTool, GetResponseHistoryTool, GetSiblingLatestResponsesTool,
    PauseUntilTool, ProposeIntervalTool, ProposeNextTimeTool, SubmitAnalysisTool,
    SUBMIT_ANALYSIS_TOOL_NAME,
};
use crate::quota::{self, QuotaDecision};
use crate::store::types::NewAiSession;
use crate::store::{BaseEndpointStore, BaseRunStore, BaseSessionStore};

/// Default analysis cadence when neither the model nor the endpoint's
/// baseline schedule supplies one (§4.8 step 6).
const DEFAULT_REANALYSIS_MS: i64 = 5 * 60 * 1000;

/// Hard cap on tool calls per session, enforced defensively even if the
/// model ignores `finalToolName` (§4.8 step 4).
const MAX_TOOL_CALLS: usize = 15;

/// Token budget handed to one planner session (§4.8 step 4).
const MAX_TOKENS: u64 = 1500;

#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Endpoints considered per tick.
    pub batch_size: i64,
    /// Sleep duration when no endpoint is due for analysis.
    pub idle_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            idle_ms: 5_000,
        }
    }
}

pub struct PlannerWorker {
    endpoint_store: Arc<dyn BaseEndpointStore>,
    run_store: Arc<dyn BaseRunStore>,
    session_store: Arc<dyn BaseSessionStore>,
    llm_client: Arc<dyn BaseLlmClient>,
    clock: Arc<dyn BaseClock>,
    config: PlannerConfig,
}

impl PlannerWorker {
    pub fn new(
        endpoint_store: Arc<dyn BaseEndpointStore>,
        run_store: Arc<dyn BaseRunStore>,
        session_store: Arc<dyn BaseSessionStore>,
        llm_client: Arc<dyn BaseLlmClient>,
        clock: Arc<dyn BaseClock>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            endpoint_store,
            run_store,
            session_store,
            llm_client,
            clock,
            config,
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(batch_size = self.config.batch_size, "planner worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let now = self.clock.now();
            let due = match self
                .endpoint_store
                .list_endpoints_due_for_analysis(now, self.config.batch_size)
                .await
            {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    error!(error = %e, "failed to list endpoints due for analysis");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if due.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(self.config.idle_ms)) => {}
                }
                continue;
            }

            debug!(count = due.len(), "endpoints due for analysis");

            for endpoint in due {
                if shutdown.is_cancelled() {
                    break;
                }
                // §4.8 step 7: one endpoint's failure must never poison the
                // rest of the batch.
                self.analyze_one(endpoint).await;
            }
        }

        info!("planner worker stopped");
        Ok(())
    }

    async fn analyze_one(&self, endpoint: Endpoint) {
        let endpoint_id = endpoint.id;

        let tier = match self.endpoint_store.get_user_tier(endpoint.tenant_id).await {
            Ok(t) => t,
            Err(e) => {
                warn!(endpoint_id = %endpoint_id, error = %e, "tier lookup failed, skipping analysis");
                return;
            }
        };

        let now = self.clock.now();
        if quota::can_proceed(self.session_store.as_ref(), endpoint.tenant_id, tier, now).await
            == QuotaDecision::Deny
        {
            debug!(endpoint_id = %endpoint_id, "AI token quota exceeded, skipping analysis");
            return;
        }

        let health = match self
            .run_store
            .get_health_summary_multi_window(endpoint_id, now)
            .await
        {
            Ok(h) => h,
            Err(e) => {
                warn!(endpoint_id = %endpoint_id, error = %e, "failed to load health summary, skipping analysis");
                return;
            }
        };

        let system_prompt = build_system_prompt();
        let user_message = build_user_message(&endpoint, &health);
        let tools = build_tool_set(
            endpoint_id,
            endpoint.job_id,
            tier,
            now,
            self.endpoint_store.clone(),
            self.run_store.clone(),
        );

        let started = self.clock.now();
        let response = match self
            .llm_client
            .plan_with_tools(
                &system_prompt,
                &user_message,
                tools,
                MAX_TOKENS,
                MAX_TOOL_CALLS,
                SUBMIT_ANALYSIS_TOOL_NAME,
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(endpoint_id = %endpoint_id, error = %e, "planner LLM session failed, skipping endpoint");
                return;
            }
        };
        let duration_ms = (self.clock.now() - started).num_milliseconds();

        let reasoning = extract_reasoning(&response);
        let next_analysis_in_ms = extract_next_analysis_in_ms(&response);

        let next_analysis_at = now
            + chrono::Duration::milliseconds(
                next_analysis_in_ms
                    .or(endpoint.baseline_interval_ms)
                    .unwrap_or(DEFAULT_REANALYSIS_MS),
            );

        let tool_calls = serde_json::to_value(
            response
                .tool_calls
                .into_iter()
                .map(crate::domain::ToolCallRecord::from)
                .collect::<Vec<_>>(),
        )
        .unwrap_or(serde_json::Value::Array(vec![]));

        let new_session = NewAiSession {
            endpoint_id,
            analyzed_at: now,
            tool_calls,
            reasoning,
            token_usage: response.token_usage.map(|t| t as i64),
            duration_ms: Some(duration_ms),
            next_analysis_at: Some(next_analysis_at),
            endpoint_failure_count: endpoint.failure_count,
        };

        match self.session_store.create_session(new_session).await {
            Ok(session) => {
                debug!(endpoint_id = %endpoint_id, session_id = %session.id, "analysis persisted");
            }
            Err(e) => {
                error!(endpoint_id = %endpoint_id, error = %e, "failed to persist AI session");
            }
        }
    }
}

fn build_system_prompt() -> &'static str {
    "You are the scheduling analyst for an adaptive HTTP job scheduler. \
     You are given one endpoint's current schedule state and recent health. \
     Use the available tools to inspect recent responses if you need more \
     context, then decide whether to leave the schedule alone, propose a \
     new interval or one-shot time, pause the endpoint, or clear a stale \
     hint. Always finish by calling submit_analysis with your reasoning."
}

fn build_user_message(endpoint: &Endpoint, health: &HealthSummary) -> String {
    format!(
        "Endpoint: {name} ({method} {url})\n\
         Baseline: cron={cron:?} interval_ms={interval:?}\n\
         Failure count: {failure_count}\n\
         Paused until: {paused:?}\n\
         Active AI hint: interval_ms={hint_interval:?} next_run_at={hint_next:?} expires_at={hint_expires:?} reason={hint_reason:?}\n\
         Health (1h/4h/24h success rate): {r1:.2}/{r4:.2}/{r24:.2}\n\
         Average duration (ms): {avg_duration:?}\n\
         Failure streak: {streak}",
        name = endpoint.name,
        method = format!("{:?}", endpoint.method),
        url = endpoint.url,
        cron = endpoint.baseline_cron,
        interval = endpoint.baseline_interval_ms,
        failure_count = endpoint.failure_count,
        paused = endpoint.paused_until,
        hint_interval = endpoint.ai_hint_interval_ms,
        hint_next = endpoint.ai_hint_next_run_at,
        hint_expires = endpoint.ai_hint_expires_at,
        hint_reason = endpoint.ai_hint_reason,
        r1 = health.window_1h.success_rate,
        r4 = health.window_4h.success_rate,
        r24 = health.window_24h.success_rate,
        avg_duration = health.avg_duration_ms,
        streak = health.failure_streak,
    )
}

#[allow(clippy::too_many_arguments)]
fn build_tool_set(
    endpoint_id: EndpointId,
    job_id: crate::common::JobId,
    tier: Tier,
    now: chrono::DateTime<chrono::Utc>,
    endpoint_store: Arc<dyn BaseEndpointStore>,
    run_store: Arc<dyn BaseRunStore>,
) -> Vec<Box<dyn ErasedTool>> {
    vec![
        Box::new(GetLatestResponseTool {
            endpoint_id,
            run_store: run_store.clone(),
        }),
        Box::new(GetResponseHistoryTool {
            endpoint_id,
            run_store: run_store.clone(),
        }),
        Box::new(GetSiblingLatestResponsesTool {
            job_id,
            endpoint_id,
            run_store,
        }),
        Box::new(ProposeIntervalTool {
            endpoint_id,
            endpoint_store: endpoint_store.clone(),
            tier,
            now,
        }),
        Box::new(ProposeNextTimeTool {
            endpoint_id,
            endpoint_store: endpoint_store.clone(),
            now,
        }),
        Box::new(PauseUntilTool {
            endpoint_id,
            endpoint_store: endpoint_store.clone(),
            now,
        }),
        Box::new(ClearHintsTool {
            endpoint_id,
            endpoint_store,
        }),
        Box::new(SubmitAnalysisTool),
    ]
}

/// Extracts the reasoning the model gave via `submit_analysis`, falling
/// back to a fixed placeholder if the session ended without ever calling
/// it (§4.9 "If absent after the 15-call cap or model end").
fn extract_reasoning(response: &openai_client::agent::BoundedAgentResponse) -> String {
    response
        .terminal_call
        .as_ref()
        .and_then(|call| call.args.get("reasoning"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "No reasoning provided".to_string())
}

fn extract_next_analysis_in_ms(response: &openai_client::agent::BoundedAgentResponse) -> Option<i64> {
    response
        .terminal_call
        .as_ref()
        .and_then(|call| call.args.get("next_analysis_in_ms"))
        .and_then(|v| v.as_i64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{JobId, UserId};
    use crate::domain::HttpMethod;
    use chrono::Utc;

    fn sample_endpoint() -> Endpoint {
        let now = Utc::now();
        Endpoint {
            id: EndpointId::new(),
            job_id: JobId::new(),
            tenant_id: UserId::new(),
            name: "probe".into(),
            description: None,
            baseline_cron: None,
            baseline_interval_ms: Some(60_000),
            min_interval_ms: None,
            max_interval_ms: None,
            url: "https://example.com/health".into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            timeout_ms: None,
            max_execution_time_ms: None,
            max_response_size_kb: None,
            next_run_at: now,
            last_run_at: None,
            failure_count: 2,
            paused_until: None,
            locked_until: None,
            ai_hint_interval_ms: None,
            ai_hint_next_run_at: None,
            ai_hint_expires_at: None,
            ai_hint_reason: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn user_message_includes_failure_count_and_health() {
        let endpoint = sample_endpoint();
        let health = HealthSummary {
            window_1h: crate::domain::run::WindowHealth::from_counts(1, 1),
            ..Default::default()
        };
        let msg = build_user_message(&endpoint, &health);
        assert!(msg.contains("Failure count: 2"));
        assert!(msg.contains("probe"));
    }

    #[test]
    fn tool_set_includes_every_named_tool() {
        let store = Arc::new(crate::store::memory::MemoryStore::new());
        let tools = build_tool_set(
            EndpointId::new(),
            JobId::new(),
            Tier::Pro,
            Utc::now(),
            store.clone(),
            store,
        );
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert!(names.contains(&"get_latest_response"));
        assert!(names.contains(&"propose_interval"));
        assert!(names.contains(&"submit_analysis"));
        assert_eq!(tools.len(), 8);
    }
}
