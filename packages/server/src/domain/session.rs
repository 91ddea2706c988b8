//! AISession (§3): one LLM analysis of an endpoint's recent health,
//! recorded by the planner worker (C10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::{AiSessionId, EndpointId};

/// One step of a tool-calling session, as persisted on an `AISession` row
/// (§3 "toolCalls"). Mirrors `openai_client::agent::ToolCallRecord`, kept
/// as a distinct type so the store layer doesn't depend on the LLM client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: serde_json::Value,
    pub result: serde_json::Value,
}

impl From<openai_client::agent::ToolCallRecord> for ToolCallRecord {
    fn from(r: openai_client::agent::ToolCallRecord) -> Self {
        Self {
            tool: r.tool,
            args: r.args,
            result: r.result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AiSession {
    pub id: AiSessionId,
    pub endpoint_id: EndpointId,
    pub analyzed_at: DateTime<Utc>,
    /// Stored as a JSON array column; see `ToolCallRecord`.
    pub tool_calls: serde_json::Value,
    pub reasoning: String,
    pub token_usage: Option<i64>,
    pub duration_ms: Option<i64>,
    pub next_analysis_at: Option<DateTime<Utc>>,
    pub endpoint_failure_count: i32,
}

impl AiSession {
    pub fn tool_call_records(&self) -> Vec<ToolCallRecord> {
        serde_json::from_value(self.tool_calls.clone()).unwrap_or_default()
    }
}
