// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (the Governor, metering, quota) is plain functions that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseClock, BaseLlmClient)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openai_client::agent::BoundedAgentResponse;
use openai_client::tool::ErasedTool;

// =============================================================================
// Clock (C1) - current time, test-substitutable
// =============================================================================

/// Current time, abstracted so the Governor and workers can be driven by a
/// fixed clock in tests without touching the system clock.
pub trait BaseClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl BaseClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, used in tests and property checks.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl BaseClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// =============================================================================
// LLM tool-calling client (external interfaces §6: `planWithTools`)
// =============================================================================

/// LLM client capable of driving a bounded tool-calling loop (§4.8, §6).
///
/// Tools are type-erased (`openai_client::ErasedTool`) because the planner
/// builds a fresh, endpoint-scoped set of tool instances per session (§4.9)
/// rather than a fixed compile-time set; implementations only need to hand
/// them to the underlying model and report back what happened.
#[async_trait]
pub trait BaseLlmClient: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn plan_with_tools(
        &self,
        system_prompt: &str,
        user_message: &str,
        tools: Vec<Box<dyn ErasedTool>>,
        max_tokens: u64,
        max_tool_calls: usize,
        final_tool_name: &str,
    ) -> Result<BoundedAgentResponse>;
}
