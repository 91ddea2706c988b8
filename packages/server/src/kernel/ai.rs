// AI planner LLM client (C10/C11, §6 `planWithTools` contract).
//
// This is the infrastructure implementation of BaseLlmClient. Business
// logic (what to put in the prompt, which tools to hand over) lives in
// `crate::planner`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use openai_client::agent::BoundedAgentResponse;
use openai_client::tool::ErasedTool;
use openai_client::OpenAIClient;

use super::BaseLlmClient;

/// Default chat-completion model used for planner sessions. Kept here
/// rather than in config because it's an implementation detail of this
/// particular LLM backend, not an operator-tunable knob (§6 config list
/// only calls out the API key).
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-backed implementation of the bounded tool-calling contract.
pub struct OpenAiPlannerClient {
    client: OpenAIClient,
    model: String,
}

impl OpenAiPlannerClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: OpenAIClient::new(api_key),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl BaseLlmClient for OpenAiPlannerClient {
    async fn plan_with_tools(
        &self,
        system_prompt: &str,
        user_message: &str,
        tools: Vec<Box<dyn ErasedTool>>,
        max_tokens: u64,
        max_tool_calls: usize,
        final_tool_name: &str,
    ) -> Result<BoundedAgentResponse> {
        let agent = self
            .client
            .agent(&self.model)
            .system(system_prompt)
            .tools_erased(tools)
            .max_tokens(max_tokens)
            // One extra iteration of headroom over the tool-call cap: each
            // iteration may surface zero or more tool calls, so iterations
            // and tool calls aren't a 1:1 count.
            .max_iterations(max_tool_calls + 2)
            .build();

        agent
            .run_bounded(user_message, max_tool_calls, final_tool_name)
            .await
            .context("planner LLM session failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_configured_model() {
        let client = OpenAiPlannerClient::new("sk-test".into());
        assert_eq!(client.model, DEFAULT_MODEL);
    }

    #[test]
    fn with_model_overrides_default() {
        let client = OpenAiPlannerClient::new("sk-test".into()).with_model("gpt-4o");
        assert_eq!(client.model, "gpt-4o");
    }
}
