//! LLM-backed agents and the network loop that drives the coding agent.

pub mod network;
pub mod prompts;
pub mod tools;

use anyhow::Result;
use tracing::{Instrument, debug, info_span};
use vibe_common::{AgentOutput, OutputMessage};

use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient, ToolCall};
use tools::{Tool, ToolContext};

pub use network::{Network, NetworkOutcome, NetworkRun};

/// A single actor: one system prompt, one model, optional tools.
pub struct Agent {
    pub name: String,
    pub description: String,
    pub system: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub tools: Vec<Box<dyn Tool>>,
}

/// What one agent turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Text of the assistant message, when it carried any.
    pub text: Option<String>,
    pub tool_calls: usize,
}

impl Agent {
    fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            system: self.system.clone(),
            messages,
            tools: self.tools.iter().map(|t| t.spec()).collect(),
        }
    }

    /// One inference followed by every tool call it asked for, in order.
    ///
    /// The assistant message and each tool result are appended to
    /// `history`. Afterwards the assistant text is offered to the shared
    /// state, which keeps it as the summary when it carries the completion
    /// marker.
    pub async fn run_turn(
        &self,
        llm: &dyn LlmClient,
        history: &mut Vec<ChatMessage>,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Turn> {
        let request = self.request(history.clone());
        let completion: Completion = ctx
            .steps
            .run(&self.name, || async { Ok(llm.complete(&request).await?) })
            .await?;

        let message = completion.message;
        let calls = message.tool_calls.clone();
        let text = message.text().map(str::to_string);
        history.push(message);

        for call in &calls {
            let span = info_span!("tool", tool = %call.name, call_id = %call.id);
            let result = self.call_tool(call, ctx).instrument(span).await?;
            history.push(ChatMessage::tool_result(&call.id, result));
        }

        if let Some(ref text) = text
            && ctx.state.record_response(text)
        {
            debug!(agent = %self.name, "Completion marker received");
        }

        Ok(Turn {
            text,
            tool_calls: calls.len(),
        })
    }

    async fn call_tool(&self, call: &ToolCall, ctx: &mut ToolContext<'_>) -> Result<String> {
        match self.tools.iter().find(|t| t.name() == call.name) {
            Some(tool) => tool.call(call.arguments.clone(), ctx).await,
            None => Ok(format!("Error: unknown tool '{}'", call.name)),
        }
    }

    /// Single-shot invocation without tools, recorded as one step.
    ///
    /// Returns the assistant's output as a list of tagged messages so the
    /// caller can run it through `parse_agent_output`.
    pub async fn run_once(
        &self,
        llm: &dyn LlmClient,
        steps: &crate::workflow::steps::StepContext,
        input: &str,
    ) -> Result<AgentOutput> {
        let request = self.request(vec![ChatMessage::user(input)]);
        let completion: Completion = steps
            .run(&self.name, || async { Ok(llm.complete(&request).await?) })
            .await?;
        let messages = match completion.message.content {
            Some(content) if !content.is_empty() => vec![OutputMessage::text(content)],
            _ => completion
                .message
                .tool_calls
                .into_iter()
                .map(|call| OutputMessage::ToolCall {
                    name: call.name,
                    arguments: call.arguments,
                })
                .collect(),
        };
        Ok(AgentOutput::Messages(messages))
    }
}

/// The coding agent: writes the app inside the sandbox.
pub fn code_agent(model: &str, temperature: f32) -> Agent {
    Agent {
        name: "code-agent".to_string(),
        description: "An expert coding agent".to_string(),
        system: prompts::CODE_AGENT_PROMPT.to_string(),
        model: model.to_string(),
        temperature: Some(temperature),
        tools: tools::default_tools(),
    }
}

/// Produces a short display title from the task summary.
pub fn fragment_title_generator(model: &str) -> Agent {
    Agent {
        name: "fragment-title-generator".to_string(),
        description: "A fragment title generator".to_string(),
        system: prompts::FRAGMENT_TITLE_PROMPT.to_string(),
        model: model.to_string(),
        temperature: None,
        tools: Vec::new(),
    }
}

/// Produces the user-facing reply from the task summary.
pub fn response_generator(model: &str) -> Agent {
    Agent {
        name: "response-generator".to_string(),
        description: "A response generator".to_string(),
        system: prompts::RESPONSE_PROMPT.to_string(),
        model: model.to_string(),
        temperature: None,
        tools: Vec::new(),
    }
}
