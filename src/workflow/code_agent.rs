//! The `code-agent/run` workflow function.
//!
//! Steps, in order: provision a sandbox, load prior conversation, run the
//! agent network, summarize with the title and response agents, derive the
//! sandbox URL, persist the result. Every step goes through the journal, so
//! a re-execution of the same run picks up where the last one stopped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vibe_common::{
    AgentState, FileMap, MessageRole, MessageType, MessageWithFragment, NewFragment,
    WorkflowOutput, parse_agent_output,
};

use crate::agent::tools::ToolContext;
use crate::agent::{Network, code_agent, fragment_title_generator, response_generator};
use crate::config::VibeConfig;
use crate::db::DbHandle;
use crate::llm::{ChatMessage, LlmClient, OpenAiClient};
use crate::sandbox::{HttpSandboxProvider, SandboxProvider, connect_sandbox};
use crate::workflow::steps::StepContext;

/// Stored as the assistant reply when a run produced nothing usable.
pub const ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Title returned to the caller, independent of the generated one.
pub const RESULT_TITLE: &str = "Fragment";

/// Tunables of the workflow, resolved from [`VibeConfig`].
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub template: String,
    pub sandbox_timeout: Duration,
    pub app_port: u16,
    pub model: String,
    pub temperature: f32,
    pub summary_model: String,
    pub max_iterations: usize,
    pub history_limit: usize,
}

impl WorkflowSettings {
    pub fn from_config(config: &VibeConfig) -> Self {
        Self {
            template: config.sandbox.template.clone(),
            sandbox_timeout: config.sandbox.timeout(),
            app_port: config.sandbox.app_port,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            summary_model: config.llm.summary_model.clone(),
            max_iterations: config.agent.max_iterations,
            history_limit: config.history_limit(),
        }
    }
}

/// Everything the workflow talks to.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub db: DbHandle,
    pub sandboxes: Arc<dyn SandboxProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub settings: WorkflowSettings,
}

impl WorkflowDeps {
    /// Production wiring: HTTP sandbox service and OpenAI-compatible LLM.
    pub fn from_config(config: &VibeConfig, db: DbHandle) -> Result<Self> {
        let sandboxes = HttpSandboxProvider::new(config.sandbox.clone())
            .context("Sandbox service unavailable (set VIBE_SANDBOX_API_KEY or E2B_API_KEY)")?;
        let llm = OpenAiClient::new(&config.llm)
            .context("LLM provider unavailable (set VIBE_LLM_API_KEY or OPENAI_API_KEY)")?;
        Ok(Self {
            db,
            sandboxes: Arc::new(sandboxes),
            llm: Arc::new(llm),
            settings: WorkflowSettings::from_config(config),
        })
    }
}

/// Return value plus the assistant message that was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAgentResult {
    pub output: WorkflowOutput,
    pub message: MessageWithFragment,
}

/// Map stored messages, newest first, to chat history, oldest first.
pub fn history_from_messages(messages: &[vibe_common::Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .rev()
        .map(|m| match m.role {
            MessageRole::User => ChatMessage::user(m.content.clone()),
            MessageRole::Assistant => ChatMessage::assistant(m.content.clone()),
        })
        .collect()
}

pub async fn run(
    deps: &WorkflowDeps,
    steps: &StepContext,
    project_id: i64,
    input: &str,
) -> Result<CodeAgentResult> {
    let settings = &deps.settings;
    let sandboxes = deps.sandboxes.as_ref();
    let llm = deps.llm.as_ref();

    let sandbox_id: String = steps
        .run("get-sandbox-id", || async {
            let sandbox = sandboxes.create(&settings.template).await?;
            sandbox.set_timeout(settings.sandbox_timeout).await?;
            Ok(sandbox.id().to_string())
        })
        .await?;
    info!(run_id = steps.run_id(), %sandbox_id, "Sandbox ready");

    let history: Vec<ChatMessage> = steps
        .run("get-previous-messages", || async {
            let limit = settings.history_limit;
            let recent = deps
                .db
                .call(move |db| db.recent_messages(project_id, limit))
                .await?;
            Ok(history_from_messages(&recent))
        })
        .await?;

    let mut state = AgentState::new();
    let agent = code_agent(&settings.model, settings.temperature);
    let network = Network::new(&agent, settings.max_iterations);
    let mut ctx = ToolContext {
        sandbox_id: &sandbox_id,
        provider: sandboxes,
        sandbox_timeout: settings.sandbox_timeout,
        steps,
        state: &mut state,
    };
    network.run(llm, history, input, &mut ctx).await?;

    let title = fragment_title_generator(&settings.summary_model)
        .run_once(llm, steps, &state.summary)
        .await?;
    let response = response_generator(&settings.summary_model)
        .run_once(llm, steps, &state.summary)
        .await?;

    let is_error = state.is_error();
    if is_error {
        warn!(
            run_id = steps.run_id(),
            has_summary = state.is_complete(),
            files = state.files.len(),
            "Run produced no usable result"
        );
    }

    let sandbox_url: String = steps
        .run("get-sandbox-url", || async {
            let sandbox =
                connect_sandbox(sandboxes, &sandbox_id, settings.sandbox_timeout).await?;
            Ok(format!("https://{}", sandbox.host(settings.app_port)))
        })
        .await?;

    let run_id = steps.run_id();
    let message: MessageWithFragment = steps
        .run_atomic("save-result", |step_id| async {
            let (content, message_type, fragment) = if is_error {
                (ERROR_MESSAGE.to_string(), MessageType::Error, None)
            } else {
                let fragment = NewFragment {
                    sandbox_url: sandbox_url.clone(),
                    title: parse_agent_output(&title),
                    files: state.files.clone(),
                };
                (parse_agent_output(&response), MessageType::Result, Some(fragment))
            };
            deps.db
                .call(move |db| {
                    db.create_message_with_step(
                        run_id,
                        &step_id,
                        project_id,
                        &content,
                        message_type,
                        fragment.as_ref(),
                    )
                })
                .await
        })
        .await?;

    let files = if is_error {
        FileMap::new()
    } else {
        state.files
    };
    Ok(CodeAgentResult {
        output: WorkflowOutput {
            url: sandbox_url,
            title: RESULT_TITLE.to_string(),
            files,
            summary: state.summary,
        },
        message,
    })
}
