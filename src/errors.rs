//! Typed error hierarchy for the vibe backend.
//!
//! - `SandboxError`: hosted sandbox service failures
//! - `LlmError`: chat-completion provider failures
//! - `WorkflowError`: run lookup and event validation failures
//!
//! Tool failures never surface here: the agent tools turn them into text the
//! model can read. Everything else propagates with `anyhow` context up to the
//! workflow runner, which retries and finally records it on the run.

use thiserror::Error;

/// Errors from the hosted sandbox service.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("No sandbox API key configured")]
    NoApiKey,

    #[error("Sandbox {id} not found")]
    NotFound { id: String },

    #[error("Sandbox service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Command exited with code {exit_code}")]
    CommandExit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Sandbox request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Errors from the LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No LLM API key configured")]
    NoApiKey,

    #[error("LLM provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM response contained no choices")]
    EmptyResponse,

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Errors from triggering or looking up workflow runs.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Workflow run {id} not found")]
    RunNotFound { id: i64 },

    #[error("Unknown event '{name}'")]
    UnknownEvent { name: String },

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("Workflow run {id} is already running")]
    AlreadyRunning { id: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
