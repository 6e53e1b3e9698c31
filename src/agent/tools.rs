//! Sandbox tools the coding agent can call.
//!
//! Each tool deserializes its arguments, performs its sandbox work inside a
//! journaled step, and returns a string for the model. Sandbox failures are
//! reported in that string; only journal errors propagate.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use vibe_common::{AgentState, FileMap};

use crate::errors::SandboxError;
use crate::llm::ToolSpec;
use crate::sandbox::{SandboxProvider, connect_sandbox};
use crate::workflow::steps::StepContext;

/// Everything a tool may touch while handling one call.
pub struct ToolContext<'a> {
    pub sandbox_id: &'a str,
    pub provider: &'a dyn SandboxProvider,
    pub sandbox_timeout: Duration,
    pub steps: &'a StepContext,
    pub state: &'a mut AgentState,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// The tool set of the coding agent.
pub fn default_tools() -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(TerminalTool),
        Box::new(CreateOrUpdateFilesTool),
        Box::new(ReadFilesTool),
    ]
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args)
        .map_err(|e| format!("Error: invalid arguments for {}: {}", tool, e))
}

// ── terminal ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TerminalArgs {
    command: String,
}

pub struct TerminalTool;

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn description(&self) -> &'static str {
        "Use the terminal to run commands"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"}
            },
            "required": ["command"]
        })
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let args: TerminalArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(msg) => return Ok(msg),
        };
        let provider = ctx.provider;
        let sandbox_id = ctx.sandbox_id;
        let timeout = ctx.sandbox_timeout;
        ctx.steps
            .run(self.name(), || async move {
                let result = async {
                    let sandbox = connect_sandbox(provider, sandbox_id, timeout).await?;
                    sandbox.run_command(&args.command).await
                }
                .await;
                Ok(match result {
                    Ok(output) => output.stdout,
                    Err(e) => {
                        warn!(sandbox_id, command = %args.command, error = %e, "Command failed");
                        command_failure(&e)
                    }
                })
            })
            .await
    }
}

fn command_failure(err: &SandboxError) -> String {
    let (stdout, stderr) = match err {
        SandboxError::CommandExit { stdout, stderr, .. } => (stdout.as_str(), stderr.as_str()),
        _ => ("", ""),
    };
    format!("Command failed: {} \nstdout: {}\nstderr: {}", err, stdout, stderr)
}

// ── createOrUpdateFiles ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WriteFilesArgs {
    files: Vec<FileEntry>,
}

pub struct CreateOrUpdateFilesTool;

#[async_trait]
impl Tool for CreateOrUpdateFilesTool {
    fn name(&self) -> &'static str {
        "createOrUpdateFiles"
    }

    fn description(&self) -> &'static str {
        "Create or update files in the sandbox"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "files": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": {"type": "string"},
                            "content": {"type": "string"}
                        },
                        "required": ["path", "content"]
                    }
                }
            },
            "required": ["files"]
        })
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let args: WriteFilesArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(msg) => return Ok(msg),
        };
        let provider = ctx.provider;
        let sandbox_id = ctx.sandbox_id;
        let timeout = ctx.sandbox_timeout;
        // The step records the written pairs so a replay rebuilds the state.
        let written: Result<FileMap, String> = ctx
            .steps
            .run(self.name(), || async move {
                let result: Result<FileMap, SandboxError> = async {
                    let sandbox = connect_sandbox(provider, sandbox_id, timeout).await?;
                    let mut written = FileMap::new();
                    for file in args.files {
                        sandbox.write_file(&file.path, &file.content).await?;
                        written.insert(file.path, file.content);
                    }
                    Ok(written)
                }
                .await;
                Ok(result.map_err(|e| format!("Error: {}", e)))
            })
            .await?;

        match written {
            Ok(files) => {
                let paths: Vec<&str> = files.keys().map(String::as_str).collect();
                let reply = format!("Updated files: {}", paths.join(", "));
                debug!(sandbox_id, count = files.len(), "Files written");
                ctx.state.merge_files(files);
                Ok(reply)
            }
            Err(msg) => {
                warn!(sandbox_id, error = %msg, "Writing files failed");
                Ok(msg)
            }
        }
    }
}

// ── readFiles ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ReadFilesArgs {
    files: Vec<String>,
}

pub struct ReadFilesTool;

#[async_trait]
impl Tool for ReadFilesTool {
    fn name(&self) -> &'static str {
        "readFiles"
    }

    fn description(&self) -> &'static str {
        "Read files from the sandbox"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "files": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["files"]
        })
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<String> {
        let args: ReadFilesArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(msg) => return Ok(msg),
        };
        let provider = ctx.provider;
        let sandbox_id = ctx.sandbox_id;
        let timeout = ctx.sandbox_timeout;
        ctx.steps
            .run(self.name(), || async move {
                let result: Result<Vec<FileEntry>, SandboxError> = async {
                    let sandbox = connect_sandbox(provider, sandbox_id, timeout).await?;
                    let mut contents = Vec::with_capacity(args.files.len());
                    for path in args.files {
                        let content = sandbox.read_file(&path).await?;
                        contents.push(FileEntry { path, content });
                    }
                    Ok(contents)
                }
                .await;
                Ok(match result {
                    Ok(contents) => serde_json::to_string(&contents)?,
                    Err(e) => format!("Error: {}", e),
                })
            })
            .await
    }
}
