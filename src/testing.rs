//! In-memory doubles for the sandbox service and the LLM provider.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{LlmError, SandboxError};
use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient, Role, ToolCall};
use crate::sandbox::{CommandOutput, Sandbox, SandboxProvider};

#[derive(Default)]
struct FakeSandboxes {
    created: usize,
    files: HashMap<String, HashMap<String, String>>,
    commands: HashMap<String, CommandOutput>,
    timeouts: Vec<(String, Duration)>,
}

/// Sandbox provider that keeps every sandbox's files in memory.
#[derive(Clone, Default)]
pub struct FakeSandboxProvider {
    inner: Arc<Mutex<FakeSandboxes>>,
}

impl FakeSandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.inner.lock().unwrap().created
    }

    pub fn timeouts(&self) -> Vec<(String, Duration)> {
        self.inner.lock().unwrap().timeouts.clone()
    }

    pub fn set_command_output(&self, command: &str, stdout: &str, stderr: &str, exit_code: i32) {
        self.inner.lock().unwrap().commands.insert(
            command.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        );
    }

    pub fn put_file(&self, sandbox_id: &str, path: &str, content: &str) {
        self.inner
            .lock()
            .unwrap()
            .files
            .entry(sandbox_id.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
    }

    pub fn file(&self, sandbox_id: &str, path: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(sandbox_id)
            .and_then(|files| files.get(path).cloned())
    }

    fn handle(&self, id: String) -> Box<dyn Sandbox> {
        Box::new(FakeSandbox {
            id,
            inner: Arc::clone(&self.inner),
        })
    }
}

#[async_trait]
impl SandboxProvider for FakeSandboxProvider {
    async fn create(&self, _template: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            inner.created += 1;
            let id = format!("sbx-{}", inner.created);
            inner.files.insert(id.clone(), HashMap::new());
            id
        };
        Ok(self.handle(id))
    }

    async fn connect(&self, id: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
        if !self.inner.lock().unwrap().files.contains_key(id) {
            return Err(SandboxError::NotFound { id: id.to_string() });
        }
        Ok(self.handle(id.to_string()))
    }
}

struct FakeSandbox {
    id: String,
    inner: Arc<Mutex<FakeSandboxes>>,
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn host(&self, port: u16) -> String {
        format!("{}-{}.sandbox.test", port, self.id)
    }

    async fn set_timeout(&self, timeout: Duration) -> Result<(), SandboxError> {
        self.inner
            .lock()
            .unwrap()
            .timeouts
            .push((self.id.clone(), timeout));
        Ok(())
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        let output = self
            .inner
            .lock()
            .unwrap()
            .commands
            .get(command)
            .cloned()
            .unwrap_or_default();
        if output.exit_code != 0 {
            return Err(SandboxError::CommandExit {
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        self.inner
            .lock()
            .unwrap()
            .files
            .entry(self.id.clone())
            .or_default()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.inner
            .lock()
            .unwrap()
            .files
            .get(&self.id)
            .and_then(|files| files.get(path).cloned())
            .ok_or_else(|| SandboxError::Api {
                status: 404,
                body: format!("file not found: {}", path),
            })
    }
}

/// LLM client that answers from a script and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Completion>>,
    fallback: Option<Completion>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    /// Answers every request with `completion`.
    pub fn repeating(completion: Completion) -> Self {
        Self {
            fallback: Some(completion),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn text(text: &str) -> Completion {
        Completion {
            message: ChatMessage::assistant(text),
            usage: None,
        }
    }

    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Completion {
        Completion {
            message: ChatMessage {
                role: Role::Assistant,
                content: None,
                tool_calls: vec![ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                }],
                tool_call_id: None,
            },
            usage: None,
        }
    }

    pub fn tool_call_with_text(
        text: &str,
        id: &str,
        name: &str,
        arguments: serde_json::Value,
    ) -> Completion {
        let mut completion = Self::tool_call(id, name, arguments);
        completion.message.content = Some(text.to_string());
        completion
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.or_else(|| self.fallback.clone())
            .ok_or(LlmError::EmptyResponse)
    }
}
