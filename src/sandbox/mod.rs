//! Hosted code-execution sandboxes.
//!
//! A [`SandboxProvider`] creates sandboxes from a template and reconnects to
//! them by id; a [`Sandbox`] runs commands and reads/writes files inside one
//! instance. The production implementation talks to the sandbox service over
//! HTTP ([`HttpSandboxProvider`]); tests use an in-memory double.

mod config;
mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SandboxError;

pub use config::SandboxConfig;
pub use http::HttpSandboxProvider;

/// Result of a shell command run inside a sandbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// One live sandbox instance.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    /// Public host name serving `port` inside the sandbox.
    fn host(&self, port: u16) -> String;

    async fn set_timeout(&self, timeout: Duration) -> Result<(), SandboxError>;

    /// Run a shell command. A non-zero exit is reported as
    /// [`SandboxError::CommandExit`] carrying both output streams.
    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;
}

/// Creates sandboxes and reconnects to existing ones.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, template: &str) -> Result<Box<dyn Sandbox>, SandboxError>;

    async fn connect(&self, id: &str) -> Result<Box<dyn Sandbox>, SandboxError>;
}

/// Reconnect to a sandbox and push its idle timeout forward.
pub async fn connect_sandbox(
    provider: &dyn SandboxProvider,
    id: &str,
    timeout: Duration,
) -> Result<Box<dyn Sandbox>, SandboxError> {
    let sandbox = provider.connect(id).await?;
    sandbox.set_timeout(timeout).await?;
    Ok(sandbox)
}
