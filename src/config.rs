//! Configuration for the vibe backend, read from `vibe.toml`.
//!
//! Layering: file → environment → CLI flags. A missing file means defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 3142
//! host = "127.0.0.1"
//! dev_mode = false
//!
//! [database]
//! path = ".vibe/vibe.db"
//!
//! [sandbox]
//! template = "vibe-nextjs"
//! timeout_secs = 1800
//!
//! [llm]
//! model = "gpt-4.1"
//! temperature = 0.1
//! summary_model = "gpt-4o"
//!
//! [agent]
//! max_iterations = 15
//! history_limit = 5
//!
//! [workflow]
//! max_attempts = 3
//! retry_delay_ms = 2000
//!
//! [logging]
//! format = "pretty"
//! directory = ".vibe/logs"
//! ```
//!
//! Secrets belong in the environment (or `.env`): `VIBE_SANDBOX_API_KEY` or
//! `E2B_API_KEY`, and `VIBE_LLM_API_KEY` or `OPENAI_API_KEY`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::network::DEFAULT_MAX_ITERATIONS;
use crate::llm::LlmConfig;
use crate::sandbox::SandboxConfig;

/// Upper bound on prior messages loaded as agent context.
pub const MAX_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub host: String,
    /// Enables permissive CORS for a separately served frontend.
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 3142,
            host: "127.0.0.1".to_string(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".vibe/vibe.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Router iteration cap
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Prior messages loaded as context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_history_limit() -> usize {
    5
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSection {
    /// Executions of a run before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    pub format: LogFormat,
    /// Also write daily-rotated log files here
    pub directory: Option<PathBuf>,
}

/// Root of `vibe.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VibeConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl VibeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse vibe.toml")
    }

    /// Load `path` if it exists, defaults otherwise, then apply the
    /// environment.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize vibe.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Overlay values from environment variables. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .find(|v| !v.trim().is_empty())
        };

        if let Some(key) = get(&["VIBE_SANDBOX_API_KEY", "E2B_API_KEY"]) {
            self.sandbox.api_key = Some(key);
        }
        if let Some(key) = get(&["VIBE_LLM_API_KEY", "OPENAI_API_KEY"]) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get(&["VIBE_LLM_BASE_URL"]) {
            self.llm.base_url = url;
        }
        if let Some(path) = get(&["VIBE_DB_PATH"]) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(port) = get(&["VIBE_PORT"]).and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    /// History limit clamped to [`MAX_HISTORY_LIMIT`].
    pub fn history_limit(&self) -> usize {
        self.agent.history_limit.min(MAX_HISTORY_LIMIT)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.sandbox.api_key.is_none() {
            warnings.push(
                "No sandbox API key: set VIBE_SANDBOX_API_KEY or E2B_API_KEY".to_string(),
            );
        }
        if self.llm.api_key.is_none() {
            warnings.push("No LLM API key: set VIBE_LLM_API_KEY or OPENAI_API_KEY".to_string());
        }
        if self.agent.max_iterations == 0 {
            warnings.push("agent.max_iterations is 0; one iteration will run".to_string());
        }
        if self.agent.history_limit > MAX_HISTORY_LIMIT {
            warnings.push(format!(
                "agent.history_limit {} exceeds {}; it will be clamped",
                self.agent.history_limit, MAX_HISTORY_LIMIT
            ));
        }
        if self.workflow.max_attempts == 0 {
            warnings.push("workflow.max_attempts is 0; runs will execute once".to_string());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            warnings.push(format!(
                "llm.temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            ));
        }
        if !self.sandbox.envd_url.contains("{id}") {
            warnings.push(format!(
                "sandbox.envd_url '{}' has no {{id}} placeholder",
                self.sandbox.envd_url
            ));
        }

        warnings
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.sandbox.api_key.is_some() {
            config.sandbox.api_key = Some("***".to_string());
        }
        if config.llm.api_key.is_some() {
            config.llm.api_key = Some("***".to_string());
        }
        config
    }
}
