use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the hosted sandbox service (`[sandbox]` in `vibe.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Control-plane base URL.
    pub api_url: String,
    pub api_key: Option<String>,
    /// Template every new sandbox is created from.
    pub template: String,
    /// Idle timeout applied on create and on every reconnect.
    pub timeout_secs: u64,
    /// Domain public sandbox hosts live under.
    pub domain: String,
    /// Port of the in-sandbox agent that serves files and commands.
    pub envd_port: u16,
    /// URL template for the in-sandbox agent. Placeholders: `{port}`, `{id}`,
    /// `{domain}`.
    pub envd_url: String,
    /// Port the generated app listens on.
    pub app_port: u16,
    /// Working directory for commands.
    pub workdir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.e2b.dev".to_string(),
            api_key: None,
            template: "vibe-nextjs".to_string(),
            timeout_secs: 1800,
            domain: "e2b.app".to_string(),
            envd_port: 49983,
            envd_url: "https://{port}-{id}.{domain}".to_string(),
            app_port: 3000,
            workdir: "/home/user".to_string(),
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL of the in-sandbox agent for sandbox `id`.
    pub fn envd_base(&self, id: &str) -> String {
        self.envd_url
            .replace("{port}", &self.envd_port.to_string())
            .replace("{id}", id)
            .replace("{domain}", &self.domain)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn host(&self, id: &str, port: u16) -> String {
        format!("{}-{}.{}", port, id, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_defaults() {
        let config = SandboxConfig::default();
        assert!(config.api_key.is_none());
        assert_eq!(config.timeout_secs, 1800);
        assert_eq!(config.timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.app_port, 3000);
    }

    #[test]
    fn test_envd_base_fills_placeholders() {
        let config = SandboxConfig::default();
        assert_eq!(config.envd_base("abc123"), "https://49983-abc123.e2b.app");
    }

    #[test]
    fn test_envd_base_custom_template() {
        let config = SandboxConfig {
            envd_url: "http://127.0.0.1:9000/envd/{id}/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.envd_base("sbx"), "http://127.0.0.1:9000/envd/sbx");
    }

    #[test]
    fn test_host_uses_port_and_domain() {
        let config = SandboxConfig {
            domain: "sandbox.test".to_string(),
            ..Default::default()
        };
        assert_eq!(config.host("sbx", 3000), "3000-sbx.sandbox.test");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SandboxConfig = toml::from_str(
            r#"
template = "nextjs-15"
timeout_secs = 600
"#,
        )
        .unwrap();
        assert_eq!(config.template, "nextjs-15");
        assert_eq!(config.timeout_secs, 600);
        assert_eq!(config.domain, "e2b.app"); // default
        assert_eq!(config.envd_port, 49983); // default
    }
}
