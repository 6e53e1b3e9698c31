use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use super::{CommandOutput, Sandbox, SandboxConfig, SandboxProvider};
use crate::errors::SandboxError;

const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Deserialize)]
struct SandboxInfo {
    #[serde(rename = "sandboxID")]
    sandbox_id: String,
}

/// Sandbox service client over HTTP.
#[derive(Clone)]
pub struct HttpSandboxProvider {
    client: Client,
    config: Arc<SandboxConfig>,
    api_key: String,
}

impl HttpSandboxProvider {
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        let api_key = config.api_key.clone().ok_or(SandboxError::NoApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
            api_key,
        })
    }

    fn sandbox(&self, id: String) -> Box<dyn Sandbox> {
        Box::new(HttpSandbox {
            id,
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            api_key: self.api_key.clone(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create(&self, template: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
        let resp = self
            .client
            .post(self.api("/sandboxes"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&serde_json::json!({
                "templateID": template,
                "timeout": self.config.timeout_secs,
            }))
            .send()
            .await?;
        let info: SandboxInfo = check(resp).await?.json().await?;
        info!(sandbox_id = %info.sandbox_id, template, "Sandbox created");
        Ok(self.sandbox(info.sandbox_id))
    }

    async fn connect(&self, id: &str) -> Result<Box<dyn Sandbox>, SandboxError> {
        let resp = self
            .client
            .get(self.api(&format!("/sandboxes/{}", id)))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound { id: id.to_string() });
        }
        let info: SandboxInfo = check(resp).await?.json().await?;
        debug!(sandbox_id = %info.sandbox_id, "Sandbox connected");
        Ok(self.sandbox(info.sandbox_id))
    }
}

struct HttpSandbox {
    id: String,
    client: Client,
    config: Arc<SandboxConfig>,
    api_key: String,
}

impl HttpSandbox {
    fn envd(&self, path: &str) -> String {
        format!("{}{}", self.config.envd_base(&self.id), path)
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn host(&self, port: u16) -> String {
        self.config.host(&self.id, port)
    }

    async fn set_timeout(&self, timeout: Duration) -> Result<(), SandboxError> {
        let url = format!(
            "{}/sandboxes/{}/timeout",
            self.config.api_url.trim_end_matches('/'),
            self.id
        );
        let resp = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&serde_json::json!({ "timeout": timeout.as_secs() }))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SandboxError::NotFound {
                id: self.id.clone(),
            });
        }
        check(resp).await?;
        Ok(())
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        debug!(sandbox_id = %self.id, command, "Running command");
        let resp = self
            .client
            .post(self.envd("/commands"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&serde_json::json!({
                "cmd": command,
                "cwd": self.config.workdir,
            }))
            .send()
            .await?;
        let output: CommandOutput = check(resp).await?.json().await?;
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
        let resp = self
            .client
            .post(self.envd("/files"))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("path", path)])
            .body(content.to_string())
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let resp = self
            .client
            .get(self.envd("/files"))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("path", path)])
            .send()
            .await?;
        Ok(check(resp).await?.text().await?)
    }
}

/// Turn a non-2xx response into [`SandboxError::Api`].
async fn check(resp: Response) -> Result<Response, SandboxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SandboxError::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> SandboxConfig {
        SandboxConfig {
            api_url: server.uri(),
            api_key: Some("sk-test".to_string()),
            envd_url: format!("{}/envd/{{id}}", server.uri()),
            domain: "sandbox.test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = HttpSandboxProvider::new(SandboxConfig::default());
        assert!(matches!(result, Err(SandboxError::NoApiKey)));
    }

    #[tokio::test]
    async fn test_create_posts_template_and_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sandboxes"))
            .and(header("X-API-Key", "sk-test"))
            .and(body_json(serde_json::json!({"templateID": "vibe-nextjs", "timeout": 1800})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"sandboxID": "sbx-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpSandboxProvider::new(test_config(&server)).unwrap();
        let sandbox = provider.create("vibe-nextjs").await.unwrap();
        assert_eq!(sandbox.id(), "sbx-1");
        assert_eq!(sandbox.host(3000), "3000-sbx-1.sandbox.test");
    }

    #[tokio::test]
    async fn test_connect_missing_sandbox_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sandboxes/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = HttpSandboxProvider::new(test_config(&server)).unwrap();
        let err = provider.connect("gone").await.err().unwrap();
        assert!(matches!(err, SandboxError::NotFound { ref id } if id == "gone"));
    }

    #[tokio::test]
    async fn test_set_timeout_posts_seconds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sandboxes/sbx-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"sandboxID": "sbx-1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sandboxes/sbx-1/timeout"))
            .and(body_json(serde_json::json!({"timeout": 60})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = HttpSandboxProvider::new(test_config(&server)).unwrap();
        let sandbox = provider.connect("sbx-1").await.unwrap();
        sandbox.set_timeout(Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_command_returns_stdout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/envd/sbx-1/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"stdout": "added 1 package\n", "stderr": "", "exit_code": 0}),
            ))
            .mount(&server)
            .await;

        let provider = HttpSandboxProvider::new(test_config(&server)).unwrap();
        let sandbox = provider.sandbox("sbx-1".to_string());
        let out = sandbox.run_command("npm install left-pad --yes").await.unwrap();
        assert_eq!(out.stdout, "added 1 package\n");
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/envd/sbx-1/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"stdout": "", "stderr": "boom", "exit_code": 2}),
            ))
            .mount(&server)
            .await;

        let provider = HttpSandboxProvider::new(test_config(&server)).unwrap();
        let sandbox = provider.sandbox("sbx-1".to_string());
        let err = sandbox.run_command("false").await.err().unwrap();
        match err {
            SandboxError::CommandExit {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "boom");
            }
            other => panic!("Expected CommandExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_and_read_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/envd/sbx-1/files"))
            .and(query_param("path", "app/page.tsx"))
            .and(body_string("export default function Page() {}"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/envd/sbx-1/files"))
            .and(query_param("path", "app/page.tsx"))
            .respond_with(ResponseTemplate::new(200).set_body_string("export default 1"))
            .mount(&server)
            .await;

        let provider = HttpSandboxProvider::new(test_config(&server)).unwrap();
        let sandbox = provider.sandbox("sbx-1".to_string());
        sandbox
            .write_file("app/page.tsx", "export default function Page() {}")
            .await
            .unwrap();
        let content = sandbox.read_file("app/page.tsx").await.unwrap();
        assert_eq!(content, "export default 1");
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sandboxes"))
            .respond_with(ResponseTemplate::new(500).set_body_string("template missing"))
            .mount(&server)
            .await;

        let provider = HttpSandboxProvider::new(test_config(&server)).unwrap();
        let err = provider.create("nope").await.err().unwrap();
        match err {
            SandboxError::Api { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "template missing");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }
}
