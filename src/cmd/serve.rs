//! HTTP server command: `vibe serve`.

use anyhow::Result;
use vibe::config::VibeConfig;

pub async fn cmd_serve(
    mut config: VibeConfig,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    config.server.dev_mode |= dev;

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    vibe::web::start_server(&config).await
}
