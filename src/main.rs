use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vibe::config::{LogFormat, VibeConfig};

mod cmd;

#[derive(Parser)]
#[command(name = "vibe")]
#[command(version, about = "AI coding-agent backend: prompt in, sandboxed app out")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to vibe.toml
    #[arg(long, global = true, env = "VIBE_CONFIG", default_value = "vibe.toml")]
    pub config: PathBuf,

    /// Console log format: pretty or json
    #[arg(long, global = true, env = "VIBE_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default vibe.toml and create the database
    Init {
        /// Overwrite an existing vibe.toml
        #[arg(long)]
        force: bool,
    },
    /// Serve the HTTP API and WebSocket feed
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (CORS permissive for a local frontend)
        #[arg(long)]
        dev: bool,
    },
    /// Run the code agent once for a prompt and print the result
    Run {
        /// Existing project to add the prompt to
        #[arg(long, conflicts_with = "name")]
        project: Option<i64>,

        /// Name for a new project (generated when omitted)
        #[arg(long)]
        name: Option<String>,

        /// What to build
        prompt: String,
    },
    /// Execute a recorded run again, reusing its completed steps
    Replay { run_id: i64 },
    /// List projects and their conversations
    Projects {
        /// Show one project's messages
        #[arg(long)]
        id: Option<i64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show,
    /// Validate the configuration and report warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = VibeConfig::load_or_default(&cli.config)?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    let _guard = vibe::telemetry::init_tracing(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Init { force } => cmd::cmd_init(&cli.config, force),
        Commands::Serve { port, host, dev } => cmd::cmd_serve(config, port, host, dev).await,
        Commands::Run {
            project,
            name,
            prompt,
        } => cmd::cmd_run(&config, project, name, &prompt).await,
        Commands::Replay { run_id } => cmd::cmd_replay(&config, run_id).await,
        Commands::Projects { id } => cmd::cmd_projects(&config, id).await,
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command),
    }
}
