//! One-shot execution commands: `vibe run` and `vibe replay`.
//!
//! Both run the workflow inline instead of in the background, then print
//! the run's output as JSON on stdout.

use anyhow::{Context, Result, bail};
use tokio::sync::broadcast;
use vibe::config::VibeConfig;
use vibe::db::{DbHandle, VibeDb};
use vibe::web::api::generate_project_name;
use vibe::workflow::{WorkflowDeps, WorkflowRunner, validate_prompt};
use vibe_common::{CodeAgentEvent, MessageRole, MessageType, RunStatus, WorkflowRun};

fn runner_for(config: &VibeConfig) -> Result<(DbHandle, WorkflowRunner)> {
    let db = DbHandle::new(
        VibeDb::open(&config.database.path).context("Failed to initialize database")?,
    );
    let deps = WorkflowDeps::from_config(config, db.clone())?;
    let (ws_tx, _rx) = broadcast::channel(16);
    Ok((db, WorkflowRunner::new(deps, ws_tx, &config.workflow)))
}

pub async fn cmd_run(
    config: &VibeConfig,
    project: Option<i64>,
    name: Option<String>,
    prompt: &str,
) -> Result<()> {
    validate_prompt(prompt)?;
    let (db, runner) = runner_for(config)?;

    let value = prompt.to_string();
    let project = db
        .call(move |db| {
            let project = match project {
                Some(id) => match db.get_project(id)? {
                    Some(project) => project,
                    None => bail!("Project {} not found", id),
                },
                None => {
                    let name = name
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(generate_project_name);
                    db.create_project(&name)?
                }
            };
            db.create_message(project.id, MessageRole::User, &value, MessageType::Result, None)?;
            Ok(project)
        })
        .await?;
    eprintln!("Project {} ({})", project.id, project.name);

    let run = runner
        .record(CodeAgentEvent::new(project.id, prompt))
        .await?;
    eprintln!("Run {} started", run.id);

    let run = runner.execute(run.id).await?;
    print_outcome(&run)
}

pub async fn cmd_replay(config: &VibeConfig, run_id: i64) -> Result<()> {
    let (db, runner) = runner_for(config)?;
    let Some(run) = db.call(move |db| db.get_run(run_id)).await? else {
        bail!("Run {} not found", run_id);
    };
    if run.status.is_terminal() {
        eprintln!(
            "Run {} already {}, re-executing from its journal",
            run.id,
            run.status.as_str()
        );
    }
    let run = runner.execute(run_id).await?;
    print_outcome(&run)
}

fn print_outcome(run: &WorkflowRun) -> Result<()> {
    match (&run.status, &run.output) {
        (RunStatus::Completed, Some(output)) => {
            println!("{}", serde_json::to_string_pretty(output)?);
            Ok(())
        }
        _ => bail!(
            "Run {} failed after {} attempt(s): {}",
            run.id,
            run.attempts,
            run.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
