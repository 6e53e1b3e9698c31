use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, broadcast};
use tracing::{Instrument, error, info, info_span, warn};
use vibe_common::{CODE_AGENT_RUN, CodeAgentEvent, WorkflowRun};

use super::code_agent::{self, WorkflowDeps};
use super::steps::StepContext;
use crate::config::WorkflowSection;
use crate::errors::WorkflowError;
use crate::web::ws::{WsMessage, broadcast_message};

/// Longest prompt accepted.
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Reject empty or oversized prompts.
pub fn validate_prompt(value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() {
        return Err(WorkflowError::InvalidPrompt("Message is required".to_string()));
    }
    if value.chars().count() > MAX_PROMPT_CHARS {
        return Err(WorkflowError::InvalidPrompt(format!(
            "Message is too long (max {} characters)",
            MAX_PROMPT_CHARS
        )));
    }
    Ok(())
}

/// Receives events, records runs and executes them in the background.
#[derive(Clone)]
pub struct WorkflowRunner {
    deps: Arc<WorkflowDeps>,
    ws_tx: broadcast::Sender<String>,
    max_attempts: u32,
    retry_delay: Duration,
    /// Run ids currently executing.
    active: Arc<Mutex<HashSet<i64>>>,
}

impl WorkflowRunner {
    pub fn new(
        deps: WorkflowDeps,
        ws_tx: broadcast::Sender<String>,
        workflow: &WorkflowSection,
    ) -> Self {
        Self {
            deps: Arc::new(deps),
            ws_tx,
            max_attempts: workflow.max_attempts.max(1),
            retry_delay: Duration::from_millis(workflow.retry_delay_ms),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Dispatch a named event with its JSON payload.
    pub async fn send(
        &self,
        name: &str,
        data: serde_json::Value,
    ) -> Result<WorkflowRun, WorkflowError> {
        if name != CODE_AGENT_RUN {
            return Err(WorkflowError::UnknownEvent {
                name: name.to_string(),
            });
        }
        let event: CodeAgentEvent = serde_json::from_value(data)
            .map_err(|e| WorkflowError::InvalidPrompt(format!("Invalid event payload: {}", e)))?;
        self.trigger(event).await
    }

    /// Record a run for `event` and start it in the background.
    ///
    /// An event id that was already seen returns the existing run without
    /// starting it again.
    pub async fn trigger(&self, event: CodeAgentEvent) -> Result<WorkflowRun, WorkflowError> {
        let run = self.record(event).await?;
        if run.attempts == 0 {
            self.spawn(run.id).await;
        }
        Ok(run)
    }

    /// Record a run row for `event` without executing it.
    pub async fn record(&self, event: CodeAgentEvent) -> Result<WorkflowRun, WorkflowError> {
        validate_prompt(&event.value)?;
        let event_id = event.id.to_string();
        let project_id = event.project_id;
        let input = event.value;
        let (project, run) = self
            .deps
            .db
            .call(move |db| {
                let project = db.get_project(project_id)?;
                if project.is_none() {
                    return Ok((None, None));
                }
                let run = match db.get_run_by_event_id(&event_id)? {
                    Some(existing) => existing,
                    None => db.create_run(&event_id, project_id, &input)?,
                };
                Ok((project, Some(run)))
            })
            .await?;
        match (project, run) {
            (Some(_), Some(run)) => Ok(run),
            _ => Err(WorkflowError::ProjectNotFound { id: project_id }),
        }
    }

    /// Execute an existing run again in the background, replaying its
    /// completed steps from the journal.
    pub async fn replay(&self, run_id: i64) -> Result<WorkflowRun, WorkflowError> {
        let run = self
            .deps
            .db
            .call(move |db| db.get_run(run_id))
            .await?
            .ok_or(WorkflowError::RunNotFound { id: run_id })?;
        if !self.spawn(run_id).await {
            return Err(WorkflowError::AlreadyRunning { id: run_id });
        }
        Ok(run)
    }

    /// Start every run a previous process left `queued` or `running`.
    /// Returns the ids that were started.
    pub async fn resume_unfinished(&self) -> Result<Vec<i64>> {
        let runs = self
            .deps
            .db
            .call(|db| db.list_unfinished_runs())
            .await
            .context("Failed to list unfinished workflow runs")?;
        let mut resumed = Vec::new();
        for run in runs {
            if self.spawn(run.id).await {
                info!(
                    run_id = run.id,
                    attempts = run.attempts,
                    status = run.status.as_str(),
                    "Resuming workflow run"
                );
                resumed.push(run.id);
            }
        }
        Ok(resumed)
    }

    /// Start `run_id` in the background unless it is already executing.
    async fn spawn(&self, run_id: i64) -> bool {
        if !self.active.lock().await.insert(run_id) {
            return false;
        }
        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.execute(run_id).await {
                error!(run_id, error = %format!("{:#}", e), "Workflow run could not be recorded");
            }
            runner.active.lock().await.remove(&run_id);
        });
        true
    }

    /// Execute a run to its final status, retrying failed attempts.
    ///
    /// Errors only when the run's own bookkeeping fails; a workflow failure
    /// is recorded on the run and the failed run is returned.
    pub async fn execute(&self, run_id: i64) -> Result<WorkflowRun> {
        let db = &self.deps.db;
        let span = info_span!("run", run_id);
        async {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let run = db.call(move |db| db.start_run_attempt(run_id)).await?;
                broadcast_message(&self.ws_tx, &WsMessage::RunStarted { run: run.clone() });
                info!(project_id = run.project_id, attempt, "Workflow run started");

                let steps = StepContext::new(run_id, db.clone());
                let result = code_agent::run(&self.deps, &steps, run.project_id, &run.input).await;

                match result {
                    Ok(result) => {
                        let output = result.output;
                        let run = db
                            .call(move |db| db.complete_run(run_id, &output))
                            .await?;
                        broadcast_message(
                            &self.ws_tx,
                            &WsMessage::MessageCreated {
                                message: result.message,
                            },
                        );
                        broadcast_message(&self.ws_tx, &WsMessage::RunCompleted { run: run.clone() });
                        info!(attempts = run.attempts, "Workflow run completed");
                        return Ok(run);
                    }
                    Err(e) => {
                        let message = format!("{:#}", e);
                        if attempt < self.max_attempts {
                            warn!(attempt, error = %message, "Workflow attempt failed, retrying");
                            let recorded = message.clone();
                            db.call(move |db| db.record_run_error(run_id, &recorded))
                                .await?;
                            broadcast_message(
                                &self.ws_tx,
                                &WsMessage::RunRetrying {
                                    run_id,
                                    attempt: run.attempts,
                                    error: message,
                                },
                            );
                            tokio::time::sleep(self.retry_delay).await;
                            continue;
                        }
                        error!(attempt, error = %message, "Workflow run failed");
                        let run = db
                            .call(move |db| db.fail_run(run_id, &message))
                            .await
                            .context("Failed to record workflow failure")?;
                        broadcast_message(&self.ws_tx, &WsMessage::RunFailed { run: run.clone() });
                        return Ok(run);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
