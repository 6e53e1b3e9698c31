use anyhow::Result;
use tracing::{Instrument, debug, info, info_span};

use super::Agent;
use super::tools::ToolContext;
use crate::llm::{ChatMessage, LlmClient};
use vibe_common::AgentState;

/// Iteration cap when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// How a network run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOutcome {
    /// The agent set a summary.
    Completed,
    /// The iteration cap was reached first.
    Capped,
}

#[derive(Debug)]
pub struct NetworkRun {
    pub outcome: NetworkOutcome,
    pub iterations: usize,
    pub history: Vec<ChatMessage>,
}

/// Router loop around a single agent.
pub struct Network<'a> {
    agent: &'a Agent,
    max_iterations: usize,
}

impl<'a> Network<'a> {
    pub fn new(agent: &'a Agent, max_iterations: usize) -> Self {
        Self {
            agent,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Next agent to run, or `None` once the state carries a summary.
    pub fn route(&self, state: &AgentState) -> Option<&'a Agent> {
        if state.is_complete() {
            None
        } else {
            Some(self.agent)
        }
    }

    /// Drive the agent until it completes or the cap is hit.
    ///
    /// `history` holds the prior conversation; `input` is appended as a
    /// user message unless the last prior message already is that prompt.
    pub async fn run(
        &self,
        llm: &dyn LlmClient,
        mut history: Vec<ChatMessage>,
        input: &str,
        ctx: &mut ToolContext<'_>,
    ) -> Result<NetworkRun> {
        let duplicate = history
            .last()
            .is_some_and(|m| m.role == crate::llm::Role::User && m.text() == Some(input));
        if !duplicate {
            history.push(ChatMessage::user(input));
        }

        let mut iterations = 0;
        while iterations < self.max_iterations {
            let Some(agent) = self.route(ctx.state) else {
                break;
            };
            iterations += 1;
            let span = info_span!("turn", agent = %agent.name, iteration = iterations);
            let turn = agent.run_turn(llm, &mut history, ctx).instrument(span).await?;
            debug!(
                iteration = iterations,
                tool_calls = turn.tool_calls,
                files = ctx.state.files.len(),
                "Agent turn finished"
            );
        }

        let outcome = if ctx.state.is_complete() {
            NetworkOutcome::Completed
        } else {
            NetworkOutcome::Capped
        };
        info!(?outcome, iterations, "Network finished");
        Ok(NetworkRun {
            outcome,
            iterations,
            history,
        })
    }
}
