use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::FileMap;

/// Event name that triggers the code-agent workflow.
pub const CODE_AGENT_RUN: &str = "code-agent/run";

/// Payload of a `code-agent/run` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CodeAgentEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub project_id: i64,
    /// The user's prompt.
    pub value: String,
}

impl CodeAgentEvent {
    pub fn new(project_id: i64, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            value: value.into(),
        }
    }
}

/// What the workflow hands back to its caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowOutput {
    pub url: String,
    pub title: String,
    pub files: FileMap,
    pub summary: String,
}
