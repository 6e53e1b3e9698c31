use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Marker the coding agent emits once the task is finished.
pub const TASK_SUMMARY_TAG: &str = "<task_summary>";

/// Path → file content, ordered by path.
pub type FileMap = BTreeMap<String, String>;

/// Mutable state shared by the agent network for the duration of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Empty until the agent signals completion.
    #[serde(default)]
    pub summary: String,
    /// Every file written through the sandbox tools, cumulative.
    #[serde(default)]
    pub files: FileMap,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        !self.summary.is_empty()
    }

    /// A run failed when it never produced a summary or never wrote a file.
    pub fn is_error(&self) -> bool {
        self.summary.is_empty() || self.files.is_empty()
    }

    /// Store `text` as the summary if it carries the completion marker.
    /// Returns whether the summary was set.
    pub fn record_response(&mut self, text: &str) -> bool {
        if text.contains(TASK_SUMMARY_TAG) {
            self.summary = text.to_string();
            true
        } else {
            false
        }
    }

    pub fn merge_files(&mut self, files: FileMap) {
        self.files.extend(files);
    }
}
