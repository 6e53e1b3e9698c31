//! Agent output envelopes and the text extraction shared by every caller
//! that turns an agent result into something a person reads.

use serde::{Deserialize, Serialize};

/// Returned when an output carries no text at all.
pub const FALLBACK_TEXT: &str = "Fragment";

/// Text content is either a single string or a list of chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextContent {
    Plain(String),
    Parts(Vec<String>),
}

impl TextContent {
    pub fn text(&self) -> String {
        match self {
            Self::Plain(s) => s.clone(),
            Self::Parts(parts) => parts.concat(),
        }
    }
}

impl From<&str> for TextContent {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

/// One tagged message an agent emitted during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputMessage {
    Text {
        content: TextContent,
    },
    ToolCall {
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
}

impl OutputMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: TextContent::Plain(content.into()),
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text { content } => Some(content.text()),
            Self::ToolCall { .. } => None,
        }
    }
}

/// What an agent run produced: either already-plain text or the tagged
/// message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentOutput {
    Plain(String),
    Messages(Vec<OutputMessage>),
}

impl From<String> for AgentOutput {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

impl From<Vec<OutputMessage>> for AgentOutput {
    fn from(messages: Vec<OutputMessage>) -> Self {
        Self::Messages(messages)
    }
}

/// Extract the literal text of an agent output.
///
/// Plain input is returned unchanged. For a message list only the first
/// message counts: its text (chunks joined with no separator) is returned,
/// or [`FALLBACK_TEXT`] when it is not a text message or the list is empty.
pub fn parse_agent_output(output: &AgentOutput) -> String {
    match output {
        AgentOutput::Plain(text) => text.clone(),
        AgentOutput::Messages(messages) => messages
            .first()
            .and_then(OutputMessage::as_text)
            .unwrap_or_else(|| FALLBACK_TEXT.to_string()),
    }
}
