//! Shared domain types for the vibe coding-agent backend.
//!
//! Everything here is plain data: agent state, persisted records, the
//! inbound event payload, and the parser that turns an agent's raw output
//! into display text. Nothing in this crate performs I/O.

pub mod event;
pub mod output;
pub mod records;
pub mod state;

pub use event::{CODE_AGENT_RUN, CodeAgentEvent, WorkflowOutput};
pub use output::{AgentOutput, OutputMessage, TextContent, parse_agent_output};
pub use records::{
    Fragment, Message, MessageRole, MessageType, MessageWithFragment, NewFragment, Project,
    RunStatus, WorkflowRun,
};
pub use state::{AgentState, FileMap, TASK_SUMMARY_TAG};
