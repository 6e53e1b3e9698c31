//! Durable, step-checkpointed execution of the code-agent workflow.

pub mod code_agent;
pub mod runner;
pub mod steps;

pub use code_agent::{CodeAgentResult, WorkflowDeps, WorkflowSettings};
pub use runner::{WorkflowRunner, validate_prompt};
pub use steps::StepContext;
