pub mod agent;
pub mod config;
pub mod db;
pub mod errors;
pub mod llm;
pub mod sandbox;
pub mod telemetry;
pub mod web;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
