//! Agent Core: orchestration layer for pipeline failure diagnosis.
//!
//! Submodules:
//! - `conversation`: Message history of one run
//! - `prompts`: System prompt and the per-report diagnostic prompt
//! - `orchestrator`: The bounded model ↔ tool loop
//! - `types`: Failure reports, run settings, run reports

pub mod conversation;
pub mod orchestrator;
pub mod prompts;
pub mod types;

// Re-exports for convenience
pub use conversation::Conversation;
pub use orchestrator::run_agent;
pub use types::{AgentSettings, FailureReport, RunOutcome, RunReport};
