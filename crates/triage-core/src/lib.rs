//! triage-core - ticket triage on a hosted multi-agent service
//!
//! This crate provides:
//! - Wire types and an HTTP client for an assistants/threads/runs agent API
//! - Explicit credentials (static bearer token or Azure CLI)
//! - Agent registry, connected-tool binder, and a polling conversation driver
//! - Transcript presenter and best-effort, scoped teardown
//! - The triage workflow: three specialists behind one coordinator

pub mod client;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod host;
pub mod presenter;
pub mod registry;
pub mod teardown;
pub mod tools;
pub mod triage;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use client::AgentsClient;
pub use conversation::{ConversationDriver, PollPolicy};
pub use credential::{AzureCliCredential, Credential, StaticTokenCredential};
pub use error::{Result, TriageError};
pub use host::{AgentHost, NewAgent};
pub use registry::AgentRegistry;
pub use teardown::{CleanupReport, ResourceScope, cleanup};
pub use tools::to_tool;
pub use triage::{DEFAULT_PROMPT, Roster, TriageOutcome, TriageWorkflow};
pub use types::{AgentDefinition, Message, MessageRole, Run, RunStatus, Thread, ToolDescriptor};
