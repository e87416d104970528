//! The remote agent-hosting API as seen by this client
//!
//! [`AgentHost`] lists exactly the operations the triage flow consumes. The
//! HTTP implementation lives in [`crate::client`]; everything else is written
//! against the trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AgentDefinition, Message, MessagePage, MessageRole, Run, SortOrder, Thread, ToolDescriptor};

/// Request body for creating an agent
#[derive(Debug, Clone, PartialEq)]
pub struct NewAgent {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDescriptor>,
}

/// Operations offered by an agent-hosting service
#[async_trait]
pub trait AgentHost: Send + Sync {
    async fn create_agent(&self, agent: &NewAgent) -> Result<AgentDefinition>;

    async fn delete_agent(&self, agent_id: &str) -> Result<()>;

    async fn create_thread(&self) -> Result<Thread>;

    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message>;

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// One page of messages; `after` is the cursor from the previous page
    async fn list_messages(
        &self,
        thread_id: &str,
        order: SortOrder,
        after: Option<&str>,
        limit: u32,
    ) -> Result<MessagePage>;
}
