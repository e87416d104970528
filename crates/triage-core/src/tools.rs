//! Tool binder - expose a registered agent as a connected tool

use crate::types::{AgentDefinition, ToolDescriptor};

/// Wrap `agent` as a connected-agent tool another agent can delegate to.
///
/// Pure and local. Taking an [`AgentDefinition`] means the target must
/// already have been created by the host, so its id is the service's id.
pub fn to_tool(agent: &AgentDefinition, description: impl Into<String>) -> ToolDescriptor {
    ToolDescriptor {
        id: agent.id.clone(),
        name: agent.name.clone(),
        description: description.into(),
    }
}
