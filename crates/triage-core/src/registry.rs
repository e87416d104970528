//! Agent registry - create and delete agent definitions on the host

use std::sync::Arc;

use tracing::info;

use crate::error::{Result, TriageError};
use crate::host::{AgentHost, NewAgent};
use crate::types::{AgentDefinition, ToolDescriptor};

/// Thin call surface over the host's agent administration operations
#[derive(Clone)]
pub struct AgentRegistry {
    host: Arc<dyn AgentHost>,
}

impl AgentRegistry {
    pub fn new(host: Arc<dyn AgentHost>) -> Self {
        Self { host }
    }

    /// Register an agent. Only emptiness is checked locally; the host
    /// validates the model, name policy, and tools.
    pub async fn create_agent(
        &self,
        model: &str,
        name: &str,
        instructions: &str,
        tools: Vec<ToolDescriptor>,
    ) -> Result<AgentDefinition> {
        for (field, value) in [("model", model), ("name", name), ("instructions", instructions)] {
            if value.trim().is_empty() {
                return Err(TriageError::InvalidDefinition(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }

        let request = NewAgent {
            model: model.to_string(),
            name: name.to_string(),
            instructions: instructions.to_string(),
            tools,
        };
        let agent = self.host.create_agent(&request).await?;
        info!(
            "Created agent {} ({}) with {} connected tools",
            agent.name,
            agent.id,
            request.tools.len()
        );
        Ok(agent)
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        self.host.delete_agent(agent_id).await?;
        info!("Deleted agent {}", agent_id);
        Ok(())
    }
}
