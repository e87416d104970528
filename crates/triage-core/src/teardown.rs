//! Teardown - best-effort deletion of created resources
//!
//! [`cleanup`] sweeps a thread and a list of agents, attempting every delete
//! even when earlier ones fail. [`ResourceScope`] records resources as they
//! are created so the sweep also covers runs that fail part-way through setup.

use std::sync::Arc;

use tracing::{info, warn};

use crate::host::AgentHost;
use crate::registry::AgentRegistry;
use crate::types::{AgentDefinition, Thread};

/// An agent to delete, with the label used in progress output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAgent {
    pub id: String,
    pub label: String,
    /// Holds connected-agent tools pointing at other agents
    pub delegates: bool,
}

impl TrackedAgent {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            delegates: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Thread,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The host no longer had it
    AlreadyGone,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupEntry {
    pub kind: ResourceKind,
    pub id: String,
    pub label: String,
    pub outcome: DeleteOutcome,
}

/// What happened to each resource during a sweep, in attempt order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub entries: Vec<CleanupEntry>,
}

impl CleanupReport {
    /// True when nothing is left behind on the host
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, DeleteOutcome::Failed(_)))
    }

    pub fn agents(&self) -> impl Iterator<Item = &CleanupEntry> {
        self.entries.iter().filter(|e| e.kind == ResourceKind::Agent)
    }
}

/// Delete the thread (if any), then each agent in the order given.
/// Every delete is attempted; failures are logged and recorded, never raised.
pub async fn cleanup(
    host: &Arc<dyn AgentHost>,
    thread_id: Option<&str>,
    agents: &[TrackedAgent],
) -> CleanupReport {
    let registry = AgentRegistry::new(host.clone());
    let mut report = CleanupReport::default();

    if let Some(thread_id) = thread_id {
        let outcome = outcome_of(host.delete_thread(thread_id).await, "thread", thread_id);
        report.entries.push(CleanupEntry {
            kind: ResourceKind::Thread,
            id: thread_id.to_string(),
            label: "thread".to_string(),
            outcome,
        });
    }

    for agent in agents {
        let outcome = outcome_of(registry.delete_agent(&agent.id).await, &agent.label, &agent.id);
        report.entries.push(CleanupEntry {
            kind: ResourceKind::Agent,
            id: agent.id.clone(),
            label: agent.label.clone(),
            outcome,
        });
    }

    let failed = report.failures().count();
    if failed > 0 {
        warn!("Cleanup left {} resources behind", failed);
    } else {
        info!("Cleanup removed {} resources", report.entries.len());
    }
    report
}

fn outcome_of(result: crate::error::Result<()>, label: &str, id: &str) -> DeleteOutcome {
    match result {
        Ok(()) => DeleteOutcome::Deleted,
        Err(e) if e.is_not_found() => {
            info!("{} {} was already deleted", label, id);
            DeleteOutcome::AlreadyGone
        }
        Err(e) => {
            warn!("Failed to delete {} {}: {}", label, id, e);
            DeleteOutcome::Failed(e.to_string())
        }
    }
}

/// Resources created during one triage, released together.
///
/// Agents holding connected tools are released first, so a coordinator goes
/// before the specialists it references. Otherwise creation order is kept.
pub struct ResourceScope {
    host: Arc<dyn AgentHost>,
    thread: Option<String>,
    agents: Vec<TrackedAgent>,
    released: bool,
}

impl ResourceScope {
    pub fn new(host: Arc<dyn AgentHost>) -> Self {
        Self {
            host,
            thread: None,
            agents: Vec::new(),
            released: false,
        }
    }

    pub fn track_thread(&mut self, thread: &Thread) {
        self.thread = Some(thread.id.clone());
    }

    pub fn track_agent(&mut self, agent: &AgentDefinition, label: impl Into<String>) {
        let mut tracked = TrackedAgent::new(agent.id.clone(), label);
        tracked.delegates = agent.connected_agents().next().is_some();
        self.agents.push(tracked);
    }

    pub fn is_empty(&self) -> bool {
        self.thread.is_none() && self.agents.is_empty()
    }

    /// Delete everything tracked
    pub async fn release(mut self) -> CleanupReport {
        self.released = true;
        let mut agents = self.agents.clone();
        // stable: specialists keep their creation order
        agents.sort_by_key(|a| !a.delegates);
        cleanup(&self.host, self.thread.as_deref(), &agents).await
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        if !self.released && !self.is_empty() {
            let ids: Vec<&str> = self
                .thread
                .iter()
                .map(String::as_str)
                .chain(self.agents.iter().map(|a| a.id.as_str()))
                .collect();
            warn!("Resource scope dropped without release; leaking {}", ids.join(", "));
        }
    }
}
