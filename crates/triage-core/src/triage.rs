//! Ticket triage - a coordinator agent with connected specialists
//!
//! The specialists (priority, team, effort) are registered first and each is
//! wrapped as a connected tool right after it exists. The coordinator is
//! registered last with those tools, runs once against a thread holding the
//! ticket, and everything created is deleted on every exit path.

use std::io::Write;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::conversation::{ConversationDriver, PollPolicy};
use crate::error::{Result, TriageError};
use crate::host::AgentHost;
use crate::presenter;
use crate::registry::AgentRegistry;
use crate::teardown::{CleanupReport, DeleteOutcome, ResourceScope};
use crate::tools::to_tool;
use crate::types::{MessageRole, RunStatus, SortOrder};

/// Ticket used when none is given
pub const DEFAULT_PROMPT: &str = "Users can't reset their password from the mobile app.";

const PRIORITY_INSTRUCTIONS: &str = "\
Assess how urgent a ticket is based on its description.

Respond with one of the following levels:
- High: User-facing or blocking issues
- Medium: Time-sensitive but not breaking anything
- Low: Cosmetic or non-urgent tasks

Only output the urgency level and a very brief explanation.";

const TEAM_INSTRUCTIONS: &str = "\
Decide which team should own each ticket.

Choose from the following teams:
- Frontend
- Backend
- Infrastructure
- Marketing

Base your answer on the content of the ticket. Respond with the team name and a very brief explanation.";

const EFFORT_INSTRUCTIONS: &str = "\
Estimate how much work each ticket will require.

Use the following scale:
- Small: Can be completed in a day
- Medium: 2-3 days of work
- Large: Multi-day or cross-team effort

Base your estimate on the complexity implied by the ticket. Respond with the effort level and a brief justification.";

const TRIAGE_INSTRUCTIONS: &str = "\
Triage the given ticket. Use the connected tools to determine the ticket's priority,
which team it should be assigned to, and how much effort it may take.";

/// One agent to register
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub name: String,
    /// Short name used in progress output ("Deleted <label> agent.")
    pub label: String,
    /// Tool description shown to the coordinator; unused for the coordinator itself
    pub description: String,
    pub instructions: String,
}

impl AgentSpec {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            description: description.into(),
            instructions: instructions.into(),
        }
    }
}

/// The coordinator and the specialists it can call
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    pub coordinator: AgentSpec,
    pub specialists: Vec<AgentSpec>,
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            coordinator: AgentSpec::new("triage_agent", "triage", "", TRIAGE_INSTRUCTIONS),
            specialists: vec![
                AgentSpec::new(
                    "priority_agent",
                    "priority",
                    "Assess the priority of a ticket",
                    PRIORITY_INSTRUCTIONS,
                ),
                AgentSpec::new(
                    "team_agent",
                    "team",
                    "Determine which team should own a ticket",
                    TEAM_INSTRUCTIONS,
                ),
                AgentSpec::new(
                    "effort_agent",
                    "effort",
                    "Determines the effort required to complete the ticket",
                    EFFORT_INSTRUCTIONS,
                ),
            ],
        }
    }
}

/// Result of a triage that ran to a terminal run status
#[derive(Debug, Clone)]
pub struct TriageOutcome {
    pub run_status: RunStatus,
    /// Printed transcript lines, `[role]: text`
    pub transcript: Vec<String>,
    pub cleanup: CleanupReport,
}

pub struct TriageWorkflow {
    host: Arc<dyn AgentHost>,
    model: String,
    poll: PollPolicy,
    roster: Roster,
}

impl TriageWorkflow {
    pub fn new(host: Arc<dyn AgentHost>, model: impl Into<String>) -> Self {
        Self {
            host,
            model: model.into(),
            poll: PollPolicy::default(),
            roster: Roster::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    pub async fn run<W: Write>(&self, prompt: &str, out: &mut W) -> Result<TriageOutcome> {
        self.run_with_cancel(prompt, out, &CancellationToken::new())
            .await
    }

    /// Triage `prompt`, writing progress and the transcript to `out`.
    /// Resources are released whether or not the triage succeeds.
    pub async fn run_with_cancel<W: Write>(
        &self,
        prompt: &str,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<TriageOutcome> {
        if prompt.trim().is_empty() {
            return Err(TriageError::config("ticket text must not be empty"));
        }

        let mut scope = ResourceScope::new(self.host.clone());
        let outcome = self.triage(prompt, out, cancel, &mut scope).await;
        if let Err(e) = &outcome {
            warn!("Triage failed, releasing created resources: {}", e);
        }

        let cleanup = scope.release().await;
        let printed = print_cleanup(&cleanup, out);

        let (run_status, transcript) = outcome?;
        printed?;
        Ok(TriageOutcome {
            run_status,
            transcript,
            cleanup,
        })
    }

    async fn triage<W: Write>(
        &self,
        prompt: &str,
        out: &mut W,
        cancel: &CancellationToken,
        scope: &mut ResourceScope,
    ) -> Result<(RunStatus, Vec<String>)> {
        let registry = AgentRegistry::new(self.host.clone());

        let mut tools = Vec::with_capacity(self.roster.specialists.len());
        for spec in &self.roster.specialists {
            let agent = registry
                .create_agent(&self.model, &spec.name, &spec.instructions, Vec::new())
                .await?;
            scope.track_agent(&agent, spec.label.as_str());
            tools.push(to_tool(&agent, spec.description.as_str()));
        }

        let coordinator_spec = &self.roster.coordinator;
        let coordinator = registry
            .create_agent(
                &self.model,
                &coordinator_spec.name,
                &coordinator_spec.instructions,
                tools,
            )
            .await?;
        scope.track_agent(&coordinator, coordinator_spec.label.as_str());

        let driver = ConversationDriver::new(self.host.clone(), self.poll.clone());

        writeln!(out, "Creating agent thread")?;
        let thread = driver.create_thread().await?;
        scope.track_thread(&thread);
        driver
            .post_message(&thread, MessageRole::User, prompt)
            .await?;

        writeln!(out, "Processing agent thread. Please wait...")?;
        let run = driver.start_run(&thread, &coordinator).await?;
        let run = driver.poll_run_with_cancel(&thread, &run, cancel).await?;
        match (&run.status, &run.last_error) {
            (RunStatus::Completed, _) => info!("Triage run {} completed", run.id),
            (status, Some(err)) => warn!("Triage run {} ended {}: {}", run.id, status, err),
            (status, None) => warn!("Triage run {} ended {}", run.id, status),
        }

        let messages = driver.get_messages(&thread, SortOrder::Ascending).await?;
        presenter::render(&messages, out)?;

        Ok((run.status, presenter::transcript_lines(&messages)))
    }
}

fn print_cleanup<W: Write>(report: &CleanupReport, out: &mut W) -> std::io::Result<()> {
    let mut agents = report.agents().peekable();
    if agents.peek().is_none() {
        return Ok(());
    }
    writeln!(out, "Cleaning up agents:")?;
    for entry in agents {
        match &entry.outcome {
            DeleteOutcome::Deleted => writeln!(out, "Deleted {} agent.", entry.label)?,
            DeleteOutcome::AlreadyGone => {
                writeln!(out, "{} agent was already deleted.", entry.label)?
            }
            DeleteOutcome::Failed(err) => {
                writeln!(out, "Failed to delete {} agent ({}): {}", entry.label, entry.id, err)?
            }
        }
    }
    Ok(())
}
