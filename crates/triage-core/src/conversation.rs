//! Conversation driver - threads, messages, and run polling
//!
//! A run moves `Queued -> InProgress -> {RequiresAction -> InProgress,
//! Completed, Failed, Cancelled, Expired}` on the host. The driver starts it
//! and then waits, re-fetching on an interval, until the status is terminal.
//! Connected-agent tool calls are resolved by the host itself, so
//! `RequiresAction` is just another non-terminal status here.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TriageError};
use crate::host::AgentHost;
use crate::types::{AgentDefinition, Message, MessageRole, Run, RunStatus, SortOrder, Thread};

/// Messages requested per listing page
pub const MESSAGE_PAGE_SIZE: u32 = 100;

/// How a run is waited on
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Wait before the first fetch and between fetches
    pub interval: Duration,
    /// Upper bound for the interval when backing off
    pub max_interval: Duration,
    /// Interval multiplier per fetch; 1.0 keeps it fixed
    pub backoff_factor: f64,
    /// Give up after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            backoff_factor: 1.0,
            timeout: None,
        }
    }
}

impl PollPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Interval to use after waiting `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_factor <= 1.0 {
            return current;
        }
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .map_or(self.max_interval, |d| d.min(self.max_interval))
    }
}

/// Drives one conversation against an agent host
#[derive(Clone)]
pub struct ConversationDriver {
    host: Arc<dyn AgentHost>,
    poll: PollPolicy,
}

impl ConversationDriver {
    pub fn new(host: Arc<dyn AgentHost>, poll: PollPolicy) -> Self {
        Self { host, poll }
    }

    pub async fn create_thread(&self) -> Result<Thread> {
        let thread = self.host.create_thread().await?;
        info!("Created thread {}", thread.id);
        Ok(thread)
    }

    pub async fn post_message(
        &self,
        thread: &Thread,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let message = self.host.create_message(&thread.id, role, content).await?;
        debug!("Posted {} message {} to thread {}", role, message.id, thread.id);
        Ok(message)
    }

    /// Start executing `agent` against the thread; returns immediately
    pub async fn start_run(&self, thread: &Thread, agent: &AgentDefinition) -> Result<Run> {
        let run = self.host.create_run(&thread.id, &agent.id).await?;
        info!(
            "Started run {} of agent {} on thread {} (status {})",
            run.id, agent.name, thread.id, run.status
        );
        Ok(run)
    }

    /// Wait until the run reaches a terminal status
    pub async fn poll_run(&self, thread: &Thread, run: &Run) -> Result<Run> {
        self.poll_run_with_cancel(thread, run, &CancellationToken::new())
            .await
    }

    /// Wait until the run reaches a terminal status, the policy's timeout
    /// elapses, or `cancel` fires.
    pub async fn poll_run_with_cancel(
        &self,
        thread: &Thread,
        run: &Run,
        cancel: &CancellationToken,
    ) -> Result<Run> {
        let started = Instant::now();
        let deadline = self.poll.timeout.map(|t| started + t);
        let mut interval = self.poll.interval;
        let mut polls = 0usize;
        let mut warned_unknown = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Stopped polling run {} after {} polls", run.id, polls);
                    return Err(TriageError::Cancelled(run.id.clone()));
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let current = self.host.get_run(&thread.id, &run.id).await?;
            polls += 1;
            debug!("Run {} poll {}: {}", run.id, polls, current.status);

            if current.status.is_terminal() {
                info!(
                    "Run {} finished as {} after {} polls ({}ms)",
                    run.id,
                    current.status,
                    polls,
                    started.elapsed().as_millis()
                );
                return Ok(current);
            }

            match current.status {
                RunStatus::RequiresAction => {
                    if let Some(tool_calls) = current.client_tool_calls() {
                        warn!(
                            "Run {} is waiting on {} client-side tool calls",
                            run.id,
                            tool_calls.len()
                        );
                        return Err(TriageError::UnresolvedToolCalls {
                            run_id: run.id.clone(),
                            tool_calls,
                        });
                    }
                }
                RunStatus::Unknown if !warned_unknown => {
                    warn!("Run {} reported an unrecognized status; still polling", run.id);
                    warned_unknown = true;
                }
                _ => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(TriageError::PollTimeout {
                        run_id: run.id.clone(),
                        status: current.status.to_string(),
                        elapsed_ms: started.elapsed().as_millis(),
                    });
                }
            }

            interval = self.poll.next_interval(interval);
        }
    }

    /// The whole transcript, every page drained
    pub async fn get_messages(&self, thread: &Thread, order: SortOrder) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page = self
                .host
                .list_messages(&thread.id, order, after.as_deref(), MESSAGE_PAGE_SIZE)
                .await?;
            messages.extend(page.data);

            if !page.has_more {
                break;
            }
            match page.last_id {
                Some(last) => after = Some(last),
                None => {
                    warn!("Message listing for {} has more pages but no cursor", thread.id);
                    break;
                }
            }
        }

        debug!("Fetched {} messages from thread {}", messages.len(), thread.id);
        Ok(messages)
    }
}
