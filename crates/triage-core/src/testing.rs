//! In-memory agent host for tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, TriageError};
use crate::host::{AgentHost, NewAgent};
use crate::types::{
    AgentDefinition, ContentItem, Message, MessagePage, MessageRole, RequiredAction, Run,
    RunError, RunStatus, SortOrder, Thread, ToolDefinition,
};

/// A call the fake host received, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateAgent(String),
    DeleteAgent(String),
    CreateThread,
    DeleteThread(String),
    CreateMessage(String),
    CreateRun { thread_id: String, agent_id: String },
    GetRun(String),
    ListMessages { after: Option<String> },
}

type ReplyFn = Box<dyn Fn(&AgentDefinition) -> Vec<ContentItem> + Send + Sync>;

#[derive(Default)]
struct State {
    next_id: u64,
    agents: BTreeMap<String, AgentDefinition>,
    threads: HashMap<String, Vec<Message>>,
    runs: HashMap<String, Run>,
    run_polls: HashMap<String, usize>,
    replied: HashSet<String>,
    calls: Vec<HostCall>,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }
}

/// Scripted stand-in for the hosted service.
///
/// Ids are sequential across all resource kinds (`asst_1`, `thread_5`, ...).
/// Each `get_run` advances that run through the status script; the last
/// status repeats. When a run first reports `Completed` the coordinator's
/// reply is appended to the thread.
pub struct FakeHost {
    state: Mutex<State>,
    run_script: Vec<RunStatus>,
    required_action: Option<RequiredAction>,
    rejected_models: Vec<String>,
    failing_creates: Vec<String>,
    failing_deletes: HashSet<String>,
    page_size: Option<u32>,
    reply: ReplyFn,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            run_script: vec![RunStatus::Completed],
            required_action: None,
            rejected_models: Vec::new(),
            failing_creates: Vec::new(),
            failing_deletes: HashSet::new(),
            page_size: None,
            reply: Box::new(|_| vec![ContentItem::text("Done.")]),
        }
    }

    /// Statuses reported by successive `get_run` calls
    pub fn with_run_script(mut self, script: Vec<RunStatus>) -> Self {
        assert!(!script.is_empty());
        self.run_script = script;
        self
    }

    /// Attached to runs while they report `RequiresAction`
    pub fn with_required_action(mut self, action: RequiredAction) -> Self {
        self.required_action = Some(action);
        self
    }

    pub fn with_reply<F>(mut self, reply: F) -> Self
    where
        F: Fn(&AgentDefinition) -> Vec<ContentItem> + Send + Sync + 'static,
    {
        self.reply = Box::new(reply);
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn reject_model(mut self, model: &str) -> Self {
        self.rejected_models.push(model.to_string());
        self
    }

    /// Creating an agent with this name fails with a 503
    pub fn fail_create_of(mut self, name: &str) -> Self {
        self.failing_creates.push(name.to_string());
        self
    }

    /// Deleting this id (agent or thread) fails with a 500
    pub fn fail_delete_of(mut self, id: &str) -> Self {
        self.failing_deletes.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Total `get_run` calls
    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().run_polls.values().sum()
    }

    pub fn live_agents(&self) -> Vec<String> {
        self.state.lock().unwrap().agents.keys().cloned().collect()
    }

    pub fn live_threads(&self) -> usize {
        self.state.lock().unwrap().threads.len()
    }

    /// Append a message to a thread as if the service wrote it
    pub fn push_message(&self, thread_id: &str, role: MessageRole, content: Vec<ContentItem>) {
        let mut state = self.state.lock().unwrap();
        let id = state.next("msg");
        if let Some(messages) = state.threads.get_mut(thread_id) {
            messages.push(Message {
                id,
                thread_id: thread_id.to_string(),
                role,
                content,
                created_at: None,
            });
        }
    }

    fn record(&self, call: HostCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl AgentHost for FakeHost {
    async fn create_agent(&self, agent: &NewAgent) -> Result<AgentDefinition> {
        self.record(HostCall::CreateAgent(agent.name.clone()));
        if self.rejected_models.contains(&agent.model) {
            return Err(TriageError::service(
                400,
                format!("invalid_model: Unknown model '{}'", agent.model),
            ));
        }
        if self.failing_creates.contains(&agent.name) {
            return Err(TriageError::service(503, "service unavailable"));
        }

        let mut state = self.state.lock().unwrap();
        if agent
            .tools
            .iter()
            .any(|t| !state.agents.contains_key(&t.id))
        {
            return Err(TriageError::service(400, "connected agent does not exist"));
        }
        let id = state.next("asst");
        let created = AgentDefinition {
            id: id.clone(),
            name: agent.name.clone(),
            model: agent.model.clone(),
            instructions: agent.instructions.clone(),
            tools: agent.tools.iter().cloned().map(ToolDefinition::from).collect(),
            created_at: None,
        };
        state.agents.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        self.record(HostCall::DeleteAgent(agent_id.to_string()));
        if self.failing_deletes.contains(agent_id) {
            return Err(TriageError::service(500, "internal error"));
        }
        match self.state.lock().unwrap().agents.remove(agent_id) {
            Some(_) => Ok(()),
            None => Err(TriageError::NotFound(format!("assistants/{}", agent_id))),
        }
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.record(HostCall::CreateThread);
        let mut state = self.state.lock().unwrap();
        let id = state.next("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(Thread {
            id,
            created_at: None,
        })
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.record(HostCall::DeleteThread(thread_id.to_string()));
        if self.failing_deletes.contains(thread_id) {
            return Err(TriageError::service(500, "internal error"));
        }
        match self.state.lock().unwrap().threads.remove(thread_id) {
            Some(_) => Ok(()),
            None => Err(TriageError::NotFound(format!("threads/{}", thread_id))),
        }
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        self.record(HostCall::CreateMessage(thread_id.to_string()));
        let mut state = self.state.lock().unwrap();
        let id = state.next("msg");
        let message = Message {
            id,
            thread_id: thread_id.to_string(),
            role,
            content: vec![ContentItem::text(content)],
            created_at: None,
        };
        state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| TriageError::NotFound(format!("threads/{}", thread_id)))?
            .push(message.clone());
        Ok(message)
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run> {
        self.record(HostCall::CreateRun {
            thread_id: thread_id.to_string(),
            agent_id: agent_id.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        if !state.threads.contains_key(thread_id) {
            return Err(TriageError::NotFound(format!("threads/{}", thread_id)));
        }
        if !state.agents.contains_key(agent_id) {
            return Err(TriageError::NotFound(format!("assistants/{}", agent_id)));
        }
        let id = state.next("run");
        let run = Run {
            id: id.clone(),
            thread_id: thread_id.to_string(),
            assistant_id: agent_id.to_string(),
            status: RunStatus::Queued,
            required_action: None,
            last_error: None,
            created_at: None,
        };
        state.runs.insert(id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.record(HostCall::GetRun(run_id.to_string()));
        let mut state = self.state.lock().unwrap();
        let mut run = state
            .runs
            .get(run_id)
            .filter(|r| r.thread_id == thread_id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(format!("threads/{}/runs/{}", thread_id, run_id)))?;

        let polls = state.run_polls.entry(run_id.to_string()).or_insert(0);
        let idx = (*polls).min(self.run_script.len() - 1);
        *polls += 1;
        run.status = self.run_script[idx];
        run.required_action = match run.status {
            RunStatus::RequiresAction => self.required_action.clone(),
            _ => None,
        };

        if run.status == RunStatus::Failed {
            run.last_error = Some(RunError {
                code: "server_error".to_string(),
                message: "The model failed to respond".to_string(),
            });
        }

        if run.status == RunStatus::Completed && state.replied.insert(run_id.to_string()) {
            let content = match state.agents.get(&run.assistant_id) {
                Some(agent) => (self.reply)(agent),
                None => vec![ContentItem::text("Done.")],
            };
            let id = state.next("msg");
            if let Some(messages) = state.threads.get_mut(thread_id) {
                messages.push(Message {
                    id,
                    thread_id: thread_id.to_string(),
                    role: MessageRole::Agent,
                    content,
                    created_at: None,
                });
            }
        }

        state.runs.insert(run_id.to_string(), run.clone());
        Ok(run)
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        order: SortOrder,
        after: Option<&str>,
        limit: u32,
    ) -> Result<MessagePage> {
        self.record(HostCall::ListMessages {
            after: after.map(str::to_string),
        });
        let state = self.state.lock().unwrap();
        let mut messages = state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(format!("threads/{}", thread_id)))?;
        if order == SortOrder::Descending {
            messages.reverse();
        }

        let start = match after {
            Some(cursor) => messages
                .iter()
                .position(|m| m.id == cursor)
                .map(|p| p + 1)
                .unwrap_or(messages.len()),
            None => 0,
        };
        let limit = self.page_size.map_or(limit, |p| p.min(limit)) as usize;
        let data: Vec<Message> = messages.iter().skip(start).take(limit).cloned().collect();
        let has_more = start + data.len() < messages.len();

        Ok(MessagePage {
            first_id: data.first().map(|m| m.id.clone()),
            last_id: data.last().map(|m| m.id.clone()),
            has_more,
            data,
        })
    }
}
