//! HTTP client for a hosted agents service (assistants/threads/runs API)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::credential::Credential;
use crate::error::{Result, TriageError};
use crate::host::{AgentHost, NewAgent};
use crate::types::{
    AgentDefinition, Message, MessagePage, MessageRole, Run, SortOrder, Thread, ToolDefinition,
};

pub const DEFAULT_API_VERSION: &str = "v1";

/// Client for the agents data plane of a project endpoint
#[derive(Clone)]
pub struct AgentsClient {
    client: Client,
    endpoint: String,
    api_version: String,
    credential: Arc<dyn Credential>,
}

impl std::fmt::Debug for AgentsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentsClient")
            .field("client", &"<reqwest::Client>")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("credential", &"<credential>")
            .finish()
    }
}

impl AgentsClient {
    /// Create a client for `endpoint`, authenticating with `credential`
    pub fn new(endpoint: &str, credential: Arc<dyn Credential>) -> Result<Self> {
        let parsed = Url::parse(endpoint)
            .map_err(|e| TriageError::config(format!("invalid project endpoint '{}': {}", endpoint, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TriageError::config(format!(
                "project endpoint must be http(s), got '{}'",
                parsed.scheme()
            )));
        }

        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credential,
        })
    }

    /// Set the `api-version` query parameter sent with every request
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T> {
        let url = format!("{}/{}", self.endpoint, path);
        let token = self.credential.token().await?;
        let request_id = Uuid::new_v4().to_string();

        debug!("{} {} (request id {})", method, path, request_id);

        let mut request = self
            .client
            .request(method, &url)
            .query(&[("api-version", self.api_version.as_str())])
            .query(query)
            .bearer_auth(&token.token)
            .header("x-ms-client-request-id", &request_id);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(TriageError::NotFound(path.to_string()));
            }
            return Err(TriageError::service(
                status.as_u16(),
                extract_error_message(&error_text),
            ));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| TriageError::decode(format!("{} {}: {}", path, e, truncate(&text, 200))))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let status: DeletionStatus = self.send(Method::DELETE, path, &[], None).await?;
        if !status.deleted {
            warn!("Service reported {} as not deleted", status.id);
        }
        Ok(())
    }
}

#[async_trait]
impl AgentHost for AgentsClient {
    async fn create_agent(&self, agent: &NewAgent) -> Result<AgentDefinition> {
        let tools: Vec<ToolDefinition> = agent.tools.iter().cloned().map(Into::into).collect();
        let body = json!({
            "model": agent.model,
            "name": agent.name,
            "instructions": agent.instructions,
            "tools": tools,
        });
        self.send(Method::POST, "assistants", &[], Some(body)).await
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        self.delete(&format!("assistants/{}", agent_id)).await
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.send(Method::POST, "threads", &[], Some(json!({}))).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.delete(&format!("threads/{}", thread_id)).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let body = json!({
            "role": role,
            "content": content,
        });
        self.send(
            Method::POST,
            &format!("threads/{}/messages", thread_id),
            &[],
            Some(body),
        )
        .await
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run> {
        let body = json!({ "assistant_id": agent_id });
        self.send(
            Method::POST,
            &format!("threads/{}/runs", thread_id),
            &[],
            Some(body),
        )
        .await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.send(
            Method::GET,
            &format!("threads/{}/runs/{}", thread_id, run_id),
            &[],
            None,
        )
        .await
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        order: SortOrder,
        after: Option<&str>,
        limit: u32,
    ) -> Result<MessagePage> {
        let mut query = vec![
            ("order", order.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        self.send(
            Method::GET,
            &format!("threads/{}/messages", thread_id),
            &query,
            None,
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct DeletionStatus {
    #[serde(default)]
    id: String,
    #[serde(default = "default_true")]
    deleted: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

/// Pull `error.code`/`error.message` out of the service's JSON error body
fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => match env.error.code {
            Some(code) => format!("{}: {}", code, env.error.message),
            None => env.error.message,
        },
        Err(_) if body.trim().is_empty() => "Unknown error".to_string(),
        Err(_) => truncate(body.trim(), 500).to_string(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
