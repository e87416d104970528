//! Error types for triage operations

/// Result type for triage operations
pub type Result<T> = std::result::Result<T, TriageError>;

/// Errors raised while talking to the agent host or driving a run
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    /// Missing or invalid settings, raised before any remote call
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Agent definition rejected before it was sent
    #[error("Invalid agent definition: {0}")]
    InvalidDefinition(String),

    /// The service answered with a non-success status
    #[error("Service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// The addressed resource does not exist (or was already deleted)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// No access token could be obtained
    #[error("Credential error: {0}")]
    Credential(String),

    /// Progress or transcript output could not be written
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    /// Run did not reach a terminal status in time
    #[error("Run {run_id} still {status} after {elapsed_ms}ms")]
    PollTimeout {
        run_id: String,
        status: String,
        elapsed_ms: u128,
    },

    /// Polling was cancelled by the caller
    #[error("Polling of run {0} was cancelled")]
    Cancelled(String),

    /// The run is waiting on function calls this client never resolves
    #[error("Run {run_id} requires client-side resolution of tool calls: {}", tool_calls.join(", "))]
    UnresolvedToolCalls {
        run_id: String,
        tool_calls: Vec<String>,
    },
}

impl TriageError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a service error
    pub fn service<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Service {
            status,
            message: msg.into(),
        }
    }

    /// Create a decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a credential error
    pub fn credential<S: Into<String>>(msg: S) -> Self {
        Self::Credential(msg.into())
    }

    /// Whether the error means the resource is already gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
