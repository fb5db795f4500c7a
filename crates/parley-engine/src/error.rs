use std::time::Duration;

use parley_core::errors::BackendError;

/// Fatal outcomes of an agent run. Recoverable faults become history entries instead.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("too many rounds of generation ({0})")]
    TooManyRounds(u32),

    #[error("run out of context: {0}")]
    RunOutOfContext(String),

    #[error("parent run out of context: {0}")]
    ParentOutOfContext(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("delegation nested deeper than {0} levels")]
    DelegationTooDeep(u32),
}

impl AgentError {
    /// Lift a backend failure, separating context exhaustion from other faults.
    pub fn from_backend(e: BackendError) -> Self {
        if e.is_context_exhausted() {
            Self::RunOutOfContext(e.to_string())
        } else {
            Self::Backend(e)
        }
    }
}

/// Why a tool-call body could not be understood.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("tool name not found in call body")]
    MissingToolName,

    #[error("arguments must be an object")]
    ArgsNotObject,
}

/// Distinguishable failures of a registry invocation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InvokeError {
    #[error("Tool \"{0}\" not found")]
    NotFound(String),

    #[error("Calling tool \"{name}\" with bad arguments: {reason}")]
    BadArguments { name: String, reason: String },

    #[error("Calling tool \"{name}\" resulted in error: {reason}")]
    Failed { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("no interpreter for language {0:?}")]
    UnsupportedLanguage(String),

    #[error("failed to start {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote sandbox error: {0}")]
    Remote(String),
}
