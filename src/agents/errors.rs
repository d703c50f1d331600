use thiserror::Error;

/// Errors that can occur while an agent runs a task
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Agent timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Agent panicked: {0}")]
    Panicked(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type AgentRunResult<T> = Result<T, AgentError>;
