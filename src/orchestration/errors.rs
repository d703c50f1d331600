use thiserror::Error;

use super::state::WorkflowState;

/// Errors that end a single workflow invocation
///
/// A failing agent branch is never one of these; it is recorded in the
/// combined result instead.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Task is empty")]
    EmptyTask,

    #[error("No registered agent can take any sub-task (planned for: {0})")]
    NothingDispatchable(String),

    #[error("Aggregation failed: {0}")]
    AggregationFailed(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("No agents registered")]
    NoAgents,

    #[error("Unknown topology: {0}")]
    UnknownTopology(String),
}

impl WorkflowError {
    /// Caused by the request itself rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(self, WorkflowError::EmptyTask)
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
