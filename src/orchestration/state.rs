use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{WorkflowError, WorkflowResult};

/// Lifecycle of one workflow invocation
///
/// # Status Transitions
/// ```text
/// Idle -> Routing -> Executing -> Aggregating -> Completed
///   \________\___________\____________\---------> Failed
/// ```
/// `Executing -> Completed` is also valid for the delegate and chain
/// topologies, which have nothing to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Routing,
    Executing,
    Aggregating,
    Completed,
    Failed,
}

impl WorkflowState {
    /// Checks if a transition from current state to next state is valid
    ///
    /// # Example
    /// ```
    /// use chorus_api::orchestration::WorkflowState;
    ///
    /// assert!(WorkflowState::Idle.can_transition_to(WorkflowState::Routing));
    /// assert!(WorkflowState::Executing.can_transition_to(WorkflowState::Failed));
    /// assert!(!WorkflowState::Completed.can_transition_to(WorkflowState::Failed));
    /// ```
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Idle, Routing)
                | (Routing, Executing)
                | (Executing, Aggregating)
                | (Executing, Completed)
                | (Aggregating, Completed)
                | (Idle, Failed)
                | (Routing, Failed)
                | (Executing, Failed)
                | (Aggregating, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "idle"),
            WorkflowState::Routing => write!(f, "routing"),
            WorkflowState::Executing => write!(f, "executing"),
            WorkflowState::Aggregating => write!(f, "aggregating"),
            WorkflowState::Completed => write!(f, "completed"),
            WorkflowState::Failed => write!(f, "failed"),
        }
    }
}

/// State tracker for one invocation
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    id: Uuid,
    state: WorkflowState,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: WorkflowState::Idle,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn transition(&mut self, next: WorkflowState) -> WorkflowResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(WorkflowError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!(run_id = %self.id, from = %self.state, to = %next, "Workflow state transition");
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}

impl Default for WorkflowRun {
    fn default() -> Self {
        Self::new()
    }
}
