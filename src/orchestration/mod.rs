// Workflow orchestration
//
// Turns a raw request into per-agent sub-tasks, drives the agents through
// the selected topology and folds their results into one answer.

pub mod aggregate;
pub mod decomposer;
pub mod errors;
pub mod state;
pub mod workflow;

pub use aggregate::{word_chunks, AgentResultMap, CombinedResult};
pub use decomposer::{Bucket, TaskDecomposer, TaskPlan};
pub use errors::{WorkflowError, WorkflowResult};
pub use state::{WorkflowRun, WorkflowState};
pub use workflow::{
    CoordinatedResponse, Topology, Workflow, WorkflowConfig, WorkflowOutput, WorkflowReport,
    ORCHESTRATOR_SOURCE,
};
