use axum::{extract::State, Json};
use serde::Deserialize;

use crate::agents::AgentContext;
use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::orchestration::WorkflowReport;

/// Request body for running a workflow
#[derive(Debug, Deserialize)]
pub struct RunWorkflowRequest {
    pub task: String,
    #[serde(default)]
    pub context: Option<AgentContext>,
}

/// Run one request through the agents
///
/// POST /api/workflow
///
/// Progress is published on the bus while the request runs; the response
/// carries the final report.
pub async fn run_workflow(
    State(state): State<AppState>,
    Json(req): Json<RunWorkflowRequest>,
) -> Result<Json<WorkflowReport>, ApiError> {
    let report = state.workflow.run(&req.task, req.context).await?;
    Ok(Json(report))
}
