use axum::{extract::State, Json};
use serde::Serialize;

use crate::agents::AgentCapabilities;
use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentCapabilities>,
}

/// List registered agents and what they can do
///
/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: state.workflow.capabilities(),
    })
}
