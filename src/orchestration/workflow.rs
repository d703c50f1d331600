use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::aggregate::{word_chunks, CombinedResult};
use super::decomposer::{TaskDecomposer, TaskPlan};
use super::errors::{WorkflowError, WorkflowResult};
use super::state::{WorkflowRun, WorkflowState};
use crate::agents::{
    Agent, AgentCapabilities, AgentContext, AgentError, AgentResult, AgentRole, AgentTask,
    FailedAgent,
};
use crate::bus::events::{error_payload, payload, progress_payload, speech_payload, status_payload, token_payload};
use crate::bus::{CommandBus, EventKind};

/// Source name on events the orchestrator publishes itself
pub const ORCHESTRATOR_SOURCE: &str = "WorkflowOrchestrator";

/// How a request that does not need decomposing is driven through the agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// The single coordinating agent receives the whole request
    Delegate,
    /// Agents run one after another in registration order
    Chain,
    /// Every agent receives the whole request concurrently
    Broadcast,
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::Delegate => write!(f, "delegate"),
            Topology::Chain => write!(f, "chain"),
            Topology::Broadcast => write!(f, "broadcast"),
        }
    }
}

impl FromStr for Topology {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delegate" | "star" => Ok(Topology::Delegate),
            "chain" => Ok(Topology::Chain),
            "broadcast" | "parallel" => Ok(Topology::Broadcast),
            other => Err(WorkflowError::UnknownTopology(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub topology: Topology,
    /// Upper bound on one agent branch; `None` waits indefinitely
    pub agent_timeout: Option<Duration>,
    /// Pause between summary word chunks
    pub token_pause: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Delegate,
            agent_timeout: Some(Duration::from_secs(60)),
            token_pause: Duration::from_millis(30),
        }
    }
}

/// Outcome of the fan-out path
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatedResponse {
    pub original_task: String,
    pub plan: TaskPlan,
    pub combined: CombinedResult,
    pub final_response: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowOutput {
    Delegated {
        agent: String,
        result: AgentResult,
    },
    Chained {
        context: AgentContext,
        failures: Vec<FailedAgent>,
    },
    Coordinated(CoordinatedResponse),
}

impl WorkflowOutput {
    /// Human-readable answer of the invocation, when there is one
    pub fn final_response(&self) -> Option<&str> {
        match self {
            WorkflowOutput::Delegated { result, .. } => result.response_text(),
            WorkflowOutput::Chained { context, .. } => crate::agents::types::response_text(context),
            WorkflowOutput::Coordinated(response) => Some(&response.final_response),
        }
    }
}

/// Result of one successful invocation
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub run_id: Uuid,
    pub state: WorkflowState,
    pub output: WorkflowOutput,
}

/// Multi-agent orchestrator
///
/// Requests with several parts or domains always fan out: they are
/// decomposed, each sub-task runs concurrently on its agent, and the
/// results are aggregated and streamed back as `token` events. Other
/// requests follow the configured [`Topology`].
pub struct Workflow {
    bus: CommandBus,
    decomposer: TaskDecomposer,
    agents: Vec<Arc<dyn Agent>>,
    config: WorkflowConfig,
}

impl Workflow {
    pub fn new(bus: CommandBus, config: WorkflowConfig) -> Self {
        Self {
            bus,
            decomposer: TaskDecomposer::new(),
            agents: Vec::new(),
            config,
        }
    }

    pub fn with_agents(mut self, agents: impl IntoIterator<Item = Arc<dyn Agent>>) -> Self {
        for agent in agents {
            self.add_agent(agent);
        }
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Register an agent, replacing one with the same name in place
    pub fn add_agent(&mut self, agent: Arc<dyn Agent>) {
        tracing::info!(agent = agent.name(), role = %agent.role(), "Registering agent");
        match self.agents.iter_mut().find(|a| a.name() == agent.name()) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn remove_agent(&mut self, name: &str) -> Option<Arc<dyn Agent>> {
        let index = self.agents.iter().position(|a| a.name() == name)?;
        tracing::info!(agent = name, "Removing agent");
        Some(self.agents.remove(index))
    }

    pub fn get_agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.iter().find(|a| a.name() == name).cloned()
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn capabilities(&self) -> Vec<AgentCapabilities> {
        self.agents.iter().map(|a| a.capabilities()).collect()
    }

    /// The coordinating agent, if exactly one is registered
    fn coordinator(&self) -> Option<&Arc<dyn Agent>> {
        let mut coordinators = self
            .agents
            .iter()
            .filter(|a| a.role() == AgentRole::Coordinator);
        match (coordinators.next(), coordinators.next()) {
            (Some(agent), None) => Some(agent),
            _ => None,
        }
    }

    /// Run one request to completion
    ///
    /// A failing agent never fails the invocation; it shows up in the
    /// output instead. An `Err` means the invocation itself failed, in
    /// which case an `error` event has already been published.
    pub async fn run(&self, task: &str, context: Option<AgentContext>) -> WorkflowResult<WorkflowReport> {
        let mut run = WorkflowRun::new();

        match self.execute(&mut run, task, context.as_ref()).await {
            Ok(output) => Ok(WorkflowReport {
                run_id: run.id(),
                state: run.state(),
                output,
            }),
            Err(e) => {
                tracing::error!(run_id = %run.id(), state = %run.state(), error = %e, "Workflow failed");
                self.bus.publish(
                    EventKind::Error,
                    payload(json!({
                        "message": e.to_string(),
                        "workflow": "failed",
                        "run_id": run.id(),
                    })),
                    Some(ORCHESTRATOR_SOURCE),
                );
                if let Err(transition_error) = self.transition(&mut run, WorkflowState::Failed) {
                    tracing::warn!(run_id = %run.id(), error = %transition_error, "Could not mark workflow failed");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut WorkflowRun,
        task: &str,
        context: Option<&AgentContext>,
    ) -> WorkflowResult<WorkflowOutput> {
        self.transition(run, WorkflowState::Routing)?;

        let task = task.trim();
        if task.is_empty() {
            return Err(WorkflowError::EmptyTask);
        }
        if self.agents.is_empty() {
            return Err(WorkflowError::NoAgents);
        }

        if self.decomposer.should_parallelize(task) {
            tracing::info!(run_id = %run.id(), "Fanning out multi-part request");
            let plan = self.decomposer.decompose(task)?;
            return self.fan_out(run, task, plan, context).await;
        }

        match self.config.topology {
            Topology::Delegate => match self.coordinator() {
                Some(coordinator) => {
                    tracing::info!(run_id = %run.id(), agent = coordinator.name(), "Delegating request");
                    self.delegate(run, Arc::clone(coordinator), task, context).await
                }
                None => {
                    tracing::info!(run_id = %run.id(), "No single coordinator, fanning out instead");
                    let plan = self.decomposer.decompose(task)?;
                    self.fan_out(run, task, plan, context).await
                }
            },
            Topology::Chain => {
                tracing::info!(run_id = %run.id(), agents = self.agents.len(), "Chaining request");
                self.chain(run, task, context).await
            }
            Topology::Broadcast => {
                tracing::info!(run_id = %run.id(), agents = self.agents.len(), "Broadcasting request");
                let mut plan = TaskPlan::new();
                for agent in &self.agents {
                    plan.push(agent.name(), task);
                }
                self.fan_out(run, task, plan, context).await
            }
        }
    }

    async fn delegate(
        &self,
        run: &mut WorkflowRun,
        coordinator: Arc<dyn Agent>,
        task: &str,
        context: Option<&AgentContext>,
    ) -> WorkflowResult<WorkflowOutput> {
        self.transition(run, WorkflowState::Executing)?;

        let agent_task = AgentTask::new(coordinator.name(), task);
        let result = self
            .dispatch(vec![(coordinator, agent_task)], context)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| WorkflowError::AggregationFailed("delegate produced no result".to_string()))?;

        self.transition(run, WorkflowState::Completed)?;
        Ok(WorkflowOutput::Delegated {
            agent: result.agent_name.clone(),
            result,
        })
    }

    async fn chain(
        &self,
        run: &mut WorkflowRun,
        task: &str,
        context: Option<&AgentContext>,
    ) -> WorkflowResult<WorkflowOutput> {
        self.transition(run, WorkflowState::Executing)?;

        let mut current_task = task.to_string();
        let mut accumulated = context.cloned().unwrap_or_default();
        let mut failures = Vec::new();

        for agent in &self.agents {
            let agent_task = AgentTask::new(agent.name(), current_task.clone());
            let Some(result) = self
                .dispatch(vec![(Arc::clone(agent), agent_task)], Some(&accumulated))
                .await
                .into_iter()
                .next()
            else {
                continue;
            };

            match result.error() {
                Some(error) => failures.push(FailedAgent {
                    agent_name: result.agent_name.clone(),
                    sub_task: result.sub_task.clone(),
                    error: error.to_string(),
                }),
                None => {
                    if let Some(text) = result.response_text() {
                        current_task = text.to_string();
                    }
                    if let Some(output) = result.output() {
                        accumulated.extend(output.clone());
                    }
                }
            }
        }

        self.transition(run, WorkflowState::Completed)?;
        Ok(WorkflowOutput::Chained {
            context: accumulated,
            failures,
        })
    }

    async fn fan_out(
        &self,
        run: &mut WorkflowRun,
        task: &str,
        plan: TaskPlan,
        context: Option<&AgentContext>,
    ) -> WorkflowResult<WorkflowOutput> {
        let mut assignments = Vec::with_capacity(plan.task_count());
        for agent_task in plan.tasks() {
            match self.get_agent(&agent_task.agent_name) {
                Some(agent) => assignments.push((agent, agent_task)),
                None => tracing::warn!(
                    agent = %agent_task.agent_name,
                    sub_task = %agent_task.sub_task,
                    "No registered agent for sub-task, skipping"
                ),
            }
        }
        if assignments.is_empty() {
            let planned: Vec<&str> = plan.agents().collect();
            return Err(WorkflowError::NothingDispatchable(planned.join(", ")));
        }

        self.bus.publish(
            EventKind::Speech,
            speech_payload("I'll coordinate multiple agents to handle your request."),
            Some(ORCHESTRATOR_SOURCE),
        );

        self.transition(run, WorkflowState::Executing)?;
        self.progress(
            &format!("Task parsed: {} sub-tasks across {} agents", assignments.len(), plan.agent_count()),
            20.0,
        );
        self.progress("Executing parallel agent tasks...", 50.0);

        let results = self.dispatch(assignments, context).await;

        self.transition(run, WorkflowState::Aggregating)?;
        let combined = CombinedResult::from_results(results)?;
        self.progress("All agents completed, combining results", 90.0);

        let final_response = combined.summary();
        self.stream_tokens(&final_response).await;
        self.progress("Multi-agent coordination complete", 100.0);

        self.transition(run, WorkflowState::Completed)?;
        Ok(WorkflowOutput::Coordinated(CoordinatedResponse {
            original_task: task.to_string(),
            plan,
            combined,
            final_response,
        }))
    }

    /// Run every assignment concurrently; results come back in assignment order
    ///
    /// Each branch runs on its own task so a panic stays inside it. Branches
    /// still running when this future is dropped are aborted.
    async fn dispatch(
        &self,
        assignments: Vec<(Arc<dyn Agent>, AgentTask)>,
        context: Option<&AgentContext>,
    ) -> Vec<AgentResult> {
        let tasks: Vec<AgentTask> = assignments.iter().map(|(_, task)| task.clone()).collect();

        let mut branches = BranchHandles(
            assignments
                .into_iter()
                .map(|(agent, agent_task)| {
                    let bus = self.bus.clone();
                    let context = context.cloned();
                    let timeout = self.config.agent_timeout;
                    tokio::spawn(run_branch(bus, agent, agent_task, context, timeout))
                })
                .collect(),
        );

        join_all(branches.0.iter_mut())
            .await
            .into_iter()
            .zip(tasks)
            .map(|(joined, agent_task)| match joined {
                Ok(result) => result,
                Err(e) => {
                    let error = AgentError::Panicked(e.to_string());
                    tracing::warn!(agent = %agent_task.agent_name, error = %error, "Agent branch panicked");
                    self.bus.publish(
                        EventKind::AgentDone,
                        payload(json!({ "agent": agent_task.agent_name, "success": false })),
                        Some(&agent_task.agent_name),
                    );
                    AgentResult::failure(&agent_task, error.to_string())
                }
            })
            .collect()
    }

    async fn stream_tokens(&self, text: &str) {
        for chunk in word_chunks(text) {
            self.bus
                .publish(EventKind::Token, token_payload(&chunk), Some(ORCHESTRATOR_SOURCE));
            if !self.config.token_pause.is_zero() {
                tokio::time::sleep(self.config.token_pause).await;
            }
        }
    }

    fn progress(&self, message: &str, percentage: f32) {
        self.bus.publish(
            EventKind::Progress,
            progress_payload(message, Some(percentage)),
            Some(ORCHESTRATOR_SOURCE),
        );
    }

    fn transition(&self, run: &mut WorkflowRun, next: WorkflowState) -> WorkflowResult<()> {
        run.transition(next)?;

        let mut status = status_payload(&format!("Workflow {}", next));
        status.insert("workflow".to_string(), json!(next));
        status.insert("run_id".to_string(), json!(run.id()));
        self.bus
            .publish(EventKind::Status, status, Some(ORCHESTRATOR_SOURCE));
        Ok(())
    }
}

/// Spawned branches of one dispatch, aborted together on drop
struct BranchHandles(Vec<JoinHandle<AgentResult>>);

impl Drop for BranchHandles {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Execute one agent task, bounded by `timeout`, announcing it on the bus
async fn run_branch(
    bus: CommandBus,
    agent: Arc<dyn Agent>,
    agent_task: AgentTask,
    context: Option<AgentContext>,
    timeout: Option<Duration>,
) -> AgentResult {
    bus.publish(
        EventKind::AgentStart,
        payload(json!({ "agent": agent_task.agent_name, "task": agent_task.sub_task })),
        Some(&agent_task.agent_name),
    );

    let execution = agent.run(&agent_task.sub_task, context.as_ref());
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, execution)
            .await
            .unwrap_or(Err(AgentError::Timeout(limit))),
        None => execution.await,
    };

    let result = AgentResult::from_run(&agent_task, outcome);
    if let Some(error) = result.error() {
        tracing::warn!(agent = %agent_task.agent_name, sub_task = %agent_task.sub_task, error, "Agent branch failed");
        bus.publish(EventKind::Error, error_payload(error), Some(&agent_task.agent_name));
    }

    bus.publish(
        EventKind::AgentDone,
        payload(json!({
            "agent": agent_task.agent_name,
            "task": agent_task.sub_task,
            "success": result.is_success(),
        })),
        Some(&agent_task.agent_name),
    );
    result
}
