use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::AgentRunResult;

/// Free-form result map returned by an agent
pub type AgentOutput = Map<String, Value>;

/// Context handed to an agent alongside its task
pub type AgentContext = Map<String, Value>;

/// Keys under which an agent may place its human-readable answer, in
/// order of preference
pub const RESPONSE_KEYS: [&str; 3] = ["formatted_response", "final_response", "response_text"];

/// One unit of decomposed work routed to a single agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTask {
    pub agent_name: String,
    pub sub_task: String,
}

impl AgentTask {
    pub fn new(agent_name: impl Into<String>, sub_task: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            sub_task: sub_task.into(),
        }
    }
}

/// Outcome of running one agent task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum AgentOutcome {
    Success(AgentOutput),
    Failure(String),
}

/// Result of one agent task, never mutated once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub sub_task: String,
    pub outcome: AgentOutcome,
}

impl AgentResult {
    pub fn success(task: &AgentTask, output: AgentOutput) -> Self {
        Self {
            agent_name: task.agent_name.clone(),
            sub_task: task.sub_task.clone(),
            outcome: AgentOutcome::Success(output),
        }
    }

    pub fn failure(task: &AgentTask, error: impl Into<String>) -> Self {
        Self {
            agent_name: task.agent_name.clone(),
            sub_task: task.sub_task.clone(),
            outcome: AgentOutcome::Failure(error.into()),
        }
    }

    /// Build from what an agent's `run` returned
    ///
    /// Agents report handled failures by returning an `error` field rather
    /// than an `Err`; both count as failures.
    pub fn from_run(task: &AgentTask, result: AgentRunResult<AgentOutput>) -> Self {
        match result {
            Ok(output) => match reported_error(&output) {
                Some(error) => Self::failure(task, error),
                None => Self::success(task, output),
            },
            Err(e) => Self::failure(task, e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AgentOutcome::Success(_))
    }

    pub fn output(&self) -> Option<&AgentOutput> {
        match &self.outcome {
            AgentOutcome::Success(output) => Some(output),
            AgentOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            AgentOutcome::Success(_) => None,
            AgentOutcome::Failure(error) => Some(error),
        }
    }

    /// The best available human-readable text of a successful result
    pub fn response_text(&self) -> Option<&str> {
        self.output().and_then(response_text)
    }
}

/// Pick the preferred human-readable field out of an agent output
pub fn response_text(output: &AgentOutput) -> Option<&str> {
    RESPONSE_KEYS.iter().find_map(|key| {
        output
            .get(*key)
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
    })
}

/// Output reporting a handled failure
pub fn error_output(message: &str) -> AgentOutput {
    let mut output = AgentOutput::new();
    output.insert("error".to_string(), Value::String(message.to_string()));
    output
}

fn reported_error(output: &AgentOutput) -> Option<String> {
    match output.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

/// A failed branch as listed in a combined result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAgent {
    pub agent_name: String,
    pub sub_task: String,
    pub error: String,
}

/// Role an agent plays in orchestration, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Receives whole requests in the delegate topology
    Coordinator,
    /// Handles one domain
    Specialist,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Coordinator => write!(f, "Coordinator"),
            AgentRole::Specialist => write!(f, "Specialist"),
        }
    }
}

/// Self-description an agent reports to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub name: String,
    pub description: String,
    pub role: AgentRole,
    pub functions: Vec<String>,
    pub supported_queries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::errors::AgentError;
    use serde_json::json;

    fn output(value: Value) -> AgentOutput {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_run_success() {
        let task = AgentTask::new("WeatherAgent", "Get weather information for Paris");
        let result = AgentResult::from_run(
            &task,
            Ok(output(json!({ "formatted_response": "Sunny in Paris." }))),
        );

        assert!(result.is_success());
        assert_eq!(result.response_text(), Some("Sunny in Paris."));
        assert_eq!(result.agent_name, "WeatherAgent");
    }

    #[test]
    fn test_from_run_reported_error() {
        let task = AgentTask::new("CalendarAgent", "Calendar task: dance");
        let result = AgentResult::from_run(&task, Ok(output(json!({ "error": "Unknown task" }))));

        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Unknown task"));
        assert_eq!(result.response_text(), None);
    }

    #[test]
    fn test_from_run_err() {
        let task = AgentTask::new("PlannerAgent", "tell me a joke");
        let result = AgentResult::from_run(
            &task,
            Err(AgentError::TaskExecutionFailed("model offline".to_string())),
        );

        assert_eq!(result.error(), Some("Task execution failed: model offline"));
    }

    #[test]
    fn test_response_text_preference_order() {
        let out = output(json!({
            "response_text": "third",
            "final_response": "second",
            "formatted_response": "first",
        }));
        assert_eq!(response_text(&out), Some("first"));

        let out = output(json!({ "response_text": "only" }));
        assert_eq!(response_text(&out), Some("only"));

        let out = output(json!({ "weather_data": {} }));
        assert_eq!(response_text(&out), None);
    }

    #[test]
    fn test_outcome_serialization() {
        let task = AgentTask::new("WeatherAgent", "x");
        let value = serde_json::to_value(AgentResult::failure(&task, "boom")).unwrap();

        assert_eq!(value["outcome"]["status"], "failure");
        assert_eq!(value["outcome"]["detail"], "boom");
    }
}
