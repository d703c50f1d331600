use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::errors::AgentRunResult;
use super::reporter::AgentReporter;
use super::types::{error_output, response_text, AgentCapabilities, AgentContext, AgentOutput, AgentRole};
use super::{Agent, PLANNER_AGENT};
use crate::bus::events::payload;
use crate::bus::{CommandBus, EventKind};
use crate::orchestration::TaskDecomposer;

/// Coordinating agent that receives whole requests
///
/// It routes the request to the best-suited specialist it knows about and
/// relays that answer, or replies itself for general conversation. Natural
/// language generation proper lives outside this crate; the general replies
/// here are fixed phrases.
pub struct PlannerAgent {
    reporter: AgentReporter,
    specialists: Vec<Arc<dyn Agent>>,
}

impl PlannerAgent {
    pub fn new(bus: CommandBus, specialists: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            reporter: AgentReporter::new(PLANNER_AGENT, bus),
            specialists,
        }
    }

    fn specialist(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.specialists.iter().find(|agent| agent.name() == name)
    }

    fn general_reply(&self, task: &str) -> String {
        let lower = task.to_lowercase();
        if lower.contains("joke") {
            "Why did the scarecrow win an award? Because he was outstanding in his field.".to_string()
        } else if lower.contains("help") {
            let names: Vec<&str> = self.specialists.iter().map(|agent| agent.name()).collect();
            if names.is_empty() {
                "I can help with general questions.".to_string()
            } else {
                format!(
                    "I can help with general questions and work with {} for you.",
                    names.join(" and ")
                )
            }
        } else {
            format!("I've noted your request: {}.", task.trim().trim_end_matches('.'))
        }
    }

    async fn consult(
        &self,
        specialist: &Arc<dyn Agent>,
        task: &str,
        context: Option<&AgentContext>,
    ) -> AgentRunResult<AgentOutput> {
        let acknowledgement = "I'll check that for you.";
        self.reporter.speak(acknowledgement, "high");
        self.reporter.emit(
            EventKind::ToolStart,
            payload(json!({ "function_name": specialist.name(), "arguments": { "task": task } })),
        );

        let tool_output = specialist.run(task, context).await?;

        self.reporter.emit(
            EventKind::ToolComplete,
            payload(json!({ "function_name": specialist.name(), "result": Value::Object(tool_output.clone()) })),
        );

        if let Some(error) = tool_output.get("error").and_then(Value::as_str) {
            let message = format!("Error executing tool {}: {}", specialist.name(), error);
            self.reporter.notify_error(&message);
            return Ok(error_output(&message));
        }

        let final_response = response_text(&tool_output)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} finished your request.", specialist.name()));

        let mut output = AgentOutput::new();
        output.insert("response_text".to_string(), json!(acknowledgement));
        output.insert("final_response".to_string(), json!(final_response));
        output.insert("delegated_to".to_string(), json!(specialist.name()));
        output.insert("tool_result".to_string(), Value::Object(tool_output));
        Ok(output)
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn name(&self) -> &str {
        PLANNER_AGENT
    }

    fn description(&self) -> &str {
        "Main orchestrator for conversations and tool routing"
    }

    fn role(&self) -> AgentRole {
        AgentRole::Coordinator
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            name: self.name().to_string(),
            description: self.description().to_string(),
            role: self.role(),
            functions: vec![
                "process_conversations".to_string(),
                "route_to_specialist".to_string(),
            ],
            supported_queries: vec!["general questions".to_string(), "help".to_string()],
        }
    }

    async fn run(&self, task: &str, context: Option<&AgentContext>) -> AgentRunResult<AgentOutput> {
        let preview: String = task.chars().take(50).collect();
        self.reporter.notify_start(&format!("Processing: {}", preview));
        self.reporter.notify_progress("Thinking...", None);

        let route = TaskDecomposer::route_task(task);
        let output = match self.specialist(route).filter(|_| route != PLANNER_AGENT) {
            Some(specialist) => {
                tracing::debug!(specialist = specialist.name(), "Planner consulting specialist");
                self.consult(specialist, task, context).await?
            }
            None => {
                let reply = self.general_reply(task);
                self.reporter.speak(&reply, "high");
                let mut output = AgentOutput::new();
                output.insert("response_text".to_string(), json!(reply));
                output
            }
        };

        self.reporter
            .notify_complete(json!({ "delegated_to": output.get("delegated_to") }));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{WeatherAgent, WEATHER_AGENT};
    use crate::bus::BusConfig;

    fn planner(bus: &CommandBus) -> PlannerAgent {
        let weather: Arc<dyn Agent> = Arc::new(WeatherAgent::new(bus.clone()));
        PlannerAgent::new(bus.clone(), vec![weather])
    }

    #[tokio::test]
    async fn test_planner_is_coordinator() {
        let agent = planner(&CommandBus::start(BusConfig::default()));

        assert_eq!(agent.role(), AgentRole::Coordinator);
        assert_eq!(agent.capabilities().role, AgentRole::Coordinator);
    }

    #[tokio::test]
    async fn test_delegates_weather_question() {
        let bus = CommandBus::start(BusConfig::default());
        let agent = planner(&bus);

        let output = agent.run("What's the weather in Berlin?", None).await.unwrap();

        assert_eq!(output["delegated_to"], WEATHER_AGENT);
        assert_eq!(
            output["final_response"],
            "The weather in Berlin is currently partly cloudy and 23°C."
        );
    }

    #[tokio::test]
    async fn test_answers_general_request_itself() {
        let bus = CommandBus::start(BusConfig::default());
        let agent = planner(&bus);

        let output = agent.run("tell me a joke", None).await.unwrap();

        assert!(output.get("delegated_to").is_none());
        assert!(output["response_text"].as_str().unwrap().contains("scarecrow"));
    }

    #[tokio::test]
    async fn test_unknown_specialist_falls_back_to_general_reply() {
        let bus = CommandBus::start(BusConfig::default());
        let agent = planner(&bus);

        // Calendar request, but no calendar specialist registered.
        let output = agent.run("check my calendar", None).await.unwrap();
        assert_eq!(output["response_text"], "I've noted your request: check my calendar.");
    }
}
