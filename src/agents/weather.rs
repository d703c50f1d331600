use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::errors::AgentRunResult;
use super::reporter::AgentReporter;
use super::types::{error_output, AgentCapabilities, AgentContext, AgentOutput, AgentRole};
use super::{Agent, WEATHER_AGENT};
use crate::bus::CommandBus;

const INSTRUCTION_PREFIX: &str = "Get weather information for ";

/// Instruction for a weather request that names no place
pub const CURRENT_WEATHER_INSTRUCTION: &str = "Get current weather information";

static LOCATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in|for|at|from)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)")
        .expect("location pattern is valid")
});

/// Current conditions for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature_c: i32,
    pub condition: String,
    pub source: String,
}

impl WeatherReport {
    pub fn summary(&self) -> String {
        format!(
            "The weather in {} is currently {} and {}°C.",
            self.location,
            self.condition.to_lowercase(),
            self.temperature_c
        )
    }
}

/// Specialist agent answering current-weather questions
///
/// Conditions come from a deterministic offline stub; a real data source
/// plugs in behind [`WeatherAgent::lookup`].
pub struct WeatherAgent {
    reporter: AgentReporter,
}

impl WeatherAgent {
    pub fn new(bus: CommandBus) -> Self {
        Self {
            reporter: AgentReporter::new(WEATHER_AGENT, bus),
        }
    }

    /// Location from the context (`location`, or `arguments.location`), else
    /// a place named in the task text
    pub fn extract_location(task: &str, context: Option<&AgentContext>) -> Option<String> {
        if let Some(location) = context.and_then(location_from_context) {
            return Some(location);
        }

        let task = task.trim().trim_end_matches('?').trim();
        if let Some(rest) = task.strip_prefix(INSTRUCTION_PREFIX) {
            return non_empty(rest);
        }
        LOCATION_PATTERN
            .captures(task)
            .and_then(|captures| non_empty(&captures[1]))
    }

    pub fn lookup(location: &str) -> WeatherReport {
        WeatherReport {
            location: location.to_string(),
            temperature_c: 23,
            condition: "Partly cloudy".to_string(),
            source: "demo_stub".to_string(),
        }
    }
}

fn location_from_context(context: &AgentContext) -> Option<String> {
    if let Some(location) = context.get("location").and_then(Value::as_str) {
        return non_empty(location);
    }

    match context.get("arguments")? {
        Value::Object(args) => args
            .get("location")
            .and_then(Value::as_str)
            .and_then(non_empty),
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()?
            .get("location")
            .and_then(Value::as_str)
            .and_then(non_empty),
        _ => None,
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[async_trait]
impl Agent for WeatherAgent {
    fn name(&self) -> &str {
        WEATHER_AGENT
    }

    fn description(&self) -> &str {
        "Specialized agent for weather data retrieval and analysis"
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            name: self.name().to_string(),
            description: self.description().to_string(),
            role: AgentRole::Specialist,
            functions: vec![
                "get_current_weather".to_string(),
                "extract_location_from_text".to_string(),
            ],
            supported_queries: vec![
                "current weather".to_string(),
                "temperature".to_string(),
                "weather conditions".to_string(),
            ],
        }
    }

    async fn run(&self, task: &str, context: Option<&AgentContext>) -> AgentRunResult<AgentOutput> {
        self.reporter
            .notify_start(&format!("Getting weather for: {}", task));

        let Some(location) = Self::extract_location(task, context) else {
            let error = "No location specified for weather query";
            self.reporter.notify_error(error);
            return Ok(error_output(error));
        };

        self.reporter
            .notify_progress(&format!("Fetching current weather for {}...", location), None);

        let report = Self::lookup(&location);
        let formatted = report.summary();

        self.reporter.card("weather_update", serde_json::to_value(&report)?);
        self.reporter.speak(&formatted, "normal");
        self.reporter.notify_complete(json!({ "location": location }));

        let mut output = AgentOutput::new();
        output.insert("success".to_string(), json!(true));
        output.insert("location".to_string(), json!(location));
        output.insert("weather_data".to_string(), serde_json::to_value(&report)?);
        output.insert("formatted_response".to_string(), json!(formatted));
        Ok(output)
    }
}
