// Agent system modules
//
// The uniform execution contract every task handler implements, the data
// passed between agents and the orchestrator, and the reference agents
// wired into the service.

pub mod calendar;
pub mod errors;
pub mod planner;
pub mod reporter;
pub mod types;
pub mod weather;

use async_trait::async_trait;

// Re-export main types
pub use calendar::CalendarAgent;
pub use errors::{AgentError, AgentRunResult};
pub use planner::PlannerAgent;
pub use reporter::AgentReporter;
pub use types::{
    AgentCapabilities, AgentContext, AgentOutcome, AgentOutput, AgentResult, AgentRole,
    AgentTask, FailedAgent,
};
pub use weather::{WeatherAgent, CURRENT_WEATHER_INSTRUCTION};

pub const PLANNER_AGENT: &str = "PlannerAgent";
pub const WEATHER_AGENT: &str = "WeatherAgent";
pub const CALENDAR_AGENT: &str = "CalendarAgent";

/// A task handler driven by the workflow orchestrator
///
/// `run` may suspend freely but must not block the runtime. Handled
/// failures can be reported either as `Err` or as an output carrying an
/// `error` field; the orchestrator treats both the same way.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn role(&self) -> AgentRole {
        AgentRole::Specialist
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            name: self.name().to_string(),
            description: self.description().to_string(),
            role: self.role(),
            functions: Vec::new(),
            supported_queries: Vec::new(),
        }
    }

    async fn run(&self, task: &str, context: Option<&AgentContext>) -> AgentRunResult<AgentOutput>;
}
