use serde_json::{json, Value};
use uuid::Uuid;

use crate::bus::events::{payload, Payload};
use crate::bus::{CommandBus, EventKind};

/// Publishes an agent's lifecycle and output events with the agent as source
#[derive(Clone)]
pub struct AgentReporter {
    name: String,
    bus: CommandBus,
}

impl AgentReporter {
    pub fn new(name: impl Into<String>, bus: CommandBus) -> Self {
        Self {
            name: name.into(),
            bus,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emit(&self, kind: EventKind, data: Payload) -> Uuid {
        self.bus.publish(kind, data, Some(&self.name))
    }

    pub fn notify_start(&self, task: &str) -> Uuid {
        self.emit(
            EventKind::Status,
            payload(json!({ "agent": self.name, "status": "active", "task": task })),
        )
    }

    pub fn notify_progress(&self, message: &str, percentage: Option<f32>) -> Uuid {
        let mut data = payload(json!({ "agent": self.name, "message": message }));
        if let Some(pct) = percentage {
            data.insert("percentage".to_string(), json!(pct));
        }
        self.emit(EventKind::Progress, data)
    }

    pub fn notify_complete(&self, result: Value) -> Uuid {
        self.emit(
            EventKind::Status,
            payload(json!({ "agent": self.name, "status": "idle", "result": result })),
        )
    }

    pub fn notify_error(&self, error: &str) -> Uuid {
        self.emit(
            EventKind::Error,
            payload(json!({ "agent": self.name, "message": error })),
        )
    }

    pub fn speak(&self, text: &str, priority: &str) -> Uuid {
        self.emit(
            EventKind::Speech,
            payload(json!({ "text": text, "priority": priority, "agent": self.name })),
        )
    }

    pub fn card(&self, card_type: &str, data: Value) -> Uuid {
        self.emit(
            EventKind::Card,
            payload(json!({ "card": card_type, "agent": self.name, "data": data })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;

    #[tokio::test]
    async fn test_events_carry_agent_source() {
        let bus = CommandBus::start(BusConfig::default());
        let mut sub = bus.subscribe();
        let reporter = AgentReporter::new("WeatherAgent", bus.clone());

        reporter.notify_start("Get weather information for Oslo");
        reporter.speak("It is cold in Oslo.", "normal");
        reporter.notify_error("no data");

        let start = sub.next_event().await.unwrap();
        assert_eq!(start.kind, EventKind::Status);
        assert_eq!(start.source.as_deref(), Some("WeatherAgent"));
        assert_eq!(start.payload["status"], "active");

        let speech = sub.next_event().await.unwrap();
        assert_eq!(speech.speech_text(), Some("It is cold in Oslo."));

        let error = sub.next_event().await.unwrap();
        assert_eq!(error.error_message(), Some("no data"));
    }
}
