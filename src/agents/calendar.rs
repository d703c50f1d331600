use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::errors::{AgentError, AgentRunResult};
use super::reporter::AgentReporter;
use super::types::{error_output, AgentCapabilities, AgentContext, AgentOutput, AgentRole};
use super::{Agent, CALENDAR_AGENT};
use crate::bus::CommandBus;

/// One entry in the calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: String,
    pub title: String,
    pub start: DateTime<Local>,
    pub duration_minutes: u32,
    pub entry_type: String,
}

/// What a calendar task asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarRequest {
    AddEvent,
    NextEvent,
    TodaySchedule,
}

impl CalendarRequest {
    pub fn classify(task: &str) -> Option<Self> {
        let lower = task.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["add", "create", "new "]) {
            Some(Self::AddEvent)
        } else if has(&["next", "upcoming", "meeting"]) {
            Some(Self::NextEvent)
        } else if has(&["today", "schedule", "calendar", "agenda"]) {
            Some(Self::TodaySchedule)
        } else {
            None
        }
    }
}

/// Specialist agent for schedule lookups and event creation
///
/// Backed by an in-memory calendar seeded with two entries for today.
pub struct CalendarAgent {
    reporter: AgentReporter,
    entries: Mutex<Vec<CalendarEntry>>,
}

impl CalendarAgent {
    pub fn new(bus: CommandBus) -> Self {
        let today = Local::now().date_naive();
        let seed = [
            ("1", "Team Standup", 9, 0, 30, "meeting"),
            ("2", "Code Review", 14, 30, 60, "work"),
        ];

        let entries = seed
            .iter()
            .filter_map(|(id, title, hour, minute, duration, kind)| {
                let time = NaiveTime::from_hms_opt(*hour, *minute, 0)?;
                let start = Local.from_local_datetime(&today.and_time(time)).single()?;
                Some(CalendarEntry {
                    id: id.to_string(),
                    title: title.to_string(),
                    start,
                    duration_minutes: *duration,
                    entry_type: kind.to_string(),
                })
            })
            .collect();

        Self {
            reporter: AgentReporter::new(CALENDAR_AGENT, bus),
            entries: Mutex::new(entries),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    fn snapshot(&self) -> AgentRunResult<Vec<CalendarEntry>> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .map_err(|_| AgentError::TaskExecutionFailed("calendar store poisoned".to_string()))
    }

    fn today_schedule(&self) -> AgentRunResult<AgentOutput> {
        self.reporter.notify_progress("Fetching today's schedule...", None);

        let today = Local::now().date_naive();
        let mut todays: Vec<CalendarEntry> = self
            .snapshot()?
            .into_iter()
            .filter(|entry| entry.start.date_naive() == today)
            .collect();
        todays.sort_by_key(|entry| entry.start);

        let response = if todays.is_empty() {
            "You have no events scheduled for today.".to_string()
        } else {
            let lines: Vec<String> = todays
                .iter()
                .map(|entry| format!("• {}: {}", entry.start.format("%I:%M %p"), entry.title))
                .collect();
            format!("Your schedule for today:\n{}", lines.join("\n"))
        };

        self.reporter.card(
            "daily_schedule",
            json!({ "date": today.to_string(), "events": todays, "count": todays.len() }),
        );

        let mut output = AgentOutput::new();
        output.insert("success".to_string(), json!(true));
        output.insert("events".to_string(), serde_json::to_value(&todays)?);
        output.insert("formatted_response".to_string(), json!(response));
        Ok(output)
    }

    fn next_event(&self) -> AgentRunResult<AgentOutput> {
        self.reporter.notify_progress("Finding next event...", None);

        let now = Local::now();
        let next = self
            .snapshot()?
            .into_iter()
            .filter(|entry| entry.start > now)
            .min_by_key(|entry| entry.start);

        let response = match &next {
            Some(entry) => format!(
                "Your next event is '{}' at {}.",
                entry.title,
                entry.start.format("%I:%M %p on %A")
            ),
            None => "No upcoming events found.".to_string(),
        };

        let mut output = AgentOutput::new();
        output.insert("success".to_string(), json!(true));
        output.insert("next_event".to_string(), serde_json::to_value(&next)?);
        output.insert("formatted_response".to_string(), json!(response));
        Ok(output)
    }

    fn add_event(&self) -> AgentRunResult<AgentOutput> {
        self.reporter.notify_progress("Adding event...", None);

        let entry = {
            let mut entries = self.entries.lock().map_err(|_| {
                AgentError::TaskExecutionFailed("calendar store poisoned".to_string())
            })?;
            let entry = CalendarEntry {
                id: (entries.len() + 1).to_string(),
                title: "New Event".to_string(),
                start: Local::now() + Duration::hours(1),
                duration_minutes: 60,
                entry_type: "user_created".to_string(),
            };
            entries.push(entry.clone());
            entry
        };

        let response = format!("Added event '{}' to your calendar.", entry.title);
        self.reporter
            .card("calendar_event_created", serde_json::to_value(&entry)?);

        let mut output = AgentOutput::new();
        output.insert("success".to_string(), json!(true));
        output.insert("event".to_string(), serde_json::to_value(&entry)?);
        output.insert("formatted_response".to_string(), json!(response));
        Ok(output)
    }
}

#[async_trait]
impl Agent for CalendarAgent {
    fn name(&self) -> &str {
        CALENDAR_AGENT
    }

    fn description(&self) -> &str {
        "Agent for calendar management and scheduling tasks"
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            name: self.name().to_string(),
            description: self.description().to_string(),
            role: AgentRole::Specialist,
            functions: vec![
                "get_today_schedule".to_string(),
                "get_next_event".to_string(),
                "add_event".to_string(),
            ],
            supported_queries: vec![
                "today's schedule".to_string(),
                "next meeting".to_string(),
                "add event".to_string(),
            ],
        }
    }

    async fn run(&self, task: &str, _context: Option<&AgentContext>) -> AgentRunResult<AgentOutput> {
        let preview: String = task.chars().take(50).collect();
        self.reporter
            .notify_start(&format!("Calendar task: {}", preview));

        let result = match CalendarRequest::classify(task) {
            Some(CalendarRequest::AddEvent) => self.add_event(),
            Some(CalendarRequest::NextEvent) => self.next_event(),
            Some(CalendarRequest::TodaySchedule) => self.today_schedule(),
            None => Ok(error_output(&format!("Unknown calendar task: {}", task))),
        };

        match &result {
            Ok(output) => match output.get("error").and_then(|e| e.as_str()) {
                Some(error) => {
                    self.reporter.notify_error(error);
                }
                None => {
                    self.reporter
                        .notify_complete(json!({ "task": task }));
                }
            },
            Err(e) => {
                self.reporter.notify_error(&e.to_string());
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusConfig;

    #[test]
    fn test_classify_requests() {
        assert_eq!(
            CalendarRequest::classify("Schedule a new meeting or appointment"),
            Some(CalendarRequest::AddEvent)
        );
        assert_eq!(
            CalendarRequest::classify("Check my schedule and calendar"),
            Some(CalendarRequest::TodaySchedule)
        );
        assert_eq!(
            CalendarRequest::classify("When is my next meeting?"),
            Some(CalendarRequest::NextEvent)
        );
        assert_eq!(CalendarRequest::classify("Calendar task: dance"), Some(CalendarRequest::TodaySchedule));
        assert_eq!(CalendarRequest::classify("sing a song"), None);
    }

    #[tokio::test]
    async fn test_add_event() {
        let agent = CalendarAgent::new(CommandBus::start(BusConfig::default()));
        let before = agent.entry_count();

        let output = agent
            .run("Schedule a new meeting or appointment", None)
            .await
            .unwrap();

        assert_eq!(agent.entry_count(), before + 1);
        assert_eq!(
            output["formatted_response"],
            "Added event 'New Event' to your calendar."
        );
    }

    #[tokio::test]
    async fn test_next_event_after_add() {
        let agent = CalendarAgent::new(CommandBus::start(BusConfig::default()));
        agent.run("create an event", None).await.unwrap();

        let output = agent.run("what is next", None).await.unwrap();
        assert_eq!(output["success"], true);
        assert!(output["next_event"].is_object());
    }

    #[tokio::test]
    async fn test_today_schedule_lists_seed_entries() {
        let agent = CalendarAgent::new(CommandBus::start(BusConfig::default()));

        let output = agent.run("Check my schedule", None).await.unwrap();
        let text = output["formatted_response"].as_str().unwrap();
        assert!(text.contains("Team Standup"));
        assert!(text.contains("Code Review"));
    }

    #[tokio::test]
    async fn test_unknown_task_reports_error() {
        let agent = CalendarAgent::new(CommandBus::start(BusConfig::default()));

        let output = agent.run("sing a song", None).await.unwrap();
        assert_eq!(output["error"], "Unknown calendar task: sing a song");
    }
}
