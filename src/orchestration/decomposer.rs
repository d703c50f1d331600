use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::errors::{WorkflowError, WorkflowResult};
use crate::agents::{
    AgentTask, CALENDAR_AGENT, CURRENT_WEATHER_INSTRUCTION, PLANNER_AGENT, WEATHER_AGENT,
};

const WEATHER_KEYWORDS: [&str; 4] = ["weather", "temperature", "forecast", "climate"];
const CALENDAR_KEYWORDS: [&str; 5] = ["calendar", "schedule", "meeting", "appointment", "event"];
const GENERAL_KEYWORDS: [&str; 6] = ["plan", "help", "tell", "joke", "story", "advice"];

/// Substrings marking a request with several parts
const STRUCTURAL_DELIMITERS: [&str; 7] = ["-", ",", ";", " and ", " also ", " plus ", " then "];

static PART_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[-,;]|\s+and\s+|\s+also\s+|\s+plus\s+|\s+then\s+")
        .expect("part split pattern is valid")
});

static LOCATION_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[,;]|\s+and\s+|\s+or\s+").expect("location split pattern is valid")
});

static QUERY_FILLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:what's|weather|temperature|forecast|climate|check|in|for|at)\b")
        .expect("filler pattern is valid")
});

static LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:the|a|an)\s+").expect("article pattern is valid"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static LOCATION_AFTER_PREPOSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in|for|at|from)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)")
        .expect("location pattern is valid")
});

/// Keyword bucket a fragment of a request falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Weather,
    Calendar,
    General,
}

impl Bucket {
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Bucket::Weather => &WEATHER_KEYWORDS,
            Bucket::Calendar => &CALENDAR_KEYWORDS,
            Bucket::General => &GENERAL_KEYWORDS,
        }
    }

    fn matches(&self, lower: &str) -> bool {
        self.keywords().iter().any(|keyword| lower.contains(keyword))
    }

    /// Agent that handles fragments of this bucket
    pub fn agent_name(&self) -> &'static str {
        match self {
            Bucket::Weather => WEATHER_AGENT,
            Bucket::Calendar => CALENDAR_AGENT,
            Bucket::General => PLANNER_AGENT,
        }
    }

    /// Routing bucket of a fragment; anything unmatched is general
    pub fn classify(fragment: &str) -> Self {
        let lower = fragment.to_lowercase();
        if Bucket::Weather.matches(&lower) {
            Bucket::Weather
        } else if Bucket::Calendar.matches(&lower) {
            Bucket::Calendar
        } else {
            Bucket::General
        }
    }

    /// Every bucket whose keywords appear in the text
    pub fn detect(text: &str) -> Vec<Self> {
        let lower = text.to_lowercase();
        [Bucket::Weather, Bucket::Calendar, Bucket::General]
            .into_iter()
            .filter(|bucket| bucket.matches(&lower))
            .collect()
    }
}

/// Sub-tasks per agent, in the order agents were first assigned work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPlan {
    entries: Vec<(String, Vec<String>)>,
}

impl TaskPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, agent_name: &str, sub_task: impl Into<String>) {
        let sub_task = sub_task.into();
        match self.entries.iter_mut().find(|(name, _)| name == agent_name) {
            Some((_, tasks)) => tasks.push(sub_task),
            None => self.entries.push((agent_name.to_string(), vec![sub_task])),
        }
    }

    pub fn get(&self, agent_name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == agent_name)
            .map(|(_, tasks)| tasks.as_slice())
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn agent_count(&self) -> usize {
        self.entries.len()
    }

    pub fn task_count(&self) -> usize {
        self.entries.iter().map(|(_, tasks)| tasks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    /// Flatten into dispatchable tasks, agent by agent, sub-tasks in order
    pub fn tasks(&self) -> Vec<AgentTask> {
        self.entries
            .iter()
            .flat_map(|(name, tasks)| tasks.iter().map(move |task| AgentTask::new(name, task)))
            .collect()
    }
}

impl Serialize for TaskPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, tasks) in &self.entries {
            map.serialize_entry(name, tasks)?;
        }
        map.end()
    }
}

/// Splits free-text requests into per-agent sub-tasks
///
/// Purely lexical: delimiter splitting plus keyword tables, with light
/// pattern extraction to turn weather and calendar fragments into
/// canonical instructions.
#[derive(Debug, Clone)]
pub struct TaskDecomposer {
    /// Fragments this short or shorter are dropped as noise
    pub min_fragment_len: usize,
}

impl Default for TaskDecomposer {
    fn default() -> Self {
        Self { min_fragment_len: 3 }
    }
}

impl TaskDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a raw request to the sub-tasks each agent should run
    ///
    /// Always yields at least one sub-task for a non-blank request.
    pub fn decompose(&self, task: &str) -> WorkflowResult<TaskPlan> {
        let task = task.trim();
        if task.is_empty() {
            return Err(WorkflowError::EmptyTask);
        }

        if is_multi_location_weather_query(task) {
            let locations = extract_locations(task);
            if !locations.is_empty() {
                let mut plan = TaskPlan::new();
                for location in locations {
                    plan.push(WEATHER_AGENT, weather_instruction(&location));
                }
                return Ok(plan);
            }
        }

        let mut plan = TaskPlan::new();
        for part in self.split_parts(task) {
            match Bucket::classify(&part) {
                Bucket::Weather => plan.push(WEATHER_AGENT, weather_task(&part, task)),
                Bucket::Calendar => plan.push(CALENDAR_AGENT, calendar_task(&part)),
                Bucket::General => plan.push(PLANNER_AGENT, part),
            }
        }

        if plan.is_empty() {
            plan.push(PLANNER_AGENT, task);
        }

        Ok(plan)
    }

    /// Whether a request should fan out to several agents
    pub fn should_parallelize(&self, task: &str) -> bool {
        let lower = task.to_lowercase();
        let has_multiple_parts = STRUCTURAL_DELIMITERS
            .iter()
            .any(|delimiter| lower.contains(delimiter));

        has_multiple_parts || Bucket::detect(task).len() > 1
    }

    /// Best single agent for a whole request
    pub fn route_task(task: &str) -> &'static str {
        Bucket::classify(task).agent_name()
    }

    fn split_parts(&self, task: &str) -> Vec<String> {
        PART_SPLIT
            .split(task)
            .map(str::trim)
            .filter(|part| part.chars().count() > self.min_fragment_len)
            .map(str::to_string)
            .collect()
    }
}

fn weather_instruction(location: &str) -> String {
    format!("Get weather information for {}", location)
}

/// A weather request listing several places, with nothing else asked.
fn is_multi_location_weather_query(task: &str) -> bool {
    if Bucket::detect(task) != [Bucket::Weather] {
        return false;
    }

    let lower = task.to_lowercase();

    task.contains(',') && (lower.contains(" and ") || lower.contains(" or "))
}

/// Capitalized place names of a multi-location weather query, in order
fn extract_locations(task: &str) -> Vec<String> {
    let cleaned = QUERY_FILLER.replace_all(task, " ");

    LOCATION_SPLIT
        .split(&cleaned)
        .filter_map(|part| {
            let candidate = part.trim().trim_end_matches('?').trim();
            if candidate.chars().count() <= 1 {
                return None;
            }
            let candidate = LEADING_ARTICLE.replace(candidate, "");
            let candidate = WHITESPACE.replace_all(candidate.trim(), " ").to_string();
            candidate
                .chars()
                .next()
                .filter(|c| c.is_uppercase())
                .map(|_| candidate.clone())
        })
        .collect()
}

fn weather_task(part: &str, full_task: &str) -> String {
    let location = LOCATION_AFTER_PREPOSITION
        .captures(part)
        .or_else(|| LOCATION_AFTER_PREPOSITION.captures(full_task))
        .map(|captures| captures[1].to_string());

    match location {
        Some(location) => weather_instruction(&location),
        None => CURRENT_WEATHER_INSTRUCTION.to_string(),
    }
}

fn calendar_task(part: &str) -> String {
    let lower = part.to_lowercase();
    let part = part.trim();

    if lower.contains("schedule") && (lower.contains("meeting") || lower.contains("appointment")) {
        "Schedule a new meeting or appointment".to_string()
    } else if lower.contains("schedule") {
        "Check my schedule and calendar".to_string()
    } else if lower.contains("meeting") {
        format!("Handle meeting-related request: {}", part)
    } else {
        format!("Calendar task: {}", part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_city_weather() {
        let plan = TaskDecomposer::new()
            .decompose("Check weather in Tokyo, London, and Paris")
            .unwrap();

        assert_eq!(plan.agent_count(), 1);
        assert_eq!(
            plan.get(WEATHER_AGENT).unwrap(),
            &[
                "Get weather information for Tokyo".to_string(),
                "Get weather information for London".to_string(),
                "Get weather information for Paris".to_string(),
            ]
        );
    }

    #[test]
    fn test_three_domain_request() {
        let plan = TaskDecomposer::new()
            .decompose("Check weather in Seattle - schedule a meeting at 2pm - tell me a joke")
            .unwrap();

        assert_eq!(plan.agent_count(), 3);
        assert_eq!(
            plan.get(WEATHER_AGENT).unwrap(),
            &["Get weather information for Seattle".to_string()]
        );
        assert_eq!(
            plan.get(CALENDAR_AGENT).unwrap(),
            &["Schedule a new meeting or appointment".to_string()]
        );
        assert_eq!(plan.get(PLANNER_AGENT).unwrap(), &["tell me a joke".to_string()]);

        let agents: Vec<&str> = plan.agents().collect();
        assert_eq!(agents, vec![WEATHER_AGENT, CALENDAR_AGENT, PLANNER_AGENT]);
    }

    #[test]
    fn test_unmatched_request_goes_to_planner() {
        let plan = TaskDecomposer::new().decompose("Say hi").unwrap();
        assert_eq!(plan.get(PLANNER_AGENT).unwrap(), &["Say hi".to_string()]);
    }

    #[test]
    fn test_noise_fragments_fall_back_to_whole_task() {
        // Every fragment is too short to keep.
        let plan = TaskDecomposer::new().decompose("a, b; c - d").unwrap();
        assert_eq!(plan.task_count(), 1);
        assert_eq!(plan.get(PLANNER_AGENT).unwrap(), &["a, b; c - d".to_string()]);
    }

    #[test]
    fn test_blank_task_is_rejected() {
        let result = TaskDecomposer::new().decompose("   ");
        assert!(matches!(result, Err(WorkflowError::EmptyTask)));
    }

    #[test]
    fn test_calendar_normalization() {
        assert_eq!(calendar_task("check my schedule"), "Check my schedule and calendar");
        assert_eq!(
            calendar_task("move the meeting"),
            "Handle meeting-related request: move the meeting"
        );
        assert_eq!(calendar_task("book an appointment"), "Calendar task: book an appointment");
    }

    #[test]
    fn test_weather_location_prefers_fragment() {
        let full = "forecast for Oslo; weather in Rome";
        assert_eq!(weather_task("forecast for Oslo", full), "Get weather information for Oslo");
        assert_eq!(weather_task("weather in Rome", full), "Get weather information for Rome");
        assert_eq!(weather_task("weather please", "weather please"), "Get current weather information");
    }

    #[test]
    fn test_multi_location_requires_weather_only() {
        let plan = TaskDecomposer::new()
            .decompose("Weather in Rome, and schedule a meeting")
            .unwrap();
        assert!(plan.get(CALENDAR_AGENT).is_some());
        assert!(plan.get(WEATHER_AGENT).is_some());
    }

    #[test]
    fn test_multi_location_keeps_general_parts() {
        let plan = TaskDecomposer::new()
            .decompose("weather in Tokyo, London and tell me a joke")
            .unwrap();

        assert!(plan
            .get(PLANNER_AGENT)
            .unwrap()
            .contains(&"tell me a joke".to_string()));
        assert_eq!(
            plan.get(WEATHER_AGENT).unwrap(),
            &["Get weather information for Tokyo".to_string()]
        );
    }

    #[test]
    fn test_should_parallelize() {
        let decomposer = TaskDecomposer::new();

        assert!(decomposer.should_parallelize("Check weather in Tokyo, London, and Paris"));
        assert!(decomposer.should_parallelize("weather today then my calendar"));
        assert!(decomposer.should_parallelize("tell me the weather"));
        assert!(!decomposer.should_parallelize("What's the weather in Seattle?"));
        assert!(!decomposer.should_parallelize("Check my schedule"));
    }

    #[test]
    fn test_route_task() {
        assert_eq!(TaskDecomposer::route_task("Is it raining? weather please"), WEATHER_AGENT);
        assert_eq!(TaskDecomposer::route_task("book an appointment"), CALENDAR_AGENT);
        assert_eq!(TaskDecomposer::route_task("tell me a story"), PLANNER_AGENT);
    }

    #[test]
    fn test_plan_serializes_in_order() {
        let mut plan = TaskPlan::new();
        plan.push(CALENDAR_AGENT, "Check my schedule and calendar");
        plan.push(WEATHER_AGENT, "Get current weather information");

        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.find(CALENDAR_AGENT).unwrap() < json.find(WEATHER_AGENT).unwrap());
        assert_eq!(plan.tasks()[1].agent_name, WEATHER_AGENT);
    }
}
