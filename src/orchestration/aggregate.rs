use std::collections::BTreeSet;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::errors::{WorkflowError, WorkflowResult};
use crate::agents::{AgentResult, FailedAgent};

const SUMMARY_PREFIX: &str = "Here's everything you requested: ";
const EMPTY_SUMMARY: &str =
    "I've processed your request across multiple agents, though some may not have returned detailed responses.";

/// Results grouped per agent; agents in first-dispatch order, results in
/// dispatch order within each agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResultMap {
    entries: Vec<(String, Vec<AgentResult>)>,
}

impl AgentResultMap {
    fn push(&mut self, result: AgentResult) {
        match self
            .entries
            .iter_mut()
            .find(|(name, _)| *name == result.agent_name)
        {
            Some((_, results)) => results.push(result),
            None => self.entries.push((result.agent_name.clone(), vec![result])),
        }
    }

    pub fn get(&self, agent_name: &str) -> Option<&[AgentResult]> {
        self.entries
            .iter()
            .find(|(name, _)| name == agent_name)
            .map(|(_, results)| results.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AgentResult])> {
        self.entries
            .iter()
            .map(|(name, results)| (name.as_str(), results.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AgentResultMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, results) in &self.entries {
            map.serialize_entry(name, results)?;
        }
        map.end()
    }
}

/// Outcome of one fan-out, built once and never modified
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedResult {
    pub per_agent_results: AgentResultMap,
    pub succeeded_agents: BTreeSet<String>,
    pub failed_agents: Vec<FailedAgent>,
    pub total_dispatched: usize,
    pub success_rate: f64,
}

impl CombinedResult {
    /// Aggregate branch results given in dispatch order
    pub fn from_results(results: Vec<AgentResult>) -> WorkflowResult<Self> {
        if results.is_empty() {
            return Err(WorkflowError::AggregationFailed(
                "no sub-task results to combine".to_string(),
            ));
        }

        let total_dispatched = results.len();
        let mut per_agent_results = AgentResultMap::default();
        let mut succeeded_agents = BTreeSet::new();
        let mut failed_agents = Vec::new();
        let mut succeeded = 0usize;

        for result in results {
            match result.error() {
                None => {
                    succeeded += 1;
                    succeeded_agents.insert(result.agent_name.clone());
                }
                Some(error) => failed_agents.push(FailedAgent {
                    agent_name: result.agent_name.clone(),
                    sub_task: result.sub_task.clone(),
                    error: error.to_string(),
                }),
            }
            per_agent_results.push(result);
        }

        Ok(Self {
            per_agent_results,
            succeeded_agents,
            failed_agents,
            total_dispatched,
            success_rate: succeeded as f64 / total_dispatched as f64,
        })
    }

    pub fn results_for(&self, agent_name: &str) -> Option<&[AgentResult]> {
        self.per_agent_results.get(agent_name)
    }

    /// One natural-language answer built from every successful result's text
    pub fn summary(&self) -> String {
        let responses: Vec<String> = self
            .per_agent_results
            .iter()
            .flat_map(|(agent, results)| {
                results
                    .iter()
                    .filter_map(move |result| result.response_text().map(|text| format!("{}: {}", agent, text)))
            })
            .collect();

        if responses.is_empty() {
            EMPTY_SUMMARY.to_string()
        } else {
            format!("{}{}", SUMMARY_PREFIX, responses.join(" | "))
        }
    }
}

/// Split text into word-level chunks that concatenate back to the
/// whitespace-normalised text
pub fn word_chunks(text: &str) -> Vec<String> {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| if i == 0 { word.to_string() } else { format!(" {}", word) })
        .collect()
}
