//! Environment configuration
//!
//! Every setting has a default; a missing variable falls back to it, a
//! malformed one is an error.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::bus::BusConfig;
use crate::orchestration::{Topology, WorkflowConfig};
use crate::streaming::DispatcherConfig;

pub const BIND_ADDR_VAR: &str = "CHORUS_BIND_ADDR";
pub const SUBSCRIBER_CAPACITY_VAR: &str = "CHORUS_SUBSCRIBER_CAPACITY";
pub const TOPOLOGY_VAR: &str = "CHORUS_TOPOLOGY";
pub const AGENT_TIMEOUT_VAR: &str = "CHORUS_AGENT_TIMEOUT_SECS";
pub const TOKEN_PAUSE_VAR: &str = "CHORUS_TOKEN_PAUSE_MS";
pub const CHUNK_THRESHOLD_VAR: &str = "CHORUS_CHUNK_THRESHOLD";
pub const BATCH_WINDOW_VAR: &str = "CHORUS_BATCH_WINDOW_MS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub bus: BusConfig,
    pub workflow: WorkflowConfig,
    pub dispatcher: DispatcherConfig,
    /// Debounce window for speech batching; `None` disables batching
    pub batch_window: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            bus: BusConfig::default(),
            workflow: WorkflowConfig::default(),
            dispatcher: DispatcherConfig::default(),
            batch_window: None,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> ConfigResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup(BIND_ADDR_VAR) {
            Some(value) => parse_value(BIND_ADDR_VAR, &value)?,
            None => {
                tracing::warn!("{} not set, using {}", BIND_ADDR_VAR, DEFAULT_BIND_ADDR);
                defaults.bind_addr
            }
        };

        let subscriber_capacity: usize =
            optional(&lookup, SUBSCRIBER_CAPACITY_VAR)?.unwrap_or(defaults.bus.subscriber_capacity);
        if subscriber_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: SUBSCRIBER_CAPACITY_VAR,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let topology: Topology = optional(&lookup, TOPOLOGY_VAR)?.unwrap_or(defaults.workflow.topology);

        let agent_timeout = match optional::<u64, _>(&lookup, AGENT_TIMEOUT_VAR)? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.workflow.agent_timeout,
        };

        let token_pause = optional::<u64, _>(&lookup, TOKEN_PAUSE_VAR)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.workflow.token_pause);

        let flush_threshold =
            optional(&lookup, CHUNK_THRESHOLD_VAR)?.unwrap_or(defaults.dispatcher.flush_threshold);

        let batch_window = optional::<u64, _>(&lookup, BATCH_WINDOW_VAR)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            bind_addr,
            bus: BusConfig { subscriber_capacity },
            workflow: WorkflowConfig {
                topology,
                agent_timeout,
                token_pause,
            },
            dispatcher: DispatcherConfig { flush_threshold },
            batch_window,
        })
    }
}

fn optional<T, F>(lookup: &F, name: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .map(|value| parse_value(name, &value))
        .transpose()
}

fn parse_value<T>(name: &'static str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ConfigResult<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.bus.subscriber_capacity, 256);
        assert_eq!(config.workflow.topology, Topology::Delegate);
        assert_eq!(config.workflow.agent_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.workflow.token_pause, Duration::from_millis(30));
        assert_eq!(config.dispatcher.flush_threshold, 100);
        assert!(config.batch_window.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            (BIND_ADDR_VAR, "127.0.0.1:8080"),
            (TOPOLOGY_VAR, "chain"),
            (AGENT_TIMEOUT_VAR, "0"),
            (CHUNK_THRESHOLD_VAR, "40"),
            (BATCH_WINDOW_VAR, "250"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.workflow.topology, Topology::Chain);
        assert_eq!(config.workflow.agent_timeout, None);
        assert_eq!(config.dispatcher.flush_threshold, 40);
        assert_eq!(config.batch_window, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_malformed_values() {
        let err = load(&[(SUBSCRIBER_CAPACITY_VAR, "lots")]).unwrap_err();
        assert!(err.to_string().contains(SUBSCRIBER_CAPACITY_VAR));

        assert!(load(&[(SUBSCRIBER_CAPACITY_VAR, "0")]).is_err());
        assert!(load(&[(TOPOLOGY_VAR, "mesh")]).is_err());
        assert!(load(&[(BIND_ADDR_VAR, "not an address")]).is_err());
    }
}
