use std::time::Duration;

use thiserror::Error;

use crate::push::DEFAULT_RING_SIZE;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 2469;
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
    /// How long a system command caller waits for output.
    pub result_timeout: Duration,
    /// When a runaway system command is killed.
    pub watchdog_timeout: Duration,
    pub ring_size: usize,
    pub log_http: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            token: None,
            result_timeout: DEFAULT_RESULT_TIMEOUT,
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            ring_size: DEFAULT_RING_SIZE,
            log_http: true,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `MGMT_AGENT_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("MGMT_AGENT_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("MGMT_AGENT_PORT") {
            config.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "MGMT_AGENT_PORT",
                expected: "a port number",
                value: port.clone(),
            })?;
        }
        if let Some(token) = lookup("MGMT_AGENT_TOKEN") {
            if !token.is_empty() {
                config.token = Some(token);
            }
        }
        if let Some(value) = lookup("MGMT_AGENT_RESULT_TIMEOUT_MS") {
            config.result_timeout = parse_millis("MGMT_AGENT_RESULT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("MGMT_AGENT_WATCHDOG_TIMEOUT_MS") {
            config.watchdog_timeout = parse_millis("MGMT_AGENT_WATCHDOG_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("MGMT_AGENT_LOG_HTTP") {
            config.log_http = !(value == "0" || value.eq_ignore_ascii_case("false"));
        }
        Ok(config)
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Invalid {
            key,
            expected: "a number of milliseconds",
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 2469);
        assert_eq!(config.result_timeout, Duration::from_secs(20));
        assert_eq!(config.watchdog_timeout, Duration::from_secs(30));
        assert_eq!(config.ring_size, 1024);
        assert!(config.log_http);
        assert!(config.token.is_none());
    }

    #[test]
    fn environment_overrides_apply() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("MGMT_AGENT_PORT", "9000"),
            ("MGMT_AGENT_TOKEN", "secret"),
            ("MGMT_AGENT_RESULT_TIMEOUT_MS", "1500"),
            ("MGMT_AGENT_LOG_HTTP", "0"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.result_timeout, Duration::from_millis(1500));
        assert!(!config.log_http);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = AgentConfig::from_lookup(lookup(&[("MGMT_AGENT_WATCHDOG_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "MGMT_AGENT_WATCHDOG_TIMEOUT_MS",
                ..
            }
        ));
    }
}
