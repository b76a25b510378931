//! Server configuration from the environment.
//!
//! Variables (a `.env` file is read first by the binary):
//!
//! | Variable                | Default    |
//! |-------------------------|------------|
//! | `INFLUX_PORT`           | `3000`     |
//! | `INFLUX_MAX_BODY_BYTES` | 50 MiB     |
//! | `INFLUX_CACHE_CAPACITY` | `64`       |
//! | `INFLUX_MAX_SESSIONS`   | `32`       |
//!
//! Unparsable values fall back to the default with a warning.

use serde::Serialize;
use std::str::FromStr;

use crate::api::logs::log_warning;
use crate::cache::DEFAULT_CAPACITY;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_MAX_SESSIONS: usize = 32;

pub const ENV_PORT: &str = "INFLUX_PORT";
pub const ENV_MAX_BODY_BYTES: &str = "INFLUX_MAX_BODY_BYTES";
pub const ENV_CACHE_CAPACITY: &str = "INFLUX_CACHE_CAPACITY";
pub const ENV_MAX_SESSIONS: &str = "INFLUX_MAX_SESSIONS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub port: u16,
    /// Largest accepted upload.
    pub max_body_bytes: usize,
    /// Selections cached per session.
    pub cache_capacity: usize,
    /// Datasets held at once; the oldest upload is evicted past this.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cache_capacity: DEFAULT_CAPACITY,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ServerConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: parse_var(&lookup, ENV_PORT, defaults.port),
            max_body_bytes: parse_var(&lookup, ENV_MAX_BODY_BYTES, defaults.max_body_bytes),
            cache_capacity: parse_var(&lookup, ENV_CACHE_CAPACITY, defaults.cache_capacity),
            max_sessions: parse_var(&lookup, ENV_MAX_SESSIONS, defaults.max_sessions).max(1),
        }
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log_warning(format!("{}='{}' is invalid, using {}", key, raw, default));
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(ServerConfig::from_lookup(lookup(&[])), ServerConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_PORT, "8080"),
            (ENV_MAX_BODY_BYTES, "1024"),
            (ENV_CACHE_CAPACITY, " 8 "),
            (ENV_MAX_SESSIONS, "4"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_body_bytes, 1024);
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.max_sessions, 4);
    }

    #[test]
    fn test_max_sessions_at_least_one() {
        let config = ServerConfig::from_lookup(lookup(&[(ENV_MAX_SESSIONS, "0")]));
        assert_eq!(config.max_sessions, 1);
    }

    #[test]
    fn test_invalid_value_falls_back() {
        let config = ServerConfig::from_lookup(lookup(&[(ENV_PORT, "eighty")]));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_cli_port_wins() {
        let config = ServerConfig::from_lookup(lookup(&[(ENV_PORT, "8080")])).with_port(Some(9000));
        assert_eq!(config.port, 9000);
        assert_eq!(ServerConfig::default().with_port(None).port, DEFAULT_PORT);
    }
}
