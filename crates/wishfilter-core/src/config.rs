//! Runtime configuration for linking and the registry.
//!
//! Defaults come from environment variables so a binary can be tuned
//! without a config file; every field can also be deserialised from JSON
//! with missing fields falling back to those defaults.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Read and parse an environment variable, falling back to `default` when
/// it is unset or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = %key, value = %raw, "ignoring unparsable environment value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Predicate evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Budget for a single predicate evaluation.
    pub predicate_timeout_ms: u64,
    /// Maximum number of evaluations in flight at once.
    pub max_in_flight: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            predicate_timeout_ms: env_or("WISHFILTER_PREDICATE_TIMEOUT_MS", 10_000),
            max_in_flight: env_or("WISHFILTER_MAX_IN_FLIGHT", 8),
        }
    }
}

impl LinkerConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.predicate_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn predicate_timeout(&self) -> Duration {
        Duration::from_millis(self.predicate_timeout_ms)
    }

    /// Never zero; a zero limit would stall every bulk operation.
    pub fn concurrency(&self) -> usize {
        self.max_in_flight.max(1)
    }
}

/// Registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub linker: LinkerConfig,
    /// Capacity of the visibility-change broadcast channel.
    pub change_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            linker: LinkerConfig::default(),
            change_buffer: env_or("WISHFILTER_CHANGE_BUFFER", 256),
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_linker(mut self, linker: LinkerConfig) -> Self {
        self.linker = linker;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_never_zero() {
        let config = LinkerConfig::default().with_max_in_flight(0);
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"linker": {"predicate_timeout_ms": 50}}"#).unwrap();
        assert_eq!(config.linker.predicate_timeout(), Duration::from_millis(50));
        assert!(config.linker.max_in_flight >= 1);
        assert!(config.change_buffer > 0);
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let value: u64 = env_or("WISHFILTER_TEST_SURELY_UNSET_KEY", 42);
        assert_eq!(value, 42);
    }
}
