//! Ledger configuration.

use crate::constants::{DEFAULT_DIFFICULTY, DEFAULT_MINING_TIMEOUT_MS};
use crate::mine::MiningBudget;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Difficulty used when a caller does not supply one.
    #[serde(default = "default_difficulty")]
    pub default_difficulty: u32,
    #[serde(default)]
    pub max_attempts: Option<u64>,
    /// Wall-clock cap per search; `0` disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_difficulty: default_difficulty(),
            max_attempts: None,
            timeout_ms: default_timeout_ms(),
            threads: default_threads(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn budget(&self) -> MiningBudget {
        MiningBudget {
            max_attempts: self.max_attempts,
            timeout: self
                .timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_timeout_ms() -> Option<u64> {
    Some(DEFAULT_MINING_TIMEOUT_MS)
}

fn default_threads() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.default_difficulty, 4);
        assert_eq!(config.budget().timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.budget().max_attempts, None);
    }

    #[test]
    fn toml_overrides() {
        let config = LedgerConfig::from_toml_str(
            r#"
            default_difficulty = 2
            max_attempts = 1000000
            timeout_ms = 500
            threads = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.default_difficulty, 2);
        assert_eq!(config.threads, 4);
        assert_eq!(
            config.budget(),
            MiningBudget {
                max_attempts: Some(1_000_000),
                timeout: Some(Duration::from_millis(500)),
            }
        );
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = LedgerConfig::from_toml_str("timeout_ms = 0").unwrap();
        assert_eq!(config.budget(), MiningBudget::unbounded());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(LedgerConfig::from_toml_str("threads = \"many\"").is_err());
    }
}
