//! Tracker configuration.

use serde::Deserialize;

use crate::source::SourceOptions;
use crate::{Result, TrackerError};

/// Configuration for the tracking engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Fixes with a larger accuracy radius are discarded.
    /// Default: 100.0 meters
    pub max_accuracy_m: f64,

    /// Fixes closer than this to the last accepted point are treated as jitter.
    /// Default: 0.003 km (3 meters)
    pub min_movement_km: f64,

    /// Period of the elapsed-time clock refresh.
    /// Default: 1000 ms
    pub clock_tick_ms: u64,

    /// Period of the crash snapshot while tracking.
    /// Default: 30 000 ms
    pub backup_interval_ms: u64,

    /// Snapshots older than this are discarded at startup.
    /// Default: 24 hours
    pub backup_max_age_ms: i64,

    /// Rounds of the save-or-discard prompt before the route is parked in
    /// the backup slot instead.
    /// Default: 3
    pub max_save_prompts: u32,

    /// Options passed to the position source on every subscription.
    pub source: SourceOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 100.0,
            min_movement_km: 0.003,
            clock_tick_ms: 1_000,
            backup_interval_ms: 30_000,
            backup_max_age_ms: 24 * 60 * 60 * 1000,
            max_save_prompts: 3,
            source: SourceOptions::default(),
        }
    }
}

impl TrackerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let problem = if !(self.max_accuracy_m > 0.0) {
            Some("max_accuracy_m must be positive")
        } else if !(self.min_movement_km >= 0.0) {
            Some("min_movement_km must not be negative")
        } else if self.clock_tick_ms == 0 {
            Some("clock_tick_ms must be non-zero")
        } else if self.backup_interval_ms == 0 {
            Some("backup_interval_ms must be non-zero")
        } else if self.backup_max_age_ms <= 0 {
            Some("backup_max_age_ms must be positive")
        } else if self.max_save_prompts == 0 {
            Some("max_save_prompts must be at least 1")
        } else {
            None
        };

        match problem {
            Some(message) => Err(TrackerError::Config {
                message: message.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_accuracy_m, 100.0);
        assert_eq!(config.min_movement_km, 0.003);
        assert_eq!(config.backup_interval_ms, 30_000);
        assert_eq!(config.backup_max_age_ms, 86_400_000);
        assert!(config.source.high_accuracy);
        assert_eq!(config.source.max_fix_age_ms, 0);
        assert_eq!(config.source.timeout_ms, 15_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            TrackerConfig::from_json(r#"{"backup_interval_ms": 10000, "source": {"timeout_ms": 5000}}"#)
                .unwrap();
        assert_eq!(config.backup_interval_ms, 10_000);
        assert_eq!(config.source.timeout_ms, 5_000);
        assert!(config.source.high_accuracy);
        assert_eq!(config.max_accuracy_m, 100.0);
    }

    #[test]
    fn test_from_json_rejects_zero_interval() {
        let result = TrackerConfig::from_json(r#"{"backup_interval_ms": 0}"#);
        assert!(matches!(result, Err(TrackerError::Config { .. })));
    }
}
