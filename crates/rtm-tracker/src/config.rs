//! Tracker configuration.

use rtm_core::EntityClass;
use serde::{Deserialize, Serialize};

/// What to do with progress when a checkpoint arrives out of cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Re-anchor progress at the received checkpoint.
    #[default]
    Resync,
    /// Forget progress and wait for the cycle's first checkpoint.
    RestartCycle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Upper bound on tracked entities; least-recently-updated are evicted.
    #[serde(default = "default_max_tracked_entities")]
    pub max_tracked_entities: usize,
    /// Entities not updated for this long are evicted.
    #[serde(default = "default_entity_idle_timeout_secs")]
    pub entity_idle_timeout_secs: u64,
    /// Period of idle sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default)]
    pub gap_policy: GapPolicy,
    /// Key progress by round id. When false, progress is kept per table so
    /// the interval across consecutive rounds (e.g. finish to start) is measured.
    #[serde(default = "default_round_scoped")]
    pub round_scoped: bool,
    /// Entity classes whose cycles are registered.
    #[serde(default = "default_enabled_classes")]
    pub enabled_classes: Vec<EntityClass>,
}

fn default_max_tracked_entities() -> usize {
    10_000
}

fn default_entity_idle_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

fn default_round_scoped() -> bool {
    true
}

fn default_enabled_classes() -> Vec<EntityClass> {
    EntityClass::ALL.to_vec()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_tracked_entities: default_max_tracked_entities(),
            entity_idle_timeout_secs: default_entity_idle_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
            gap_policy: GapPolicy::default(),
            round_scoped: default_round_scoped(),
            enabled_classes: default_enabled_classes(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tracked_entities == 0 {
            return Err("max_tracked_entities must be > 0".to_string());
        }
        if self.entity_idle_timeout_secs == 0 {
            return Err("entity_idle_timeout_secs must be > 0".to_string());
        }
        if self.sweep_interval_ms == 0 {
            return Err("sweep_interval_ms must be > 0".to_string());
        }
        if self.enabled_classes.is_empty() {
            return Err("enabled_classes must not be empty".to_string());
        }
        Ok(())
    }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.entity_idle_timeout_secs.saturating_mul(1_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gap_policy, GapPolicy::Resync);
        assert!(config.round_scoped);
        assert_eq!(config.enabled_classes.len(), 4);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = TrackerConfig {
            max_tracked_entities: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"gap_policy":"restart_cycle","enabled_classes":["roulette"]}"#)
                .unwrap();
        assert_eq!(config.gap_policy, GapPolicy::RestartCycle);
        assert_eq!(config.enabled_classes, vec![EntityClass::Roulette]);
        assert_eq!(config.max_tracked_entities, 10_000);
    }
}
