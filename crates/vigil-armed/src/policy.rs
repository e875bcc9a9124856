//! Evaluator timing policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When the automatic evaluator runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorPolicy {
    /// Seconds between evaluator ticks
    ///
    /// **Default:** 60
    pub interval_s: u64,

    /// Seconds to wait before the first tick, so the network settles after boot
    ///
    /// **Default:** 10
    pub initial_delay_s: u64,
}

impl Default for EvaluatorPolicy {
    fn default() -> Self {
        Self {
            interval_s: 60,
            initial_delay_s: 10,
        }
    }
}

impl EvaluatorPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_s)
    }

    /// Validate the policy configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_s == 0 {
            return Err("evaluator interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = EvaluatorPolicy::default();
        assert_eq!(policy.interval(), Duration::from_secs(60));
        assert_eq!(policy.initial_delay(), Duration::from_secs(10));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let policy = EvaluatorPolicy {
            interval_s: 0,
            initial_delay_s: 0,
        };
        assert!(policy.validate().is_err());
    }
}
