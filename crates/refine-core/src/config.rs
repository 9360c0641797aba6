use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Invalid [`LoopConfig`] values, detected before any iteration runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid loop configuration: {0}")]
pub struct ConfigError(pub String);

/// Configuration for one loop run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Hard cap on the number of improve/evaluate cycles
    pub max_iterations: u32,
    /// Score at or above which the loop stops successfully
    pub quality_threshold: f64,
    /// Budget for each adapter call within an iteration
    #[serde(with = "humantime_serde")]
    pub timeout_per_iteration: Duration,
    /// Consecutive failed iterations that abort the run
    pub failure_cap: u32,
    /// Opt-in plateau termination; advisory-only when absent
    pub plateau: Option<PlateauConfig>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            quality_threshold: 85.0,
            timeout_per_iteration: Duration::from_secs(300),
            failure_cap: 2,
            plateau: None,
        }
    }
}

/// Plateau detection settings. Only present when the caller wants a flat
/// score trend to terminate the loop.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlateauConfig {
    /// Number of trailing scores to inspect
    pub window: usize,
    /// Largest |delta| still considered flat
    #[serde(default = "default_min_delta")]
    pub min_delta: f64,
}

fn default_min_delta() -> f64 {
    1.0
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            window: 3,
            min_delta: default_min_delta(),
        }
    }
}

impl LoopConfig {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_timeout_per_iteration(mut self, timeout: Duration) -> Self {
        self.timeout_per_iteration = timeout;
        self
    }

    pub fn with_failure_cap(mut self, cap: u32) -> Self {
        self.failure_cap = cap;
        self
    }

    pub fn with_plateau(mut self, plateau: PlateauConfig) -> Self {
        self.plateau = Some(plateau);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations < 1 {
            return Err(ConfigError("max_iterations must be at least 1".into()));
        }
        if !self.quality_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.quality_threshold)
        {
            return Err(ConfigError(format!(
                "quality_threshold must be within [0, 100], got {}",
                self.quality_threshold
            )));
        }
        if self.timeout_per_iteration.is_zero() {
            return Err(ConfigError("timeout_per_iteration must be positive".into()));
        }
        if self.failure_cap < 1 {
            return Err(ConfigError("failure_cap must be at least 1".into()));
        }
        if let Some(plateau) = &self.plateau {
            if plateau.window < 2 {
                return Err(ConfigError("plateau.window must be at least 2".into()));
            }
            if !plateau.min_delta.is_finite() || plateau.min_delta < 0.0 {
                return Err(ConfigError(format!(
                    "plateau.min_delta must be non-negative, got {}",
                    plateau.min_delta
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LoopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.quality_threshold, 85.0);
        assert_eq!(config.timeout_per_iteration, Duration::from_secs(300));
        assert_eq!(config.failure_cap, 2);
        assert!(config.plateau.is_none());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = LoopConfig::default().with_max_iterations(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        assert!(LoopConfig::default()
            .with_quality_threshold(-5.0)
            .validate()
            .is_err());
        assert!(LoopConfig::default()
            .with_quality_threshold(100.1)
            .validate()
            .is_err());
        assert!(LoopConfig::default()
            .with_quality_threshold(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = LoopConfig::default().with_timeout_per_iteration(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plateau_window_rejected() {
        let config = LoopConfig::default().with_plateau(PlateauConfig {
            window: 1,
            min_delta: 1.0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_toml_with_defaults() {
        let config: LoopConfig = toml::from_str(
            r#"
            max_iterations = 5
            timeout_per_iteration = "2m"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.timeout_per_iteration, Duration::from_secs(120));
        assert_eq!(config.quality_threshold, 85.0);
    }
}
