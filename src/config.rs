use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

pub const MAX_LAG_DAYS_LIMIT: u32 = 7;

/// Every threshold the engine uses. Passed by reference into each stage so
/// runs with different settings never share state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_window_days: usize,
    /// Calendar days of prior history behind each baseline.
    pub baseline_lookback_days: u32,
    pub min_baseline_samples: usize,

    pub large_dip_z: f64,
    pub persistent_dip_z: f64,
    pub persistent_min_days: usize,

    pub abnormal_abs_z: f64,
    pub max_lag_days: u32,
    /// Only count deviations in the direction that plausibly hurts recovery.
    pub directional_factors: bool,

    pub min_attribution_percent: f64,
    pub max_explanatory_factors: usize,
    /// Multiplier applied to a large dip's |z| in the weighted score.
    pub large_dip_weight: f64,
    /// Share of a factor's abnormal days falling outside dip context above
    /// which the factor is reported as noisy.
    pub max_noise_ratio: f64,
    /// Dip-anchored windows (each `baseline_lookback_days` long) a factor
    /// must show up in to count as consistent.
    pub min_consistent_windows: usize,

    pub signal_min_dip_count: usize,
    pub signal_min_samples: usize,
    pub signal_medium_percent: f64,
    pub signal_high_percent: f64,
    pub signal_medium_abs_z: f64,
    pub signal_high_abs_z: f64,

    pub volatility_cv_threshold: f64,
    pub state_band_z: f64,

    /// Windows shorter than this are shown as "insufficient data" by the CLI.
    pub display_min_days: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_window_days: 7,
            baseline_lookback_days: 14,
            min_baseline_samples: 10,
            large_dip_z: 1.25,
            persistent_dip_z: 0.75,
            persistent_min_days: 2,
            abnormal_abs_z: 1.25,
            max_lag_days: 3,
            directional_factors: true,
            min_attribution_percent: 15.0,
            max_explanatory_factors: 3,
            large_dip_weight: 1.25,
            max_noise_ratio: 0.4,
            min_consistent_windows: 3,
            signal_min_dip_count: 3,
            signal_min_samples: 14,
            signal_medium_percent: 50.0,
            signal_high_percent: 75.0,
            signal_medium_abs_z: 1.25,
            signal_high_abs_z: 2.0,
            volatility_cv_threshold: 0.15,
            state_band_z: 0.75,
            display_min_days: 30,
        }
    }
}

impl AnalysisConfig {
    /// Reads a (possibly partial) JSON override; missing fields keep defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AnalysisConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Baselines never use fewer than two samples, whatever is configured.
    pub fn baseline_min_samples(&self) -> usize {
        self.min_baseline_samples.max(2)
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        let positive = [
            ("large_dip_z", self.large_dip_z),
            ("persistent_dip_z", self.persistent_dip_z),
            ("abnormal_abs_z", self.abnormal_abs_z),
            ("signal_medium_abs_z", self.signal_medium_abs_z),
            ("signal_high_abs_z", self.signal_high_abs_z),
            ("volatility_cv_threshold", self.volatility_cv_threshold),
            ("state_band_z", self.state_band_z),
            ("large_dip_weight", self.large_dip_weight),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        let percents = [
            ("min_attribution_percent", self.min_attribution_percent),
            ("signal_medium_percent", self.signal_medium_percent),
            ("signal_high_percent", self.signal_high_percent),
        ];
        for (name, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                return Err(AnalyticsError::InvalidConfig(format!(
                    "{name} must be within 0..=100, got {value}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.max_noise_ratio) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "max_noise_ratio must be within 0..=1, got {}",
                self.max_noise_ratio
            )));
        }

        if self.min_window_days == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "min_window_days must be at least 1".to_string(),
            ));
        }
        if self.baseline_lookback_days == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "baseline_lookback_days must be at least 1".to_string(),
            ));
        }
        if self.baseline_min_samples() > self.baseline_lookback_days as usize {
            return Err(AnalyticsError::InvalidConfig(format!(
                "min_baseline_samples ({}) cannot be met within baseline_lookback_days ({})",
                self.min_baseline_samples, self.baseline_lookback_days
            )));
        }
        if self.persistent_min_days == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "persistent_min_days must be at least 1".to_string(),
            ));
        }
        if self.max_lag_days > MAX_LAG_DAYS_LIMIT {
            return Err(AnalyticsError::InvalidConfig(format!(
                "max_lag_days must be at most {MAX_LAG_DAYS_LIMIT}, got {}",
                self.max_lag_days
            )));
        }
        if self.persistent_dip_z > self.large_dip_z {
            return Err(AnalyticsError::InvalidConfig(format!(
                "persistent_dip_z ({}) must not exceed large_dip_z ({})",
                self.persistent_dip_z, self.large_dip_z
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_excessive_lag() {
        let config = AnalysisConfig {
            max_lag_days: 12,
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(AnalyticsError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_non_finite_threshold() {
        let config = AnalysisConfig {
            abnormal_abs_z: f64::NAN,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn baseline_samples_never_below_two() {
        let config = AnalysisConfig {
            min_baseline_samples: 0,
            ..AnalysisConfig::default()
        };
        assert_eq!(config.baseline_min_samples(), 2);
    }

    #[test]
    fn sample_floor_must_fit_in_lookback() {
        let config = AnalysisConfig {
            baseline_lookback_days: 7,
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(AnalyticsError::InvalidConfig(_))));

        let relaxed = AnalysisConfig {
            min_baseline_samples: 5,
            ..config
        };
        assert!(relaxed.validate().is_ok());
    }

    #[test]
    fn rejects_noise_ratio_outside_unit_range() {
        let config = AnalysisConfig {
            max_noise_ratio: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_lag_days": 1, "abnormal_abs_z": 2.0}}"#).unwrap();

        let config = AnalysisConfig::load(file.path()).unwrap();
        assert_eq!(config.max_lag_days, 1);
        assert_eq!(config.abnormal_abs_z, 2.0);
        assert_eq!(config.large_dip_z, AnalysisConfig::default().large_dip_z);
    }
}
