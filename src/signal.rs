use serde::Serialize;

use crate::baseline::sample_stats;
use crate::config::AnalysisConfig;
use crate::models::{DailyRecord, FactorKey, Metric, SignalStrength};
use crate::pareto::ParetoResult;

/// Window-level spread needs at least two readings.
const MIN_SPREAD_SAMPLES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryStability {
    pub recovery_mean: f64,
    pub recovery_std: f64,
    /// Coefficient of variation; absent when the mean is too close to zero.
    pub recovery_cv: Option<f64>,
    pub recovery_samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Stable,
    Volatile,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorState {
    BelowNormal,
    WithinNormal,
    AboveNormal,
    Unknown,
}

fn coefficient_of_variation(mean: f64, std: f64) -> Option<f64> {
    if mean.abs() < 1e-9 {
        None
    } else {
        Some((std / mean).abs())
    }
}

pub fn recovery_stability(window: &[DailyRecord]) -> RecoveryStability {
    match sample_stats(window.iter().filter_map(|r| r.value(Metric::Recovery))) {
        Some(s) => RecoveryStability {
            recovery_mean: s.mean,
            recovery_std: s.std,
            recovery_cv: coefficient_of_variation(s.mean, s.std),
            recovery_samples: s.count,
        },
        None => RecoveryStability {
            recovery_mean: 0.0,
            recovery_std: 0.0,
            recovery_cv: None,
            recovery_samples: 0,
        },
    }
}

/// A factor is volatile when any of its fields varies beyond the CV
/// threshold across the window.
pub fn factor_volatility(window: &[DailyRecord], factor: FactorKey, config: &AnalysisConfig) -> Volatility {
    let mut verdict = Volatility::Unknown;
    for &metric in factor.metrics() {
        let Some(stats) = sample_stats(window.iter().filter_map(|r| r.value(metric))) else {
            continue;
        };
        if stats.count < MIN_SPREAD_SAMPLES {
            continue;
        }
        let volatile = match coefficient_of_variation(stats.mean, stats.std) {
            Some(cv) => cv >= config.volatility_cv_threshold,
            None => stats.std > 0.0,
        };
        if volatile {
            return Volatility::Volatile;
        }
        verdict = Volatility::Stable;
    }
    verdict
}

/// Bands the factor's most recent reading against its window-level spread.
pub fn current_state(window: &[DailyRecord], factor: FactorKey, config: &AnalysisConfig) -> FactorState {
    let mut best: Option<f64> = None;
    for &metric in factor.metrics() {
        let Some(latest) = window.iter().rev().find_map(|r| r.value(metric)) else {
            continue;
        };
        let Some(stats) = sample_stats(window.iter().filter_map(|r| r.value(metric))) else {
            continue;
        };
        if stats.count < MIN_SPREAD_SAMPLES {
            continue;
        }
        let z = if stats.std > 0.0 {
            (latest - stats.mean) / stats.std
        } else {
            0.0
        };
        if best.map_or(true, |b| z.abs() > b.abs()) {
            best = Some(z);
        }
    }

    match best {
        None => FactorState::Unknown,
        Some(z) if z <= -config.state_band_z => FactorState::BelowNormal,
        Some(z) if z >= config.state_band_z => FactorState::AboveNormal,
        Some(_) => FactorState::WithinNormal,
    }
}

/// Monotonic in the dominant factor's share of dips and its average |z|.
/// Insufficient dips or recovery samples cap the label at `Low`.
pub fn signal_strength(pareto: &ParetoResult, recovery_samples: usize, config: &AnalysisConfig) -> SignalStrength {
    let Some(dominant) = pareto.dominant() else {
        return SignalStrength::Low;
    };

    let sufficient =
        pareto.dip_count >= config.signal_min_dip_count && recovery_samples >= config.signal_min_samples;
    if !sufficient {
        return SignalStrength::Low;
    }

    if dominant.percent_of_dips >= config.signal_high_percent && dominant.avg_abs_z >= config.signal_high_abs_z {
        SignalStrength::High
    } else if dominant.percent_of_dips >= config.signal_medium_percent
        && dominant.avg_abs_z >= config.signal_medium_abs_z
    {
        SignalStrength::Medium
    } else {
        SignalStrength::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pareto::AttributionSummary;
    use chrono::{Duration, NaiveDate};

    fn window(recovery: &[f64], sleep: &[f64]) -> Vec<DailyRecord> {
        let start = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        recovery
            .iter()
            .zip(sleep)
            .enumerate()
            .map(|(i, (r, s))| DailyRecord {
                recovery_value: Some(*r),
                sleep_duration: Some(*s),
                ..DailyRecord::new(start + Duration::days(i as i64))
            })
            .collect()
    }

    fn pareto(percent: f64, avg_abs_z: f64, dip_count: usize) -> ParetoResult {
        ParetoResult {
            factors: vec![AttributionSummary {
                key: FactorKey::Exercise,
                percent_of_dips: percent,
                occurrences: 1,
                avg_abs_z,
                weighted_score: avg_abs_z,
                noise_ratio: 0.0,
                consistent_windows: 1,
            }],
            dominant_key: Some(FactorKey::Exercise),
            stable: false,
            dip_count,
            max_lag_days: 3,
            abnormal_abs_z: 1.25,
            baseline_days_window: 14,
            consistent_factors: vec![],
        }
    }

    #[test]
    fn recovery_kpis_skip_missing_days() {
        let mut records = window(&[60.0, 70.0, 80.0], &[8.0, 8.0, 8.0]);
        records[1].recovery_value = None;
        let stability = recovery_stability(&records);
        assert_eq!(stability.recovery_samples, 2);
        assert!((stability.recovery_mean - 70.0).abs() < 1e-12);
        assert!((stability.recovery_std - 10.0).abs() < 1e-12);
    }

    #[test]
    fn empty_window_reports_zeroes() {
        let stability = recovery_stability(&[]);
        assert_eq!(stability.recovery_samples, 0);
        assert_eq!(stability.recovery_mean, 0.0);
        assert!(stability.recovery_cv.is_none());
    }

    #[test]
    fn volatility_and_state_follow_spread() {
        let config = AnalysisConfig::default();
        let steady = window(&[70.0; 6], &[8.0, 8.1, 7.9, 8.0, 8.1, 7.9]);
        assert_eq!(factor_volatility(&steady, FactorKey::Sleep, &config), Volatility::Stable);
        assert_eq!(current_state(&steady, FactorKey::Sleep, &config), FactorState::BelowNormal);

        let noisy = window(&[70.0; 6], &[4.0, 9.0, 5.0, 9.5, 4.5, 9.0]);
        assert_eq!(factor_volatility(&noisy, FactorKey::Sleep, &config), Volatility::Volatile);
        assert_eq!(factor_volatility(&noisy, FactorKey::Nutrition, &config), Volatility::Unknown);
        assert_eq!(current_state(&noisy, FactorKey::Nutrition, &config), FactorState::Unknown);
    }

    #[test]
    fn strength_rises_with_consistency_and_magnitude() {
        let config = AnalysisConfig::default();
        assert_eq!(signal_strength(&pareto(100.0, 3.0, 6), 40, &config), SignalStrength::High);
        assert_eq!(signal_strength(&pareto(60.0, 3.0, 6), 40, &config), SignalStrength::Medium);
        assert_eq!(signal_strength(&pareto(100.0, 1.5, 6), 40, &config), SignalStrength::Medium);
        assert_eq!(signal_strength(&pareto(30.0, 3.0, 6), 40, &config), SignalStrength::Low);
    }

    #[test]
    fn insufficient_data_caps_at_low() {
        let config = AnalysisConfig::default();
        assert_eq!(signal_strength(&pareto(100.0, 3.0, 2), 40, &config), SignalStrength::Low);
        assert_eq!(signal_strength(&pareto(100.0, 3.0, 6), 10, &config), SignalStrength::Low);
    }

    #[test]
    fn no_dominant_factor_is_low() {
        let mut result = pareto(100.0, 3.0, 6);
        result.dominant_key = None;
        result.stable = true;
        assert_eq!(signal_strength(&result, 40, &AnalysisConfig::default()), SignalStrength::Low);
    }
}
