use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::baseline::BaselineTable;
use crate::config::AnalysisConfig;
use crate::models::{DailyRecord, FactorKey};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FactorEvidence {
    pub date: NaiveDate,
    pub factor_key: FactorKey,
    pub abs_z: f64,
    pub is_abnormal: bool,
    /// Days between the factor reading used and `date`.
    pub lag_days: u32,
}

/// Scores factor deviations against each field's trailing baseline.
pub struct FactorScorer<'a> {
    records: &'a [DailyRecord],
    baselines: &'a BaselineTable,
    config: &'a AnalysisConfig,
}

impl<'a> FactorScorer<'a> {
    pub fn new(records: &'a [DailyRecord], baselines: &'a BaselineTable, config: &'a AnalysisConfig) -> Self {
        Self {
            records,
            baselines,
            config,
        }
    }

    /// Signed z of the factor's most deviated field on `records[index]`.
    /// `None` when no field has both a value and a usable baseline.
    fn signed_z(&self, index: usize, factor: FactorKey) -> Option<f64> {
        let record = self.records.get(index)?;
        let mut best: Option<f64> = None;
        for &metric in factor.metrics() {
            let Some(value) = record.value(metric) else {
                continue;
            };
            let Some(baseline) = self.baselines.get(index, metric) else {
                continue;
            };
            if !baseline.is_scorable() {
                continue;
            }
            let z = baseline.z_score(value);
            if best.map_or(true, |b| z.abs() > b.abs()) {
                best = Some(z);
            }
        }
        best
    }

    fn is_abnormal(&self, factor: FactorKey, signed_z: f64) -> bool {
        let direction_ok =
            !self.config.directional_factors || factor.harmful_direction().matches(signed_z);
        direction_ok && signed_z.abs() >= self.config.abnormal_abs_z
    }

    /// Same-day evidence with no lag search; used to annotate every day.
    pub fn same_day(&self, index: usize, factor: FactorKey) -> FactorEvidence {
        let date = self.records[index].date;
        match self.signed_z(index, factor) {
            Some(z) => FactorEvidence {
                date,
                factor_key: factor,
                abs_z: z.abs(),
                is_abnormal: self.is_abnormal(factor, z),
                lag_days: 0,
            },
            None => FactorEvidence {
                date,
                factor_key: factor,
                abs_z: 0.0,
                is_abnormal: false,
                lag_days: 0,
            },
        }
    }

    /// Looks back up to `max_lag_days` for the reading that best explains a
    /// dip on `records[index]`. Abnormal readings win over normal ones, then
    /// larger |z|, then the smaller lag.
    pub fn resolve_lag(&self, index: usize, factor: FactorKey) -> FactorEvidence {
        let date = self.records[index].date;
        let mut best = FactorEvidence {
            date,
            factor_key: factor,
            abs_z: 0.0,
            is_abnormal: false,
            lag_days: 0,
        };

        for lag in 0..=self.config.max_lag_days {
            let Some(target) = date.checked_sub_signed(Duration::days(i64::from(lag))) else {
                break;
            };
            let Ok(lag_index) = self.records.binary_search_by_key(&target, |r| r.date) else {
                continue;
            };
            let Some(z) = self.signed_z(lag_index, factor) else {
                continue;
            };
            let abnormal = self.is_abnormal(factor, z);
            let better = (abnormal && !best.is_abnormal)
                || (abnormal == best.is_abnormal && z.abs() > best.abs_z);
            if better {
                best.abs_z = z.abs();
                best.is_abnormal = abnormal;
                best.lag_days = lag;
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metric;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + Duration::days(offset)
    }

    fn records_from(sleep: &[f64], exercise: &[f64]) -> Vec<DailyRecord> {
        sleep
            .iter()
            .zip(exercise)
            .enumerate()
            .map(|(i, (s, e))| DailyRecord {
                sleep_duration: Some(*s),
                exercise_value: Some(*e),
                ..DailyRecord::new(day(i as i64))
            })
            .collect()
    }

    fn alternating(n: usize, low: f64, high: f64) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { low } else { high }).collect()
    }

    #[test]
    fn same_day_flags_harmful_exercise_spike() {
        let mut exercise = alternating(12, 290.0, 310.0);
        exercise[11] = 400.0;
        let sleep = vec![8.0; 12];
        let records = records_from(&sleep, &exercise);
        let config = AnalysisConfig::default();
        let baselines = BaselineTable::compute(&records, 0..12, &config);
        let scorer = FactorScorer::new(&records, &baselines, &config);

        let ev = scorer.same_day(11, FactorKey::Exercise);
        assert!(ev.is_abnormal);
        assert!(ev.abs_z > 5.0);

        let sleep_ev = scorer.same_day(11, FactorKey::Sleep);
        assert_eq!(sleep_ev.abs_z, 0.0);
        assert!(!sleep_ev.is_abnormal);
    }

    #[test]
    fn direction_filter_keeps_abs_z_but_clears_flag() {
        let mut exercise = alternating(12, 290.0, 310.0);
        exercise[11] = 200.0;
        let records = records_from(&vec![8.0; 12], &exercise);
        let config = AnalysisConfig::default();
        let baselines = BaselineTable::compute(&records, 0..12, &config);
        let scorer = FactorScorer::new(&records, &baselines, &config);

        let ev = scorer.same_day(11, FactorKey::Exercise);
        assert!(ev.abs_z > 5.0);
        assert!(!ev.is_abnormal);

        let undirected = AnalysisConfig {
            directional_factors: false,
            ..AnalysisConfig::default()
        };
        let scorer = FactorScorer::new(&records, &baselines, &undirected);
        assert!(scorer.same_day(11, FactorKey::Exercise).is_abnormal);
    }

    #[test]
    fn lag_search_finds_earlier_short_sleep() {
        let mut sleep = alternating(14, 7.5, 8.0);
        sleep[12] = 5.0;
        let records = records_from(&sleep, &vec![300.0; 14]);
        let config = AnalysisConfig::default();
        let baselines = BaselineTable::compute(&records, 0..14, &config);
        let scorer = FactorScorer::new(&records, &baselines, &config);

        assert!(!scorer.same_day(13, FactorKey::Sleep).is_abnormal);
        let ev = scorer.resolve_lag(13, FactorKey::Sleep);
        assert!(ev.is_abnormal);
        assert_eq!(ev.lag_days, 1);
        assert_eq!(ev.date, day(13));
    }

    #[test]
    fn lag_ties_prefer_the_most_recent_reading() {
        let sleep = vec![8.0; 10];
        let records = records_from(&sleep, &vec![300.0; 10]);
        let config = AnalysisConfig::default();
        let baselines = BaselineTable::compute(&records, 0..10, &config);
        let scorer = FactorScorer::new(&records, &baselines, &config);

        let ev = scorer.resolve_lag(9, FactorKey::Sleep);
        assert_eq!(ev.lag_days, 0);
        assert_eq!(ev.abs_z, 0.0);
        assert!(!ev.is_abnormal);
    }

    #[test]
    fn equal_abnormal_readings_resolve_to_the_smaller_lag() {
        // Days 5 and 6 both read 5.0 against the same multiset {5, 8, 8, 8}.
        let sleep = [8.0, 5.0, 8.0, 8.0, 8.0, 5.0, 5.0, 8.0];
        let records = records_from(&sleep, &[300.0; 8]);
        let config = AnalysisConfig {
            baseline_lookback_days: 4,
            min_baseline_samples: 2,
            ..AnalysisConfig::default()
        };
        let baselines = BaselineTable::compute(&records, 0..8, &config);
        let scorer = FactorScorer::new(&records, &baselines, &config);

        let two_back = scorer.same_day(5, FactorKey::Sleep);
        let one_back = scorer.same_day(6, FactorKey::Sleep);
        assert!(two_back.is_abnormal && one_back.is_abnormal);
        assert_eq!(two_back.abs_z, one_back.abs_z);
        assert!(one_back.abs_z > config.abnormal_abs_z);

        let ev = scorer.resolve_lag(7, FactorKey::Sleep);
        assert!(ev.is_abnormal);
        assert_eq!(ev.lag_days, 1);
        assert_eq!(ev.abs_z, one_back.abs_z);
    }

    #[test]
    fn lag_search_stops_at_the_first_calendar_day() {
        let records: Vec<DailyRecord> = (0..2)
            .map(|i| DailyRecord {
                sleep_duration: Some(8.0),
                ..DailyRecord::new(NaiveDate::MIN + Duration::days(i))
            })
            .collect();
        let config = AnalysisConfig::default();
        let baselines = BaselineTable::compute(&records, 0..2, &config);
        let scorer = FactorScorer::new(&records, &baselines, &config);

        let ev = scorer.resolve_lag(1, FactorKey::Sleep);
        assert_eq!(ev.lag_days, 0);
        assert!(!ev.is_abnormal);
    }

    #[test]
    fn composite_sleep_uses_most_deviated_field() {
        let mut records = records_from(&alternating(12, 7.5, 8.0), &vec![300.0; 12]);
        for (i, r) in records.iter_mut().enumerate() {
            r.sleep_consistency = Some(if i % 2 == 0 { 0.8 } else { 0.9 });
        }
        records[11].sleep_consistency = Some(0.3);
        let config = AnalysisConfig::default();
        let baselines = BaselineTable::compute(&records, 0..12, &config);
        let scorer = FactorScorer::new(&records, &baselines, &config);

        let consistency_z = baselines
            .get(11, Metric::SleepConsistency)
            .unwrap()
            .z_score(0.3);
        let ev = scorer.same_day(11, FactorKey::Sleep);
        assert!((ev.abs_z - consistency_z.abs()).abs() < 1e-12);
        assert!(ev.is_abnormal);
    }
}
