//! Trailing per-metric baselines. Each day is measured against the metric's
//! own prior history only; the day itself never feeds its reference.

use std::ops::Range;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::models::{DailyRecord, Metric};

/// Relative tolerance under which a spread counts as zero variance.
const DEGENERATE_STD: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
    pub sample_count: usize,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub insufficient: bool,
}

impl Baseline {
    /// Signed standardized deviation. Resolves to 0.0 whenever the baseline
    /// cannot support one (too few samples or zero variance).
    pub fn z_score(&self, value: f64) -> f64 {
        if !self.is_scorable() {
            return 0.0;
        }
        let z = (value - self.mean) / self.std;
        if z.is_finite() {
            z
        } else {
            0.0
        }
    }

    pub fn is_scorable(&self) -> bool {
        !self.insufficient && !is_degenerate(self.mean, self.std)
    }

    fn empty(day: NaiveDate) -> Self {
        Self {
            mean: 0.0,
            std: 0.0,
            sample_count: 0,
            window_start: day,
            window_end: day,
            insufficient: true,
        }
    }
}

fn is_degenerate(mean: f64, std: f64) -> bool {
    std <= DEGENERATE_STD * mean.abs().max(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

/// Population mean and standard deviation. `None` when there are no samples.
pub fn sample_stats(values: impl IntoIterator<Item = f64>) -> Option<SampleStats> {
    let xs: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if xs.is_empty() {
        return None;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some(SampleStats {
        mean,
        std: var.sqrt(),
        count: xs.len(),
    })
}

/// Baseline for `metric` on `records[index]`, built from the records dated in
/// `[date - lookback, date)`. Records must be sorted ascending by date.
pub fn trailing_baseline(
    records: &[DailyRecord],
    index: usize,
    metric: Metric,
    config: &AnalysisConfig,
) -> Baseline {
    let day = records[index].date;
    // Nothing can precede a lookback that underflows the calendar.
    let lookback = Duration::days(i64::from(config.baseline_lookback_days));
    let (Some(window_start), Some(window_end)) = (day.checked_sub_signed(lookback), day.pred_opt()) else {
        return Baseline::empty(day);
    };
    let from = records[..index].partition_point(|r| r.date < window_start);

    let stats = sample_stats(records[from..index].iter().filter_map(|r| r.value(metric)));
    match stats {
        Some(s) if s.count >= config.baseline_min_samples() => Baseline {
            mean: s.mean,
            std: s.std,
            sample_count: s.count,
            window_start,
            window_end,
            insufficient: false,
        },
        other => Baseline {
            mean: other.map(|s| s.mean).unwrap_or(0.0),
            std: 0.0,
            sample_count: other.map(|s| s.count).unwrap_or(0),
            window_start,
            window_end,
            insufficient: true,
        },
    }
}

/// Baselines for every metric over a contiguous index range of the record
/// sequence.
#[derive(Debug, Clone)]
pub struct BaselineTable {
    start: usize,
    rows: Vec<[Baseline; 5]>,
}

impl BaselineTable {
    pub fn compute(records: &[DailyRecord], range: Range<usize>, config: &AnalysisConfig) -> Self {
        let rows = range
            .clone()
            .map(|index| Metric::ALL.map(|metric| trailing_baseline(records, index, metric, config)))
            .collect();
        Self {
            start: range.start,
            rows,
        }
    }

    pub fn get(&self, index: usize, metric: Metric) -> Option<&Baseline> {
        index
            .checked_sub(self.start)
            .and_then(|offset| self.rows.get(offset))
            .map(|row| &row[metric.index()])
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.rows.len()
    }
}
