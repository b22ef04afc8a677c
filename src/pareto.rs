use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::dips::DipEvent;
use crate::evidence::FactorEvidence;
use crate::models::{DipKind, FactorKey, FactorMap};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttributionSummary {
    pub key: FactorKey,
    #[serde(rename = "percent")]
    pub percent_of_dips: f64,
    pub occurrences: usize,
    pub avg_abs_z: f64,
    /// Sum of |z| over explained dips, large dips weighted up.
    pub weighted_score: f64,
    /// Share of the factor's abnormal days that fell outside every dip's lag
    /// window.
    pub noise_ratio: f64,
    /// Dip-anchored windows in which the factor explained at least one dip.
    pub consistent_windows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParetoResult {
    /// Ranked best first; factors that never explained a dip are left out.
    pub factors: Vec<AttributionSummary>,
    pub dominant_key: Option<FactorKey>,
    pub stable: bool,
    pub dip_count: usize,
    pub max_lag_days: u32,
    pub abnormal_abs_z: f64,
    pub baseline_days_window: u32,
    /// Factors meeting `min_consistent_windows`, in factor order.
    pub consistent_factors: Vec<FactorKey>,
}

impl ParetoResult {
    pub fn dominant(&self) -> Option<&AttributionSummary> {
        let key = self.dominant_key?;
        self.factors.iter().find(|f| f.key == key)
    }

    pub fn runner_up(&self) -> Option<&AttributionSummary> {
        let key = self.dominant_key?;
        self.factors.iter().find(|f| f.key != key)
    }
}

/// Higher share of dips first, then higher average |z|, then fixed factor
/// precedence.
fn rank(a: &AttributionSummary, b: &AttributionSummary) -> Ordering {
    b.percent_of_dips
        .total_cmp(&a.percent_of_dips)
        .then_with(|| b.avg_abs_z.total_cmp(&a.avg_abs_z))
        .then_with(|| a.key.precedence().cmp(&b.key.precedence()))
}

fn dip_weight(kind: DipKind, config: &AnalysisConfig) -> f64 {
    match kind {
        DipKind::Large => config.large_dip_weight,
        _ => 1.0,
    }
}

/// Every dip date together with the days its lag search reaches back to.
fn dip_context(dips: &[DipEvent], max_lag_days: u32) -> BTreeSet<NaiveDate> {
    dips.iter()
        .flat_map(|dip| {
            (0..=max_lag_days).filter_map(move |lag| dip.date.checked_sub_signed(Duration::days(i64::from(lag))))
        })
        .collect()
}

fn noise_ratio(abnormal_days: &[NaiveDate], context: &BTreeSet<NaiveDate>) -> f64 {
    if abnormal_days.is_empty() {
        return 0.0;
    }
    let outside = abnormal_days.iter().filter(|d| !context.contains(d)).count();
    outside as f64 / abnormal_days.len() as f64
}

/// Walks sorted dip dates in non-overlapping windows of `window_days`, each
/// anchored at the first dip not yet covered, and counts the windows where
/// the factor explained any dip.
fn consistent_windows(dip_dates: &[NaiveDate], explained: &BTreeSet<NaiveDate>, window_days: u32) -> usize {
    let span = Duration::days(i64::from(window_days.max(1)) - 1);
    let mut windows = 0;
    let mut i = 0;
    while i < dip_dates.len() {
        let end = dip_dates[i].checked_add_signed(span).unwrap_or(NaiveDate::MAX);
        let covered = dip_dates[i..].partition_point(|d| *d <= end);
        if dip_dates[i..i + covered].iter().any(|d| explained.contains(d)) {
            windows += 1;
        }
        i += covered;
    }
    windows
}

/// Aggregates lag-resolved evidence over the dip days in `dips`.
/// `abnormal_days` lists, per factor, every analysed day on which the factor
/// was abnormal (dip or not) and only feeds the noise ratio.
pub fn aggregate(
    dip_evidence: &[FactorEvidence],
    dips: &[DipEvent],
    abnormal_days: &FactorMap<Vec<NaiveDate>>,
    config: &AnalysisConfig,
) -> ParetoResult {
    let dip_count = dips.len();
    let kind_on = |date: NaiveDate| {
        dips.binary_search_by_key(&date, |dip| dip.date)
            .map(|i| dips[i].kind)
            .unwrap_or(DipKind::None)
    };

    let mut tallies: FactorMap<(usize, f64, f64)> = FactorMap::default();
    let mut explained: FactorMap<BTreeSet<NaiveDate>> = FactorMap::default();
    for ev in dip_evidence.iter().filter(|ev| ev.is_abnormal) {
        let (count, abs_z_sum, weighted) = tallies.get_mut(ev.factor_key);
        *count += 1;
        *abs_z_sum += ev.abs_z;
        *weighted += dip_weight(kind_on(ev.date), config) * ev.abs_z;
        explained.get_mut(ev.factor_key).insert(ev.date);
    }

    let context = dip_context(dips, config.max_lag_days);
    let dip_dates: Vec<NaiveDate> = dips.iter().map(|dip| dip.date).collect();
    let windows = FactorMap::from_fn(|key| {
        consistent_windows(&dip_dates, explained.get(key), config.baseline_lookback_days)
    });

    let mut factors: Vec<AttributionSummary> = FactorKey::ALL
        .iter()
        .filter_map(|&key| {
            let (occurrences, abs_z_sum, weighted_score) = *tallies.get(key);
            if occurrences == 0 || dip_count == 0 {
                return None;
            }
            Some(AttributionSummary {
                key,
                percent_of_dips: (occurrences as f64 / dip_count as f64 * 100.0).min(100.0),
                occurrences,
                avg_abs_z: abs_z_sum / occurrences as f64,
                weighted_score,
                noise_ratio: noise_ratio(abnormal_days.get(key), &context),
                consistent_windows: *windows.get(key),
            })
        })
        .collect();
    factors.sort_by(rank);

    let consistent_factors: Vec<FactorKey> = FactorKey::ALL
        .into_iter()
        .filter(|&key| tallies.get(key).0 > 0 && *windows.get(key) >= config.min_consistent_windows)
        .collect();

    factors.truncate(config.max_explanatory_factors);

    let dominant_key = factors
        .first()
        .filter(|top| top.percent_of_dips >= config.min_attribution_percent)
        .map(|top| top.key);

    ParetoResult {
        factors,
        dominant_key,
        stable: dominant_key.is_none(),
        dip_count,
        max_lag_days: config.max_lag_days,
        abnormal_abs_z: config.abnormal_abs_z,
        baseline_days_window: config.baseline_lookback_days,
        consistent_factors,
    }
}
