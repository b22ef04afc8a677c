use std::ops::Range;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::baseline::BaselineTable;
use crate::config::AnalysisConfig;
use crate::dips::{detect_dips, DipDetection, DipEvent};
use crate::error::AnalyticsError;
use crate::evidence::{FactorEvidence, FactorScorer};
use crate::insight::{compose, Insight, InsightContext};
use crate::models::{DailyRecord, DipKind, FactorKey, FactorMap};
use crate::pareto::{aggregate, AttributionSummary, ParetoResult};
use crate::signal::{
    current_state, factor_volatility, recovery_stability, signal_strength, FactorState, Volatility,
};
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub user_id: String,
    pub days_window: usize,
    pub stable: bool,
    pub factors: Vec<AttributionSummary>,
    pub dominant_key: Option<FactorKey>,
    pub insight: Insight,
    pub meta: SummaryMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMeta {
    pub dip_count: usize,
    pub large_dip_count: usize,
    pub persistent_dip_count: usize,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub stability: StabilityMeta,
    pub pareto: ParetoMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityMeta {
    pub recovery_mean: f64,
    pub recovery_std: f64,
    pub recovery_cv: Option<f64>,
    pub recovery_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoMeta {
    pub max_lag_days: u32,
    pub abnormal_abs_z: f64,
    pub baseline_days_window: u32,
    pub consistent_factors: Vec<FactorKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeseries {
    pub user_id: String,
    pub days_window: usize,
    pub days: Vec<TimeseriesDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesDay {
    pub date: NaiveDate,
    pub recovery_value: Option<f64>,
    pub sleep_duration: Option<f64>,
    pub sleep_consistency: Option<f64>,
    pub exercise_value: Option<f64>,
    pub nutrition_value: Option<f64>,
    pub is_dip: bool,
    pub dip_kind: DipKind,
    pub factor_abnormal: FactorMap<bool>,
    pub factor_abs_z: FactorMap<f64>,
}

/// Rejects duplicate or descending dates. Records are never reordered here.
pub fn validate_records(records: &[DailyRecord]) -> Result<(), AnalyticsError> {
    for pair in records.windows(2) {
        let (previous, next) = (pair[0].date, pair[1].date);
        if next == previous {
            return Err(AnalyticsError::DuplicateDate(next));
        }
        if next < previous {
            return Err(AnalyticsError::OutOfOrder { previous, next });
        }
    }
    Ok(())
}

/// Clamps the requested window to `[min_window_days, available]`. With fewer
/// records than the minimum, every available record is used.
pub fn resolve_window(requested: i64, available: usize, config: &AnalysisConfig) -> Result<usize, AnalyticsError> {
    if requested <= 0 {
        return Err(AnalyticsError::InvalidWindow(requested));
    }
    let requested = usize::try_from(requested).unwrap_or(usize::MAX);
    Ok(requested.max(config.min_window_days).min(available))
}

/// Intermediate state shared by both read models of a single request.
struct Analysis<'a> {
    records: &'a [DailyRecord],
    window: Range<usize>,
    baselines: BaselineTable,
    dips: DipDetection,
}

impl<'a> Analysis<'a> {
    fn prepare(records: &'a [DailyRecord], window_days: i64, config: &AnalysisConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        validate_records(records)?;

        let used = resolve_window(window_days, records.len(), config)?;
        if used < config.min_window_days {
            warn!(
                available = records.len(),
                min_window_days = config.min_window_days,
                "usable window is shorter than the minimum"
            );
        }
        let window = records.len() - used..records.len();

        // Lag search may reach a few days before the window, so baselines start earlier.
        let lag_span = chrono::Duration::days(i64::from(config.max_lag_days));
        let baseline_start = match records.get(window.start) {
            Some(first) => match first.date.checked_sub_signed(lag_span) {
                Some(earliest) => records[..window.start].partition_point(|r| r.date < earliest),
                None => 0,
            },
            None => window.start,
        };
        let baselines = BaselineTable::compute(records, baseline_start..window.end, config);
        let dips = detect_dips(records, window.clone(), &baselines, config);

        debug!(
            days_window = used,
            dip_count = dips.dip_count(),
            large = dips.large_count(),
            persistent = dips.persistent_count(),
            "dip detection complete"
        );

        Ok(Self {
            records,
            window,
            baselines,
            dips,
        })
    }

    fn window_records(&self) -> &'a [DailyRecord] {
        &self.records[self.window.clone()]
    }

    fn dip_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.window
            .clone()
            .zip(&self.dips.kinds)
            .filter(|(_, kind)| kind.is_dip())
            .map(|(index, _)| index)
    }

    /// Same-day abnormal dates per factor across every scored day, including
    /// the lag days ahead of the window.
    fn abnormal_days(&self, config: &AnalysisConfig) -> FactorMap<Vec<NaiveDate>> {
        let scorer = FactorScorer::new(self.records, &self.baselines, config);
        FactorMap::from_fn(|factor| {
            self.baselines
                .range()
                .filter(|&index| scorer.same_day(index, factor).is_abnormal)
                .map(|index| self.records[index].date)
                .collect()
        })
    }

    fn dip_evidence(&self, config: &AnalysisConfig) -> Vec<FactorEvidence> {
        let scorer = FactorScorer::new(self.records, &self.baselines, config);
        self.dip_indices()
            .flat_map(|index| FactorKey::ALL.map(|factor| scorer.resolve_lag(index, factor)))
            .collect()
    }
}

pub fn compute_summary(
    user_id: &str,
    records: &[DailyRecord],
    window_days: i64,
    config: &AnalysisConfig,
) -> Result<Summary, AnalyticsError> {
    let analysis = Analysis::prepare(records, window_days, config)?;
    let window = analysis.window_records();

    let evidence = analysis.dip_evidence(config);
    let pareto: ParetoResult = aggregate(
        &evidence,
        &analysis.dips.events,
        &analysis.abnormal_days(config),
        config,
    );
    let stability = recovery_stability(window);
    let strength = signal_strength(&pareto, stability.recovery_samples, config);

    let (state, volatility) = match pareto.dominant_key {
        Some(key) => (current_state(window, key, config), factor_volatility(window, key, config)),
        None => (FactorState::Unknown, Volatility::Unknown),
    };
    let insight = compose(&InsightContext {
        pareto: &pareto,
        signal_strength: strength,
        sufficient_history: stability.recovery_samples >= config.signal_min_samples,
        state,
        volatility,
    });

    debug!(
        user_id,
        dominant = ?pareto.dominant_key,
        stable = pareto.stable,
        signal_strength = strength.as_str(),
        "attribution complete"
    );

    Ok(Summary {
        user_id: user_id.to_string(),
        days_window: window.len(),
        stable: pareto.stable,
        factors: pareto.factors.clone(),
        dominant_key: pareto.dominant_key,
        insight,
        meta: SummaryMeta {
            dip_count: analysis.dips.dip_count(),
            large_dip_count: analysis.dips.large_count(),
            persistent_dip_count: analysis.dips.persistent_count(),
            window_start: window.first().map(|r| r.date),
            window_end: window.last().map(|r| r.date),
            stability: StabilityMeta {
                recovery_mean: stability.recovery_mean,
                recovery_std: stability.recovery_std,
                recovery_cv: stability.recovery_cv,
                recovery_samples: stability.recovery_samples,
            },
            pareto: ParetoMeta {
                max_lag_days: pareto.max_lag_days,
                abnormal_abs_z: pareto.abnormal_abs_z,
                baseline_days_window: pareto.baseline_days_window,
                consistent_factors: pareto.consistent_factors.clone(),
            },
        },
    })
}

pub fn compute_timeseries(
    user_id: &str,
    records: &[DailyRecord],
    window_days: i64,
    config: &AnalysisConfig,
) -> Result<Timeseries, AnalyticsError> {
    let analysis = Analysis::prepare(records, window_days, config)?;
    let scorer = FactorScorer::new(records, &analysis.baselines, config);

    let days = analysis
        .window
        .clone()
        .zip(&analysis.dips.kinds)
        .map(|(index, &kind)| {
            let record = &records[index];
            let evidence = FactorMap::from_fn(|factor| scorer.same_day(index, factor));
            TimeseriesDay {
                date: record.date,
                recovery_value: record.recovery_value,
                sleep_duration: record.sleep_duration,
                sleep_consistency: record.sleep_consistency,
                exercise_value: record.exercise_value,
                nutrition_value: record.nutrition_value,
                is_dip: kind.is_dip(),
                dip_kind: kind,
                factor_abnormal: FactorMap::from_fn(|factor| evidence.get(factor).is_abnormal),
                factor_abs_z: FactorMap::from_fn(|factor| evidence.get(factor).abs_z),
            }
        })
        .collect();

    Ok(Timeseries {
        user_id: user_id.to_string(),
        days_window: analysis.window.len(),
        days,
    })
}

/// Lag-resolved evidence for every (dip day, factor) pair in the window.
pub fn compute_dip_evidence(
    records: &[DailyRecord],
    window_days: i64,
    config: &AnalysisConfig,
) -> Result<Vec<FactorEvidence>, AnalyticsError> {
    let analysis = Analysis::prepare(records, window_days, config)?;
    Ok(analysis.dip_evidence(config))
}

/// Dip events (large and persistent) in the window, oldest first.
pub fn compute_dips(
    records: &[DailyRecord],
    window_days: i64,
    config: &AnalysisConfig,
) -> Result<Vec<DipEvent>, AnalyticsError> {
    let analysis = Analysis::prepare(records, window_days, config)?;
    Ok(analysis.dips.events)
}

/// Binds a record store to a configuration. Holds no per-request state.
pub struct AttributionEngine<S> {
    store: S,
    config: AnalysisConfig,
}

impl<S: RecordStore> AttributionEngine<S> {
    pub fn new(store: S, config: AnalysisConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn compute_summary(&self, user_id: &str, window_days: i64) -> Result<Summary, AnalyticsError> {
        let records = self.store.load_records(user_id)?;
        compute_summary(user_id, &records, window_days, &self.config)
    }

    pub fn compute_timeseries(&self, user_id: &str, window_days: i64) -> Result<Timeseries, AnalyticsError> {
        let records = self.store.load_records(user_id)?;
        compute_timeseries(user_id, &records, window_days, &self.config)
    }

    pub fn compute_dip_evidence(&self, user_id: &str, window_days: i64) -> Result<Vec<FactorEvidence>, AnalyticsError> {
        let records = self.store.load_records(user_id)?;
        compute_dip_evidence(&records, window_days, &self.config)
    }

    pub fn compute_dips(&self, user_id: &str, window_days: i64) -> Result<Vec<DipEvent>, AnalyticsError> {
        let records = self.store.load_records(user_id)?;
        compute_dips(&records, window_days, &self.config)
    }
}
