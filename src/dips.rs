//! Recovery dip detection. Only the recovery series and its own baseline are
//! consulted here; explanatory factors come in later, during attribution.

use std::ops::Range;

use chrono::NaiveDate;
use serde::Serialize;

use crate::baseline::BaselineTable;
use crate::config::AnalysisConfig;
use crate::models::{DailyRecord, DipKind, Metric};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DipEvent {
    pub date: NaiveDate,
    pub kind: DipKind,
    /// Standardized shortfall below baseline (positive means worse).
    pub z: f64,
    pub recovery_value: f64,
    pub baseline_mean: f64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DipDetection {
    /// One entry per window day, in window order.
    pub kinds: Vec<DipKind>,
    pub events: Vec<DipEvent>,
}

impl DipDetection {
    pub fn dip_count(&self) -> usize {
        self.events.len()
    }

    pub fn large_count(&self) -> usize {
        self.count_kind(DipKind::Large)
    }

    pub fn persistent_count(&self) -> usize {
        self.count_kind(DipKind::Persistent)
    }

    fn count_kind(&self, kind: DipKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

struct ScoredDay {
    shortfall: f64,
    recovery_value: f64,
    baseline_mean: f64,
}

pub fn detect_dips(
    records: &[DailyRecord],
    window: Range<usize>,
    baselines: &BaselineTable,
    config: &AnalysisConfig,
) -> DipDetection {
    let scored: Vec<Option<ScoredDay>> = window
        .clone()
        .map(|index| {
            let value = records[index].value(Metric::Recovery)?;
            let baseline = baselines.get(index, Metric::Recovery)?;
            if !baseline.is_scorable() {
                return None;
            }
            Some(ScoredDay {
                shortfall: -baseline.z_score(value),
                recovery_value: value,
                baseline_mean: baseline.mean,
            })
        })
        .collect();

    let mut kinds = vec![DipKind::None; scored.len()];

    for (kind, day) in kinds.iter_mut().zip(&scored) {
        if matches!(day, Some(d) if d.shortfall >= config.large_dip_z) {
            *kind = DipKind::Large;
        }
    }

    // A run is broken by any day that is unscored or above the sustained threshold.
    let mut run_start: Option<usize> = None;
    for offset in 0..=scored.len() {
        let in_run = scored
            .get(offset)
            .and_then(|d| d.as_ref())
            .is_some_and(|d| d.shortfall >= config.persistent_dip_z);

        match (in_run, run_start) {
            (true, None) => run_start = Some(offset),
            (false, Some(start)) => {
                if offset - start >= config.persistent_min_days {
                    for kind in &mut kinds[start..offset] {
                        if *kind != DipKind::Large {
                            *kind = DipKind::Persistent;
                        }
                    }
                }
                run_start = None;
            }
            _ => {}
        }
    }

    let events = window
        .zip(kinds.iter().zip(&scored))
        .filter_map(|(index, (kind, day))| {
            let day = day.as_ref()?;
            kind.is_dip().then(|| DipEvent {
                date: records[index].date,
                kind: *kind,
                z: day.shortfall,
                recovery_value: day.recovery_value,
                baseline_mean: day.baseline_mean,
                magnitude: day.baseline_mean - day.recovery_value,
            })
        })
        .collect();

    DipDetection { kinds, events }
}
