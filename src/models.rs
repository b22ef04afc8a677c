use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One calendar day of observations for a single user. `None` means the
/// metric was not measured that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub recovery_value: Option<f64>,
    pub sleep_duration: Option<f64>,
    pub sleep_consistency: Option<f64>,
    pub exercise_value: Option<f64>,
    pub nutrition_value: Option<f64>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            recovery_value: None,
            sleep_duration: None,
            sleep_consistency: None,
            exercise_value: None,
            nutrition_value: None,
        }
    }

    /// Non-finite values are treated the same as missing ones.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        let raw = match metric {
            Metric::Recovery => self.recovery_value,
            Metric::SleepDuration => self.sleep_duration,
            Metric::SleepConsistency => self.sleep_consistency,
            Metric::Exercise => self.exercise_value,
            Metric::Nutrition => self.nutrition_value,
        };
        raw.filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Recovery,
    SleepDuration,
    SleepConsistency,
    Exercise,
    Nutrition,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Recovery,
        Metric::SleepDuration,
        Metric::SleepConsistency,
        Metric::Exercise,
        Metric::Nutrition,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Recovery => "recovery_value",
            Metric::SleepDuration => "sleep_duration",
            Metric::SleepConsistency => "sleep_consistency",
            Metric::Exercise => "exercise_value",
            Metric::Nutrition => "nutrition_value",
        }
    }
}

/// Which side of the baseline a factor has to move to plausibly hurt recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn matches(self, signed_z: f64) -> bool {
        match self {
            Direction::Above => signed_z > 0.0,
            Direction::Below => signed_z < 0.0,
        }
    }
}

/// Explanatory factor categories. Declaration order is the fixed precedence
/// used to break attribution ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorKey {
    Sleep,
    Exercise,
    Nutrition,
}

impl FactorKey {
    pub const ALL: [FactorKey; 3] = [FactorKey::Sleep, FactorKey::Exercise, FactorKey::Nutrition];

    pub fn precedence(self) -> usize {
        self as usize
    }

    pub fn metrics(self) -> &'static [Metric] {
        match self {
            FactorKey::Sleep => &[Metric::SleepDuration, Metric::SleepConsistency],
            FactorKey::Exercise => &[Metric::Exercise],
            FactorKey::Nutrition => &[Metric::Nutrition],
        }
    }

    pub fn harmful_direction(self) -> Direction {
        match self {
            FactorKey::Exercise => Direction::Above,
            FactorKey::Sleep | FactorKey::Nutrition => Direction::Below,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FactorKey::Sleep => "sleep",
            FactorKey::Exercise => "exercise",
            FactorKey::Nutrition => "nutrition",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FactorKey::Sleep => "Sleep",
            FactorKey::Exercise => "Exercise",
            FactorKey::Nutrition => "Nutrition",
        }
    }
}

impl fmt::Display for FactorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DipKind {
    #[default]
    None,
    Large,
    Persistent,
}

impl DipKind {
    pub fn is_dip(self) -> bool {
        self != DipKind::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DipKind::None => "none",
            DipKind::Large => "large",
            DipKind::Persistent => "persistent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    Low,
    Medium,
    High,
}

impl SignalStrength {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalStrength::Low => "low",
            SignalStrength::Medium => "medium",
            SignalStrength::High => "high",
        }
    }
}

/// A value per factor, serialized as `{sleep, exercise, nutrition}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorMap<T> {
    pub sleep: T,
    pub exercise: T,
    pub nutrition: T,
}

impl<T> FactorMap<T> {
    pub fn from_fn(mut f: impl FnMut(FactorKey) -> T) -> Self {
        Self {
            sleep: f(FactorKey::Sleep),
            exercise: f(FactorKey::Exercise),
            nutrition: f(FactorKey::Nutrition),
        }
    }

    pub fn get(&self, key: FactorKey) -> &T {
        match key {
            FactorKey::Sleep => &self.sleep,
            FactorKey::Exercise => &self.exercise,
            FactorKey::Nutrition => &self.nutrition,
        }
    }

    pub fn get_mut(&mut self, key: FactorKey) -> &mut T {
        match key {
            FactorKey::Sleep => &mut self.sleep,
            FactorKey::Exercise => &mut self.exercise,
            FactorKey::Nutrition => &mut self.nutrition,
        }
    }
}
