pub mod baseline;
pub mod config;
pub mod db;
pub mod dips;
pub mod error;
pub mod evidence;
pub mod insight;
pub mod models;
pub mod pareto;
pub mod pipeline;
pub mod report;
pub mod signal;
pub mod store;

pub use config::AnalysisConfig;
pub use error::AnalyticsError;
pub use models::{DailyRecord, DipKind, FactorKey, SignalStrength};
pub use pipeline::{
    compute_dip_evidence, compute_dips, compute_summary, compute_timeseries, AttributionEngine, Summary,
    Timeseries,
};
pub use store::{CsvRecordStore, InMemoryRecordStore, RecordStore};
