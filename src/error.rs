use chrono::NaiveDate;
use thiserror::Error;

/// Caller contract violations and adapter failures. Missing data and
/// zero-variance metrics are not errors; the engine degrades those in place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    #[error("window must be at least 1 day, got {0}")]
    InvalidWindow(i64),

    #[error("duplicate daily record for {0}")]
    DuplicateDate(NaiveDate),

    #[error("records out of order: {next} follows {previous}")]
    OutOfOrder { previous: NaiveDate, next: NaiveDate },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no records found for user {0}")]
    UnknownUser(String),
}
