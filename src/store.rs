use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::AnalyticsError;
use crate::models::DailyRecord;

/// Read-only source of a user's daily records, ascending by date.
pub trait RecordStore {
    fn load_records(&self, user_id: &str) -> Result<Vec<DailyRecord>, AnalyticsError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn load_records(&self, user_id: &str) -> Result<Vec<DailyRecord>, AnalyticsError> {
        (**self).load_records(user_id)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn load_records(&self, user_id: &str) -> Result<Vec<DailyRecord>, AnalyticsError> {
        (**self).load_records(user_id)
    }
}

/// Serves records exactly as inserted; ordering problems surface in the engine.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    users: BTreeMap<String, Vec<DailyRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>, records: Vec<DailyRecord>) -> Self {
        self.insert(user_id, records);
        self
    }

    pub fn insert(&mut self, user_id: impl Into<String>, records: Vec<DailyRecord>) {
        self.users.insert(user_id.into(), records);
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }
}

impl RecordStore for InMemoryRecordStore {
    fn load_records(&self, user_id: &str) -> Result<Vec<DailyRecord>, AnalyticsError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| AnalyticsError::UnknownUser(user_id.to_string()))
    }
}

/// One CSV line. Empty cells deserialize to `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvRecordRow {
    pub user_id: String,
    pub date: NaiveDate,
    pub recovery_value: Option<f64>,
    pub sleep_duration: Option<f64>,
    pub sleep_consistency: Option<f64>,
    pub exercise_value: Option<f64>,
    pub nutrition_value: Option<f64>,
}

impl CsvRecordRow {
    pub fn into_record(self) -> (String, DailyRecord) {
        let record = DailyRecord {
            date: self.date,
            recovery_value: self.recovery_value,
            sleep_duration: self.sleep_duration,
            sleep_consistency: self.sleep_consistency,
            exercise_value: self.exercise_value,
            nutrition_value: self.nutrition_value,
        };
        (self.user_id, record)
    }
}

pub fn read_csv_rows(path: &Path) -> anyhow::Result<Vec<CsvRecordRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<CsvRecordRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {} in {}", line + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Records loaded from a CSV export. Rows are sorted by date per user;
/// duplicate dates are kept so the engine can reject them.
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    inner: InMemoryRecordStore,
}

impl CsvRecordStore {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let mut users: BTreeMap<String, Vec<DailyRecord>> = BTreeMap::new();
        for row in read_csv_rows(path)? {
            let (user_id, record) = row.into_record();
            users.entry(user_id).or_default().push(record);
        }

        let mut inner = InMemoryRecordStore::new();
        for (user_id, mut records) in users {
            records.sort_by_key(|r| r.date);
            inner.insert(user_id, records);
        }
        tracing::debug!(path = %path.display(), users = inner.users.len(), "loaded csv record store");
        Ok(Self { inner })
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.inner.user_ids()
    }
}

impl RecordStore for CsvRecordStore {
    fn load_records(&self, user_id: &str) -> Result<Vec<DailyRecord>, AnalyticsError> {
        self.inner.load_records(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str =
        "user_id,date,recovery_value,sleep_duration,sleep_consistency,exercise_value,nutrition_value";

    fn write_csv(dir: &TempDir, rows: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("records.csv");
        let mut out = String::from(HEADER);
        out.push('\n');
        for row in rows {
            out.push_str(row);
            out.push('\n');
        }
        fs::write(&path, out).unwrap();
        path
    }

    #[test]
    fn csv_rows_group_by_user_and_sort_by_date() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            &[
                "ana,2026-01-02,61.5,7.2,0.8,320,2100",
                "ben,2026-01-01,70,,,,",
                "ana,2026-01-01,64,7.9,,300,",
            ],
        );
        let store = CsvRecordStore::from_path(&path).unwrap();

        let ana = store.load_records("ana").unwrap();
        assert_eq!(ana.len(), 2);
        assert_eq!(ana[0].date, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(ana[0].sleep_consistency, None);
        assert_eq!(ana[0].nutrition_value, None);
        assert_eq!(ana[1].exercise_value, Some(320.0));

        let ben = store.load_records("ben").unwrap();
        assert_eq!(ben[0].recovery_value, Some(70.0));
        assert_eq!(ben[0].sleep_duration, None);
        assert_eq!(store.user_ids().collect::<Vec<_>>(), vec!["ana", "ben"]);
    }

    #[test]
    fn malformed_csv_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, &["ana,not-a-date,1,2,3,4,5"]);
        assert!(CsvRecordStore::from_path(&path).is_err());
    }

    #[test]
    fn unknown_user_is_a_typed_error() {
        let store = InMemoryRecordStore::new();
        assert_eq!(
            store.load_records("ghost"),
            Err(AnalyticsError::UnknownUser("ghost".to_string()))
        );
    }
}
