//! Data model for the append-only claim sheet.
//!
//! The sheet is a log of `(number, claimant, timestamp)` rows. Readers never
//! look at the log directly; they project it onto a [`ClaimSnapshot`] (the set
//! of taken numbers plus the number each claimant holds). Nothing here
//! guarantees uniqueness: two claimants racing for the same number can both
//! append, and the later row simply shadows the earlier one in the projection.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column holding the claimed number.
pub const NUMBER_COLUMN: usize = 0;
/// Column holding the claimant name.
pub const CLAIMANT_COLUMN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClaimRecord {
    pub number: u32,
    pub claimant: String,
    pub timestamp: DateTime<Utc>,
}

impl ClaimRecord {
    pub fn new(number: u32, claimant: impl Into<String>) -> Self {
        Self {
            number,
            claimant: claimant.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Projection of the claim log onto the numbers it has taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSnapshot {
    pub claimed: BTreeSet<u32>,
    pub claimants: BTreeMap<String, u32>,
}

impl ClaimSnapshot {
    /// Projects every record, unfiltered. Readers apply their own number range.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ClaimRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.record(record.number, &record.claimant);
        }
        snapshot
    }

    /// Builds a snapshot from raw sheet rows. The first row is a header.
    ///
    /// Rows whose number cell does not parse, or falls outside `range`, are
    /// ignored. A blank claimant cell still marks the number as taken.
    pub fn from_rows<R, C>(rows: &[R], range: RangeInclusive<u32>) -> Self
    where
        R: AsRef<[C]>,
        C: AsRef<str>,
    {
        let mut snapshot = Self::default();
        for row in rows.iter().skip(1) {
            let row = row.as_ref();
            let Some(number) = row
                .get(NUMBER_COLUMN)
                .and_then(|cell| cell.as_ref().trim().parse::<u32>().ok())
            else {
                continue;
            };
            if !range.contains(&number) {
                continue;
            }
            let claimant = row
                .get(CLAIMANT_COLUMN)
                .map(|cell| cell.as_ref().trim())
                .unwrap_or_default();
            snapshot.record(number, claimant);
        }
        snapshot
    }

    fn record(&mut self, number: u32, claimant: &str) {
        self.claimed.insert(number);
        if !claimant.is_empty() {
            self.claimants.insert(claimant.to_string(), number);
        }
    }

    pub fn is_claimed(&self, number: u32) -> bool {
        self.claimed.contains(&number)
    }

    pub fn number_for(&self, claimant: &str) -> Option<u32> {
        self.claimants.get(claimant).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReceipt {
    pub success: bool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("claim store unavailable: {0}")]
    Unavailable(String),
    #[error("claim store answered with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed claim sheet payload: {0}")]
    Malformed(String),
}

/// Persistence collaborator consulted by the claim board.
pub trait ClaimStore: Send + Sync {
    fn fetch_claimed(&self) -> impl Future<Output = Result<ClaimSnapshot, StoreError>> + Send;

    fn append_claim(
        &self,
        number: u32,
        claimant: &str,
    ) -> impl Future<Output = Result<AppendReceipt, StoreError>> + Send;
}

impl<T: ClaimStore> ClaimStore for Arc<T> {
    fn fetch_claimed(&self) -> impl Future<Output = Result<ClaimSnapshot, StoreError>> + Send {
        (**self).fetch_claimed()
    }

    fn append_claim(
        &self,
        number: u32,
        claimant: &str,
    ) -> impl Future<Output = Result<AppendReceipt, StoreError>> + Send {
        (**self).append_claim(number, claimant)
    }
}

/// In-process claim log, used when no sheet is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryClaimStore {
    records: Mutex<Vec<ClaimRecord>>,
    offline: AtomicBool,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ClaimRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulates the backing service going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Appends a row as if another client had written it.
    pub fn push(&self, record: ClaimRecord) {
        self.lock().push(record);
    }

    pub fn records(&self) -> Vec<ClaimRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ClaimRecord>> {
        // A poisoned log is still a valid log; the panicking writer never
        // leaves a half-pushed record behind.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }
}

impl ClaimStore for MemoryClaimStore {
    fn fetch_claimed(&self) -> impl Future<Output = Result<ClaimSnapshot, StoreError>> + Send {
        let result = self
            .check_online()
            .map(|()| ClaimSnapshot::from_records(self.lock().iter()));
        async move { result }
    }

    fn append_claim(
        &self,
        number: u32,
        claimant: &str,
    ) -> impl Future<Output = Result<AppendReceipt, StoreError>> + Send {
        let result = self.check_online().map(|()| {
            self.push(ClaimRecord::new(number, claimant));
            AppendReceipt { success: true }
        });
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn parses_rows_skipping_header_and_out_of_range() {
        let rows = rows(&[
            &["Number", "Timestamp", "Agent", "Note", "Claimant"],
            &["7", "2026-01-01T00:00:00Z", "", "", "Alice"],
            &["abc", "", "", "", "Mallory"],
            &["101", "", "", "", "Bob"],
            &[" 42 ", ""],
        ]);
        let snapshot = ClaimSnapshot::from_rows(&rows, 1..=100);
        assert_eq!(snapshot.claimed, BTreeSet::from([7, 42]));
        assert_eq!(snapshot.number_for("Alice"), Some(7));
        assert_eq!(snapshot.number_for("Bob"), None);
        assert_eq!(snapshot.number_for("Mallory"), None);
    }

    #[test]
    fn later_rows_shadow_earlier_claimant_entries() {
        let records = [ClaimRecord::new(3, "Alice"), ClaimRecord::new(9, "Alice")];
        let snapshot = ClaimSnapshot::from_records(records.iter());
        assert!(snapshot.is_claimed(3));
        assert!(snapshot.is_claimed(9));
        assert_eq!(snapshot.number_for("Alice"), Some(9));
    }

    #[test]
    fn record_serializes_with_kebab_case_keys() {
        let record = ClaimRecord::new(12, "Erin");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["number"], 12);
        assert_eq!(value["claimant"], "Erin");
        let back: ClaimRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn memory_store_appends_and_goes_offline() {
        let store = MemoryClaimStore::new();
        let receipt = store.append_claim(5, "Carol").await.unwrap();
        assert!(receipt.success);
        assert!(store.fetch_claimed().await.unwrap().is_claimed(5));

        store.set_offline(true);
        assert!(matches!(
            store.fetch_claimed().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.append_claim(6, "Dan").await.is_err());
        assert_eq!(store.records().len(), 1);
    }
}
