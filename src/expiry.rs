//! Auto-expiry of lapsed active records.
//!
//! Runs opportunistically on every board synchronization cycle, never on a
//! timer: a record whose event end date has passed while it sat in `NEW`
//! or `FOLLOW` is swept into the terminal `LOST` state. Detection is lazy,
//! so a lapsed record may render in its stale column until the next sync.

use chrono::NaiveDate;

use crate::models::{Record, RecordId, Status};

/// Whether `record` has silently lapsed as of `today`.
///
/// Only `NEW` and `FOLLOW` records with an end date are eligible, and the
/// comparison is calendar-date only: an end date equal to today is NOT yet
/// expired, only strictly-past end dates are.
pub fn lapsed(record: &Record, today: NaiveDate) -> bool {
    matches!(record.status, Status::New | Status::Follow)
        && record.end_date.is_some_and(|end| end < today)
}

/// Ids of every lapsed record in a fetched snapshot. The caller issues the
/// guard-free `LOST` transitions; this function decides only.
pub fn sweep<'a>(records: impl IntoIterator<Item = &'a Record>, today: NaiveDate) -> Vec<RecordId> {
    records
        .into_iter()
        .filter(|r| lapsed(r, today))
        .map(|r| r.id)
        .collect()
}
