//! Overlap detection over accepted bookings.
//!
//! Pure and deterministic: given a candidate interval and a snapshot of
//! existing records, report every accepted record whose slot span
//! intersects the candidate's. Only `ACCEPTED` records participate, and a
//! record is never compared against itself (the `exclude` id).

use crate::models::{ConflictRef, Interval, Record, RecordId, Status};

/// Every accepted record (other than `exclude`) whose interval shares at
/// least one `(date, session)` slot with `candidate`.
///
/// Returns all conflicting records, not just the first, in pool order. A
/// candidate with no start date yields no conflicts: the check is skipped,
/// not treated as a wildcard overlap.
pub fn find_conflicts(
    candidate: &Interval,
    exclude: Option<RecordId>,
    pool: &[Record],
) -> Vec<ConflictRef> {
    if candidate.slot_range().is_none() {
        return Vec::new();
    }
    pool.iter()
        .filter(|r| r.status == Status::Accepted)
        .filter(|r| exclude != Some(r.id))
        .filter(|r| candidate.overlaps(&r.interval()))
        .map(|r| ConflictRef {
            id: r.id,
            name: r.name.clone(),
        })
        .collect()
}
