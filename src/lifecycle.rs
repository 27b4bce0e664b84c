//! Lifecycle state machine for booking records.
//!
//! The machine is a pure decision function: it holds no state and performs
//! no writes. The record store calls [`review`] and persists the status
//! only on [`Decision::Apply`].
//!
//! Legal transitions:
//!
//! ```text
//! NEW      -> FOLLOW | ACCEPTED | LOST
//! FOLLOW   -> ACCEPTED | LOST
//! ACCEPTED -> LOST
//! LOST     -> (terminal)
//! ```
//!
//! A same-status transition is an idempotent success. The overlap guard
//! applies only when the target is `ACCEPTED` and no override was given.

use crate::models::{ConflictRef, Record, Status};
use crate::schedule;

/// Terminal result of a transition attempt, as seen by the client.
/// `Conflict` is a business outcome requiring user input, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied,
    Conflict(Vec<ConflictRef>),
}

/// Decision of the state machine for one transition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Persist the new status.
    Apply,
    /// Refuse: the overlap guard reported conflicts. Status is unchanged.
    Refuse(Vec<ConflictRef>),
    /// The transition is not in the legal table.
    Illegal,
}

/// Whether `from -> to` appears in the transition table.
pub fn is_legal(from: Status, to: Status) -> bool {
    use Status::*;
    from == to
        || matches!(
            (from, to),
            (New, Follow) | (New, Accepted) | (New, Lost) | (Follow, Accepted) | (Follow, Lost) | (Accepted, Lost)
        )
}

/// Evaluate a transition attempt against the legal table and the overlap
/// guard. `pool` is the snapshot of records the guard checks against; only
/// its `ACCEPTED` members matter and the moving record itself is excluded.
pub fn review(record: &Record, target: Status, overridden: bool, pool: &[Record]) -> Decision {
    if !is_legal(record.status, target) {
        return Decision::Illegal;
    }
    if target == Status::Accepted && !overridden {
        let conflicts = schedule::find_conflicts(&record.interval(), Some(record.id), pool);
        if !conflicts.is_empty() {
            return Decision::Refuse(conflicts);
        }
    }
    Decision::Apply
}
