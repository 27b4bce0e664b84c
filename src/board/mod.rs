//! Headless board model — the client half of the transition protocol.
//!
//! ## Overview
//!
//! The board is the client's always-replaceable snapshot of the record
//! store, organized into status columns. "Visual" state is the in-memory
//! column assignment a renderer would paint from; no DOM is involved.
//!
//! ## Module Map
//!
//! ```text
//! ┌─────────┐  BoardCommand   ┌─────────────────────────────────────────┐
//! │ Driver  │ ──────────────> │ sync.rs  (BoardSession: dispatch loop)  │
//! │ (CLI /  │ <────────────── │   ├─ coordinator.rs (optimistic moves)  │
//! │  tests) │   BoardEvent    │   └─ expiry sweep + debounced search    │
//! └─────────┘                 │            │ RecordStore trait          │
//!                             └────────────┼────────────────────────────┘
//!                                          v
//!                                 client.rs (HttpStore / mock)
//! ```
//!
//! All mutation flows through explicit commands dispatched to the session;
//! nothing is captured from ambient scope.

pub mod coordinator;
pub mod sync;

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::models::{BoardColumns, ConflictRef, Record, RecordId, Status};

/// A command issued by the user (or driver) against the board.
#[derive(Debug, Clone)]
pub enum BoardCommand {
    /// A card was dragged (or a status button pressed) toward `target`.
    MoveRequested { id: RecordId, target: Status },
    /// "Proceed anyway" on the open conflict prompt.
    OverrideConfirmed,
    /// The conflict prompt was dismissed; the reverted state stands.
    ConflictDismissed,
    /// Search input changed; the fetch is debounced.
    SearchChanged { query: String },
    /// Client-side visibility filter changed; no request is issued.
    FilterChanged(BoardFilter),
    /// Explicit full re-sync.
    Refresh,
}

/// What happened in response to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    TransitionConfirmed { id: RecordId, target: Status },
    TransitionRejected { id: RecordId, conflicts: Vec<ConflictRef> },
    TransitionFailed { id: RecordId, reason: String },
    /// A second attempt while one is in flight for the same record; not queued.
    MoveIgnored { id: RecordId },
    OverrideApplied { id: RecordId, target: Status },
    ConflictCancelled { id: RecordId },
    SearchArmed { ticket: u64 },
    SyncCompleted { total: usize, lapsed: usize },
    /// A fetch was superseded or cancelled; its response was discarded.
    SyncDiscarded,
    SyncFailed { reason: String },
    FilterApplied { hidden: usize },
}

/// The one recovery surface after a guard rejection: the conflicting
/// records' names plus a single "proceed anyway" action.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictPrompt {
    pub record_id: RecordId,
    pub target: Status,
    pub conflicts: Vec<ConflictRef>,
}

/// Client-side visibility filter, applied after render as a pure toggle
/// over already-fetched cards. Never issues a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardFilter {
    pub statuses: Option<BTreeSet<Status>>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl BoardFilter {
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&record.status) {
                return false;
            }
        }
        if let Some(min) = self.min_amount {
            if record.amount < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if record.amount > max {
                return false;
            }
        }
        if self.from_date.is_some() || self.to_date.is_some() {
            // Date range filters apply to the event start; an unscheduled
            // record cannot satisfy an active date filter.
            let Some(start) = record.start_date else {
                return false;
            };
            if self.from_date.is_some_and(|from| start < from) {
                return false;
            }
            if self.to_date.is_some_and(|to| start > to) {
                return false;
            }
        }
        true
    }
}

/// Explicit client state: the current snapshot, the per-record in-flight
/// set, the active filter, and the transient interaction surfaces.
#[derive(Default)]
pub struct BoardContext {
    pub columns: BoardColumns,
    pub busy: HashSet<RecordId>,
    pub filter: BoardFilter,
    pub hidden: HashSet<RecordId>,
    pub pending: Option<ConflictPrompt>,
    pub notice: Option<String>,
    pub query: String,
}

impl BoardContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, id: RecordId) -> Option<&Record> {
        self.columns.iter().find(|r| r.id == id)
    }

    pub fn status_of(&self, id: RecordId) -> Option<Status> {
        // The column a card sits in IS its visual status; the two are kept
        // in lockstep by take/place below.
        self.find(id).map(|r| r.status)
    }

    /// Remove a card from whichever column holds it.
    fn take_card(&mut self, id: RecordId) -> Option<Record> {
        for status in Status::ALL {
            let column = self.columns.column_mut(status);
            if let Some(pos) = column.iter().position(|r| r.id == id) {
                return Some(column.remove(pos));
            }
        }
        None
    }

    /// Place a card into the `status` column, updating its visual status.
    fn place_card(&mut self, mut record: Record, status: Status) {
        record.status = status;
        self.columns.column_mut(status).push(record);
    }

    /// Move a card between columns; returns the column it came from.
    pub(crate) fn move_card(&mut self, id: RecordId, to: Status) -> Option<Status> {
        let record = self.take_card(id)?;
        let from = record.status;
        self.place_card(record, to);
        Some(from)
    }

    /// Full rebuild from a fresh fetch: every column is replaced wholesale
    /// and filter visibility is recomputed. No incremental diffing.
    pub fn replace_snapshot(&mut self, columns: BoardColumns) {
        self.columns = columns;
        self.apply_filter();
    }

    /// Recompute the hidden set from the active filter.
    pub fn apply_filter(&mut self) {
        self.hidden = self
            .columns
            .iter()
            .filter(|r| !self.filter.matches(r))
            .map(|r| r.id)
            .collect();
    }

    pub fn is_visible(&self, id: RecordId) -> bool {
        !self.hidden.contains(&id)
    }
}
