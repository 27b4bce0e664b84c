use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub type RecordId = i64;

/// Lifecycle status of a booking record. Wire names are the uppercase
/// strings used by the HTTP contract (`"NEW"`, `"FOLLOW"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    New,
    Follow,
    Accepted,
    Lost,
}

impl Status {
    /// Column display order on the board.
    pub const ALL: [Status; 4] = [Status::New, Status::Follow, Status::Accepted, Status::Lost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Follow => "FOLLOW",
            Self::Accepted => "ACCEPTED",
            Self::Lost => "LOST",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "FOLLOW" => Ok(Self::Follow),
            "ACCEPTED" => Ok(Self::Accepted),
            "LOST" => Ok(Self::Lost),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Half-day scheduling slot: morning or evening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Session {
    #[serde(rename = "MOR")]
    Morning,
    #[serde(rename = "EVE")]
    Evening,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "MOR",
            Self::Evening => "EVE",
        }
    }

    /// Position of the session within its day: morning first.
    pub fn slot_index(&self) -> i64 {
        match self {
            Self::Morning => 0,
            Self::Evening => 1,
        }
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Session {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MOR" => Ok(Self::Morning),
            "EVE" => Ok(Self::Evening),
            _ => Err(format!("Invalid session: {}", s)),
        }
    }
}

/// The span of half-day slots a record occupies, derived from its
/// scheduling fields purely for overlap comparison.
///
/// A slot is a `(date, session)` pair; slots are numbered
/// `2 * days_from_ce + session_index`, so an interval is a contiguous
/// inclusive range and overlap reduces to range intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start_date: Option<NaiveDate>,
    pub start_session: Session,
    pub end_date: Option<NaiveDate>,
    pub end_session: Session,
}

fn slot(date: NaiveDate, session: Session) -> i64 {
    i64::from(date.num_days_from_ce()) * 2 + session.slot_index()
}

impl Interval {
    /// A single-slot interval, used by the conflict-check endpoint when
    /// only a start date and session are supplied.
    pub fn single(date: NaiveDate, session: Session) -> Self {
        Self {
            start_date: Some(date),
            start_session: session,
            end_date: Some(date),
            end_session: session,
        }
    }

    /// The inclusive slot range this interval occupies, or `None` when no
    /// start date is set (such an interval never conflicts with anything).
    /// A missing end date falls back to the start date; an end boundary
    /// before the start is clamped to the start slot.
    pub fn slot_range(&self) -> Option<(i64, i64)> {
        let start_date = self.start_date?;
        let start = slot(start_date, self.start_session);
        let end = slot(self.end_date.unwrap_or(start_date), self.end_session).max(start);
        Some((start, end))
    }

    /// Whether two intervals share at least one `(date, session)` slot.
    pub fn overlaps(&self, other: &Interval) -> bool {
        match (self.slot_range(), other.slot_range()) {
            (Some((a0, a1)), Some((b0, b1))) => a0 <= b1 && b0 <= a1,
            _ => false,
        }
    }
}

/// A booking record (lead). Business fields beyond the scheduling interval
/// are opaque payload carried through transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub project_code: Option<String>,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub event_place: String,
    pub event_type: String,
    pub amount: f64,
    pub advance_amount: f64,
    pub followup_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub start_session: Session,
    pub end_date: Option<NaiveDate>,
    pub end_session: Session,
    pub status: Status,
    pub created_at: String,
}

impl Record {
    pub fn interval(&self) -> Interval {
        Interval {
            start_date: self.start_date,
            start_session: self.start_session,
            end_date: self.end_date,
            end_session: self.end_session,
        }
    }

    pub fn remaining_amount(&self) -> f64 {
        self.amount - self.advance_amount
    }
}

fn default_start_session() -> Session {
    Session::Morning
}

fn default_end_session() -> Session {
    Session::Evening
}

/// Field set accepted by the add and edit endpoints. Status and project
/// code are never client-assigned: new records start in `NEW`, and status
/// changes only through the transition endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDraft {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub event_place: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub advance_amount: f64,
    #[serde(default)]
    pub followup_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default = "default_start_session")]
    pub start_session: Session,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_end_session")]
    pub end_session: Session,
}

/// A record that overlaps a candidate's interval. Transient: exists only
/// for the duration of one transition attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRef {
    pub id: RecordId,
    pub name: String,
}

/// The full record set grouped by status, as returned by the list endpoint
/// and held as the client's board snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardColumns {
    #[serde(rename = "NEW")]
    pub new: Vec<Record>,
    #[serde(rename = "FOLLOW")]
    pub follow: Vec<Record>,
    #[serde(rename = "ACCEPTED")]
    pub accepted: Vec<Record>,
    #[serde(rename = "LOST")]
    pub lost: Vec<Record>,
}

impl BoardColumns {
    pub fn column(&self, status: Status) -> &Vec<Record> {
        match status {
            Status::New => &self.new,
            Status::Follow => &self.follow,
            Status::Accepted => &self.accepted,
            Status::Lost => &self.lost,
        }
    }

    pub fn column_mut(&mut self, status: Status) -> &mut Vec<Record> {
        match status {
            Status::New => &mut self.new,
            Status::Follow => &mut self.follow,
            Status::Accepted => &mut self.accepted,
            Status::Lost => &mut self.lost,
        }
    }

    pub fn push(&mut self, record: Record) {
        self.column_mut(record.status).push(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        Status::ALL.iter().flat_map(|s| self.column(*s).iter())
    }

    pub fn len(&self) -> usize {
        Status::ALL.iter().map(|s| self.column(*s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate dashboard figures over the whole record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountSummary {
    pub total_records: i64,
    pub total_amount: f64,
    pub accepted_amount: f64,
    pub lost_amount: f64,
}

/// Minimal record fixture shared by unit tests across the crate.
#[cfg(test)]
pub(crate) fn sample_record(id: RecordId) -> Record {
    Record {
        id,
        project_code: Some(format!("BK{:03}", id)),
        name: format!("Client {}", id),
        phone: String::new(),
        email: String::new(),
        event_place: String::new(),
        event_type: "Wedding".to_string(),
        amount: 1000.0,
        advance_amount: 0.0,
        followup_date: None,
        start_date: None,
        start_session: Session::Morning,
        end_date: None,
        end_session: Session::Evening,
        status: Status::New,
        created_at: "2024-01-01 00:00:00".to_string(),
    }
}
