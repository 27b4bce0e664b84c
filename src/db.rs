use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};

use crate::errors::StoreError;
use crate::lifecycle::{self, Decision, TransitionOutcome};
use crate::models::*;

/// Default prefix for generated project codes.
pub const DEFAULT_CODE_PREFIX: &str = "BK";

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct BoardDb {
    conn: Connection,
    code_prefix: String,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path, code_prefix: &str) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self {
            conn,
            code_prefix: code_prefix.to_string(),
        };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self {
            conn,
            code_prefix: DEFAULT_CODE_PREFIX.to_string(),
        };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_code TEXT UNIQUE,
                    name TEXT NOT NULL,
                    phone TEXT NOT NULL DEFAULT '',
                    email TEXT NOT NULL DEFAULT '',
                    event_place TEXT NOT NULL DEFAULT '',
                    event_type TEXT NOT NULL DEFAULT '',
                    amount REAL NOT NULL DEFAULT 0,
                    advance_amount REAL NOT NULL DEFAULT 0,
                    followup_date TEXT,
                    start_date TEXT,
                    start_session TEXT NOT NULL DEFAULT 'MOR',
                    end_date TEXT,
                    end_session TEXT NOT NULL DEFAULT 'EVE',
                    status TEXT NOT NULL DEFAULT 'NEW',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_records_status ON records(status);
                CREATE INDEX IF NOT EXISTS idx_records_schedule
                    ON records(status, start_date, start_session);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Next project code for this store: highest existing numeric suffix
    /// under the configured prefix, plus one.
    fn next_project_code(&self) -> Result<String> {
        let mut stmt = self
            .conn
            .prepare("SELECT project_code FROM records WHERE project_code LIKE ?1")
            .context("Failed to prepare code query")?;
        let pattern = format!("{}%", self.code_prefix);
        let rows = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))
            .context("Failed to query project codes")?;
        let mut max = 0u32;
        for row in rows {
            let code = row.context("Failed to read code row")?;
            if let Ok(n) = code[self.code_prefix.len()..].parse::<u32>() {
                max = max.max(n);
            }
        }
        Ok(format!("{}{:03}", self.code_prefix, max + 1))
    }

    // ── Record CRUD ───────────────────────────────────────────────────

    pub fn create_record(&self, draft: &RecordDraft) -> Result<Record> {
        let code = self.next_project_code()?;
        self.conn
            .execute(
                "INSERT INTO records (project_code, name, phone, email, event_place, event_type,
                                      amount, advance_amount, followup_date,
                                      start_date, start_session, end_date, end_session, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'NEW')",
                params![
                    code,
                    draft.name,
                    draft.phone,
                    draft.email,
                    draft.event_place,
                    draft.event_type,
                    draft.amount,
                    draft.advance_amount,
                    draft.followup_date.map(|d| d.to_string()),
                    draft.start_date.map(|d| d.to_string()),
                    draft.start_session.as_str(),
                    draft.end_date.map(|d| d.to_string()),
                    draft.end_session.as_str(),
                ],
            )
            .context("Failed to insert record")?;
        let id = self.conn.last_insert_rowid();
        self.get_record(id)?
            .context("Record not found after insert")
    }

    pub fn get_record(&self, id: RecordId) -> Result<Option<Record>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", SELECT_RECORD))
            .context("Failed to prepare get_record")?;
        let mut rows = stmt
            .query_map(params![id], row_to_raw)
            .context("Failed to query record")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read record row")?.into_record()?)),
            None => Ok(None),
        }
    }

    pub fn update_record(&self, id: RecordId, draft: &RecordDraft) -> Result<Record, StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE records SET name = ?1, phone = ?2, email = ?3, event_place = ?4,
                        event_type = ?5, amount = ?6, advance_amount = ?7, followup_date = ?8,
                        start_date = ?9, start_session = ?10, end_date = ?11, end_session = ?12
                 WHERE id = ?13",
                params![
                    draft.name,
                    draft.phone,
                    draft.email,
                    draft.event_place,
                    draft.event_type,
                    draft.amount,
                    draft.advance_amount,
                    draft.followup_date.map(|d| d.to_string()),
                    draft.start_date.map(|d| d.to_string()),
                    draft.start_session.as_str(),
                    draft.end_date.map(|d| d.to_string()),
                    draft.end_session.as_str(),
                    id,
                ],
            )
            .map_err(|e| StoreError::Database(e.into()))?;
        if updated == 0 {
            return Err(StoreError::RecordNotFound { id });
        }
        self.get_record(id)
            .map_err(StoreError::Database)?
            .ok_or(StoreError::RecordNotFound { id })
    }

    pub fn delete_record(&self, id: RecordId) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM records WHERE id = ?1", params![id])
            .context("Failed to delete record")?;
        Ok(deleted > 0)
    }

    /// All records grouped by status, newest first within each column. A
    /// non-empty query narrows the set with a case-insensitive substring
    /// match over name, phone, email, event type, event place, and status.
    pub fn list_records(&self, query: &str) -> Result<BoardColumns> {
        let query = query.trim();
        let mut columns = BoardColumns::default();
        let rows: Vec<RecordRow> = if query.is_empty() {
            let mut stmt = self
                .conn
                .prepare(&format!("{} ORDER BY id DESC", SELECT_RECORD))
                .context("Failed to prepare list_records")?;
            let mapped = stmt
                .query_map([], row_to_raw)
                .context("Failed to query records")?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read record rows")?
        } else {
            let mut stmt = self
                .conn
                .prepare(&format!(
                    "{} WHERE name LIKE ?1 OR phone LIKE ?1 OR email LIKE ?1
                        OR event_type LIKE ?1 OR event_place LIKE ?1 OR status LIKE ?1
                     ORDER BY id DESC",
                    SELECT_RECORD
                ))
                .context("Failed to prepare filtered list_records")?;
            let pattern = format!("%{}%", query);
            let mapped = stmt
                .query_map(params![pattern], row_to_raw)
                .context("Failed to query records")?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read record rows")?
        };
        for row in rows {
            columns.push(row.into_record()?);
        }
        Ok(columns)
    }

    /// The pool the overlap guard checks candidates against.
    pub fn list_accepted(&self) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE status = 'ACCEPTED' ORDER BY id", SELECT_RECORD))
            .context("Failed to prepare list_accepted")?;
        let rows = stmt
            .query_map([], row_to_raw)
            .context("Failed to query accepted records")?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("Failed to read record row")?.into_record()?);
        }
        Ok(records)
    }

    /// Attempt a lifecycle transition. The state machine decides; only an
    /// `Apply` decision touches the database. A refusal leaves the stored
    /// status untouched and reports the conflicting records.
    pub fn update_status(
        &self,
        id: RecordId,
        target: Status,
        overridden: bool,
    ) -> Result<TransitionOutcome, StoreError> {
        let record = self
            .get_record(id)
            .map_err(StoreError::Database)?
            .ok_or(StoreError::RecordNotFound { id })?;
        let pool = self.list_accepted().map_err(StoreError::Database)?;

        match lifecycle::review(&record, target, overridden, &pool) {
            Decision::Illegal => Err(StoreError::IllegalTransition {
                from: record.status,
                to: target,
            }),
            Decision::Refuse(conflicts) => Ok(TransitionOutcome::Conflict(conflicts)),
            Decision::Apply => {
                self.conn
                    .execute(
                        "UPDATE records SET status = ?1 WHERE id = ?2",
                        params![target.as_str(), id],
                    )
                    .map_err(|e| StoreError::Database(e.into()))?;
                Ok(TransitionOutcome::Applied)
            }
        }
    }

    /// Conflict check for a candidate interval, without touching any record.
    pub fn check_conflicts(
        &self,
        candidate: &Interval,
        exclude: Option<RecordId>,
    ) -> Result<Vec<ConflictRef>> {
        let pool = self.list_accepted()?;
        Ok(crate::schedule::find_conflicts(candidate, exclude, &pool))
    }

    /// Aggregate dashboard figures.
    pub fn amounts(&self) -> Result<AmountSummary> {
        let (total_records, total_amount): (i64, f64) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM records",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Failed to aggregate totals")?;
        let status_total = |status: Status| -> Result<f64> {
            self.conn
                .query_row(
                    "SELECT COALESCE(SUM(amount), 0) FROM records WHERE status = ?1",
                    params![status.as_str()],
                    |row| row.get(0),
                )
                .context("Failed to aggregate status total")
        };
        Ok(AmountSummary {
            total_records,
            total_amount,
            accepted_amount: status_total(Status::Accepted)?,
            lost_amount: status_total(Status::Lost)?,
        })
    }
}

const SELECT_RECORD: &str = "SELECT id, project_code, name, phone, email, event_place, event_type,
        amount, advance_amount, followup_date, start_date, start_session,
        end_date, end_session, status, created_at FROM records";

/// Raw row shape before TEXT columns are parsed into domain types.
struct RecordRow {
    id: i64,
    project_code: Option<String>,
    name: String,
    phone: String,
    email: String,
    event_place: String,
    event_type: String,
    amount: f64,
    advance_amount: f64,
    followup_date: Option<String>,
    start_date: Option<String>,
    start_session: String,
    end_date: Option<String>,
    end_session: String,
    status: String,
    created_at: String,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        project_code: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        event_place: row.get(5)?,
        event_type: row.get(6)?,
        amount: row.get(7)?,
        advance_amount: row.get(8)?,
        followup_date: row.get(9)?,
        start_date: row.get(10)?,
        start_session: row.get(11)?,
        end_date: row.get(12)?,
        end_session: row.get(13)?,
        status: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(s) => s
            .parse::<NaiveDate>()
            .map(Some)
            .with_context(|| format!("Invalid stored date '{}'", s)),
    }
}

impl RecordRow {
    fn into_record(self) -> Result<Record> {
        Ok(Record {
            id: self.id,
            project_code: self.project_code,
            name: self.name,
            phone: self.phone,
            email: self.email,
            event_place: self.event_place,
            event_type: self.event_type,
            amount: self.amount,
            advance_amount: self.advance_amount,
            followup_date: parse_date(self.followup_date)?,
            start_date: parse_date(self.start_date)?,
            start_session: Session::from_str(&self.start_session)
                .map_err(|e| anyhow::anyhow!(e))?,
            end_date: parse_date(self.end_date)?,
            end_session: Session::from_str(&self.end_session).map_err(|e| anyhow::anyhow!(e))?,
            status: Status::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            created_at: self.created_at,
        })
    }
}
