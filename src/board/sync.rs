//! Board synchronization cycle.
//!
//! Every sync is a full rebuild: fetch the categorized record set, run the
//! auto-expiry sweep over it, replace every column wholesale, and
//! recompute filter visibility. There is no incremental diffing and no
//! client-side cache across cycles — the snapshot is always replaceable.
//!
//! Search input is debounced trailing-edge; a newer search supersedes the
//! in-flight fetch via an explicit cancellation token, and a response that
//! lost the race is discarded rather than applied.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BoardCommand, BoardContext, BoardEvent, coordinator};
use crate::client::RecordStore;
use crate::errors::ClientError;
use crate::expiry;
use crate::lifecycle::TransitionOutcome;
use crate::models::{BoardColumns, Status};

/// Trailing-edge debounce window for search input.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Trailing-edge debounce state: only the most recent ticket is allowed
/// to fire a request.
struct SearchDebounce {
    delay: Duration,
    ticket: u64,
    query: String,
}

impl SearchDebounce {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            ticket: 0,
            query: String::new(),
        }
    }

    /// Record a keystroke; the returned ticket is only valid until the
    /// next one.
    fn submit(&mut self, query: String) -> u64 {
        self.ticket += 1;
        self.query = query;
        self.ticket
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.ticket == ticket
    }
}

/// Run a fetch under a cancellation token. `None` means the fetch was
/// superseded and its (stale) response must not be applied.
async fn fetch_guarded(
    store: &dyn RecordStore,
    query: &str,
    token: &CancellationToken,
) -> Option<Result<BoardColumns, ClientError>> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = store.list(query) => Some(result),
    }
}

/// The client's single logical thread of control: owns the board context
/// and dispatches every command through one reducer-like handler.
pub struct BoardSession {
    store: Arc<dyn RecordStore>,
    pub ctx: BoardContext,
    generation: u64,
    inflight: Option<CancellationToken>,
    search: SearchDebounce,
}

impl BoardSession {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_debounce(store, SEARCH_DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<dyn RecordStore>, delay: Duration) -> Self {
        Self {
            store,
            ctx: BoardContext::new(),
            generation: 0,
            inflight: None,
            search: SearchDebounce::new(delay),
        }
    }

    /// Dispatch a command using the local calendar date for expiry checks.
    pub async fn handle(&mut self, command: BoardCommand) -> Vec<BoardEvent> {
        self.handle_at(command, Local::now().date_naive()).await
    }

    /// Dispatch a command with an explicit "today" (test seam).
    pub async fn handle_at(&mut self, command: BoardCommand, today: NaiveDate) -> Vec<BoardEvent> {
        match command {
            BoardCommand::MoveRequested { id, target } => {
                let store = Arc::clone(&self.store);
                vec![coordinator::request_move(&mut self.ctx, store.as_ref(), id, target).await]
            }
            BoardCommand::OverrideConfirmed => {
                let store = Arc::clone(&self.store);
                match coordinator::confirm_override(&mut self.ctx, store.as_ref()).await {
                    Some(event @ BoardEvent::OverrideApplied { .. }) => {
                        // A forced transition changed the authoritative set;
                        // rebuild from the source of truth.
                        let mut events = vec![event];
                        events.extend(self.sync_at(today).await);
                        events
                    }
                    Some(event) => vec![event],
                    None => Vec::new(),
                }
            }
            BoardCommand::ConflictDismissed => {
                coordinator::dismiss_conflict(&mut self.ctx).into_iter().collect()
            }
            BoardCommand::SearchChanged { query } => {
                let ticket = self.search.submit(query);
                vec![BoardEvent::SearchArmed { ticket }]
            }
            BoardCommand::FilterChanged(filter) => {
                self.ctx.filter = filter;
                self.ctx.apply_filter();
                vec![BoardEvent::FilterApplied {
                    hidden: self.ctx.hidden.len(),
                }]
            }
            BoardCommand::Refresh => self.sync_at(today).await,
        }
    }

    /// Wait out the debounce window for a search ticket, then sync if no
    /// newer keystroke superseded it.
    pub async fn settle_search(&mut self, ticket: u64) -> Vec<BoardEvent> {
        self.settle_search_at(ticket, Local::now().date_naive()).await
    }

    pub async fn settle_search_at(&mut self, ticket: u64, today: NaiveDate) -> Vec<BoardEvent> {
        tokio::time::sleep(self.search.delay).await;
        if !self.search.is_current(ticket) {
            debug!(ticket, "search superseded within debounce window");
            return vec![BoardEvent::SyncDiscarded];
        }
        self.ctx.query = self.search.query.clone();
        self.sync_at(today).await
    }

    /// One full synchronization cycle.
    pub async fn sync_at(&mut self, today: NaiveDate) -> Vec<BoardEvent> {
        // Abort-on-supersede: a new sync cancels the previous in-flight
        // fetch so its stale response is never applied.
        if let Some(prior) = self.inflight.take() {
            prior.cancel();
        }
        let token = CancellationToken::new();
        self.inflight = Some(token.clone());
        self.generation += 1;
        let generation = self.generation;

        let query = self.ctx.query.clone();
        let fetched = match fetch_guarded(self.store.as_ref(), &query, &token).await {
            None => return vec![BoardEvent::SyncDiscarded],
            Some(Err(err)) => {
                let reason = err.to_string();
                warn!(%reason, "board sync failed");
                self.ctx.notice = Some(reason.clone());
                return vec![BoardEvent::SyncFailed { reason }];
            }
            Some(Ok(columns)) => columns,
        };
        if generation != self.generation {
            return vec![BoardEvent::SyncDiscarded];
        }

        // Expiry sweep over every fetched record. The LOST writes are
        // fire-and-forget: this render pass still shows the stale column,
        // the next cycle shows the record in LOST.
        let lapsed = expiry::sweep(fetched.iter(), today);
        for &id in &lapsed {
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                match store.update_status(id, Status::Lost, false).await {
                    Ok(TransitionOutcome::Applied) => debug!(id, "lapsed record marked lost"),
                    // LOST is unguarded, so a conflict cannot come back.
                    Ok(TransitionOutcome::Conflict(_)) => {}
                    Err(err) => warn!(id, error = %err, "auto-expiry write failed"),
                }
            });
        }

        let total = fetched.len();
        self.ctx.replace_snapshot(fetched);
        info!(total, lapsed = lapsed.len(), "board synchronized");
        vec![BoardEvent::SyncCompleted {
            total,
            lapsed: lapsed.len(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::testing::MockStore;
    use crate::models::{Record, sample_record};
    use std::sync::atomic::Ordering;

    fn today() -> NaiveDate {
        "2024-06-10".parse().unwrap()
    }

    fn columns_of(records: Vec<Record>) -> BoardColumns {
        let mut columns = BoardColumns::default();
        for r in records {
            columns.push(r);
        }
        columns
    }

    fn follow_ending(id: i64, end: &str) -> Record {
        let mut r = sample_record(id);
        r.status = Status::Follow;
        r.end_date = Some(end.parse().unwrap());
        r
    }

    #[tokio::test]
    async fn sync_replaces_the_snapshot_wholesale() {
        let store = Arc::new(MockStore::with_columns(columns_of(vec![
            sample_record(1),
            sample_record(2),
        ])));
        let mut session = BoardSession::new(store.clone());

        let events = session.sync_at(today()).await;
        assert_eq!(events, vec![BoardEvent::SyncCompleted { total: 2, lapsed: 0 }]);
        assert_eq!(session.ctx.columns.new.len(), 2);

        // A later fetch fully overwrites the previous snapshot.
        *store.columns.lock().unwrap() = columns_of(vec![sample_record(3)]);
        session.sync_at(today()).await;
        assert!(session.ctx.find(1).is_none());
        assert!(session.ctx.find(3).is_some());
    }

    #[tokio::test]
    async fn sync_sweeps_lapsed_records_but_renders_them_stale() {
        // C lapsed yesterday; D ends today and must survive this cycle.
        let store = Arc::new(MockStore::with_columns(columns_of(vec![
            follow_ending(1, "2024-06-09"),
            follow_ending(2, "2024-06-10"),
        ])));
        let mut session = BoardSession::new(store.clone());

        let events = session.sync_at(today()).await;
        assert_eq!(events, vec![BoardEvent::SyncCompleted { total: 2, lapsed: 1 }]);

        // This render pass still shows the lapsed record in its stale column.
        assert_eq!(session.ctx.status_of(1), Some(Status::Follow));

        // The fire-and-forget LOST write went out for C only.
        tokio::task::yield_now().await;
        assert_eq!(store.status_calls(), vec![(1, Status::Lost, false)]);
    }

    #[tokio::test]
    async fn accepted_and_lost_records_are_never_swept() {
        let mut accepted = sample_record(1);
        accepted.status = Status::Accepted;
        accepted.end_date = Some("2020-01-01".parse().unwrap());
        let mut lost = sample_record(2);
        lost.status = Status::Lost;
        lost.end_date = Some("2020-01-01".parse().unwrap());
        let store = Arc::new(MockStore::with_columns(columns_of(vec![accepted, lost])));
        let mut session = BoardSession::new(store.clone());

        session.sync_at(today()).await;
        tokio::task::yield_now().await;
        assert!(store.status_calls().is_empty());
    }

    #[tokio::test]
    async fn sync_failure_sets_notice_and_keeps_old_snapshot() {
        let store = Arc::new(MockStore::with_columns(columns_of(vec![sample_record(1)])));
        let mut session = BoardSession::new(store.clone());
        session.sync_at(today()).await;

        *store.list_error.lock().unwrap() = Some("connection refused".into());
        let events = session.sync_at(today()).await;
        assert!(matches!(events[0], BoardEvent::SyncFailed { .. }));
        assert!(session.ctx.notice.is_some());
        // The previous snapshot is still on screen.
        assert!(session.ctx.find(1).is_some());
    }

    #[tokio::test]
    async fn cancelled_fetch_is_discarded_not_applied() {
        let store = MockStore::with_columns(columns_of(vec![sample_record(1)]));
        let token = CancellationToken::new();
        token.cancel();
        let result = fetch_guarded(&store, "", &token).await;
        assert!(result.is_none());
        // The guarded fetch never reached the store.
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_is_trailing_edge_only() {
        let store = Arc::new(MockStore::with_columns(BoardColumns::default()));
        let mut session = BoardSession::new(store.clone());

        // Two keystrokes inside one debounce window: only the last issues
        // a request.
        let e1 = session
            .handle_at(BoardCommand::SearchChanged { query: "as".into() }, today())
            .await;
        let t1 = match &e1[0] {
            BoardEvent::SearchArmed { ticket } => *ticket,
            other => panic!("Expected SearchArmed, got {:?}", other),
        };
        let e2 = session
            .handle_at(BoardCommand::SearchChanged { query: "asha".into() }, today())
            .await;
        let t2 = match &e2[0] {
            BoardEvent::SearchArmed { ticket } => *ticket,
            other => panic!("Expected SearchArmed, got {:?}", other),
        };

        assert_eq!(
            session.settle_search_at(t1, today()).await,
            vec![BoardEvent::SyncDiscarded]
        );
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 0);

        let events = session.settle_search_at(t2, today()).await;
        assert!(matches!(events[0], BoardEvent::SyncCompleted { .. }));
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.ctx.query, "asha");
    }

    #[tokio::test]
    async fn override_command_triggers_full_resync() {
        let mut candidate = sample_record(2);
        candidate.status = Status::New;
        let store = Arc::new(MockStore::with_columns(columns_of(vec![candidate])));
        let mut session = BoardSession::new(store.clone());
        session.sync_at(today()).await;

        store.script(Ok(TransitionOutcome::Conflict(vec![
            crate::models::ConflictRef {
                id: 1,
                name: "Client 1".into(),
            },
        ])));
        let events = session
            .handle_at(
                BoardCommand::MoveRequested {
                    id: 2,
                    target: Status::Accepted,
                },
                today(),
            )
            .await;
        assert!(matches!(events[0], BoardEvent::TransitionRejected { .. }));

        let list_calls_before = store.list_calls.load(Ordering::SeqCst);
        let events = session.handle_at(BoardCommand::OverrideConfirmed, today()).await;
        assert!(matches!(events[0], BoardEvent::OverrideApplied { .. }));
        assert!(matches!(events[1], BoardEvent::SyncCompleted { .. }));
        assert_eq!(store.list_calls.load(Ordering::SeqCst), list_calls_before + 1);
    }

    #[tokio::test]
    async fn filter_command_toggles_visibility_without_fetching() {
        let mut pricey = sample_record(1);
        pricey.amount = 90_000.0;
        let store = Arc::new(MockStore::with_columns(columns_of(vec![
            pricey,
            sample_record(2),
        ])));
        let mut session = BoardSession::new(store.clone());
        session.sync_at(today()).await;
        let fetches = store.list_calls.load(Ordering::SeqCst);

        let filter = crate::board::BoardFilter {
            max_amount: Some(50_000.0),
            ..Default::default()
        };
        let events = session
            .handle_at(BoardCommand::FilterChanged(filter), today())
            .await;
        assert_eq!(events, vec![BoardEvent::FilterApplied { hidden: 1 }]);
        assert!(!session.ctx.is_visible(1));
        assert!(session.ctx.is_visible(2));
        // Pure visibility toggle: no new request went out.
        assert_eq!(store.list_calls.load(Ordering::SeqCst), fetches);
    }
}
