//! Optimistic transition coordinator.
//!
//! Drives a single user-initiated move: apply the visual change first,
//! ask the remote authority second, and reconcile its answer — commit,
//! or revert plus a conflict prompt, or revert plus a failure notice.
//!
//! Intake ([`begin_move`]) is synchronous so the busy-flag check and the
//! optimistic move happen before any await point; completion
//! ([`finish_move`]) applies the server's verdict. [`request_move`] is
//! the plain begin-await-finish composition.

use tracing::{debug, warn};

use super::{BoardContext, BoardEvent, ConflictPrompt};
use crate::client::RecordStore;
use crate::errors::ClientError;
use crate::lifecycle::TransitionOutcome;
use crate::models::{RecordId, Status};

/// An in-flight move: enough to revert if the authority says no.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveTicket {
    pub id: RecordId,
    pub from: Status,
    pub target: Status,
}

/// Start a move attempt: no-op if one is already in flight for this
/// record (rapid double drag), if the record is unknown, or if the move
/// is within the same column. On success the card is already sitting in
/// the target column when this returns — before any server contact.
pub fn begin_move(ctx: &mut BoardContext, id: RecordId, target: Status) -> Option<MoveTicket> {
    if ctx.busy.contains(&id) {
        debug!(id, "move ignored: transition already in flight");
        return None;
    }
    let current = ctx.status_of(id)?;
    if current == target {
        return None;
    }
    // A fresh attempt obsoletes any conflict prompt left over for this card.
    if ctx.pending.as_ref().is_some_and(|p| p.record_id == id) {
        ctx.pending = None;
    }
    ctx.notice = None;
    ctx.busy.insert(id);
    ctx.move_card(id, target);
    Some(MoveTicket {
        id,
        from: current,
        target,
    })
}

/// Apply the authority's verdict for a move started with [`begin_move`].
pub fn finish_move(
    ctx: &mut BoardContext,
    ticket: MoveTicket,
    outcome: Result<TransitionOutcome, ClientError>,
) -> BoardEvent {
    ctx.busy.remove(&ticket.id);
    match outcome {
        Ok(TransitionOutcome::Applied) => {
            // The optimistic move stands; nothing to redraw.
            BoardEvent::TransitionConfirmed {
                id: ticket.id,
                target: ticket.target,
            }
        }
        Ok(TransitionOutcome::Conflict(conflicts)) => {
            ctx.move_card(ticket.id, ticket.from);
            ctx.pending = Some(ConflictPrompt {
                record_id: ticket.id,
                target: ticket.target,
                conflicts: conflicts.clone(),
            });
            BoardEvent::TransitionRejected {
                id: ticket.id,
                conflicts,
            }
        }
        Err(err) => {
            ctx.move_card(ticket.id, ticket.from);
            let reason = err.to_string();
            warn!(id = ticket.id, %reason, "transition failed; move reverted");
            ctx.notice = Some(reason.clone());
            BoardEvent::TransitionFailed {
                id: ticket.id,
                reason,
            }
        }
    }
}

/// One full optimistic move against the remote authority.
pub async fn request_move(
    ctx: &mut BoardContext,
    store: &dyn RecordStore,
    id: RecordId,
    target: Status,
) -> BoardEvent {
    let Some(ticket) = begin_move(ctx, id, target) else {
        return BoardEvent::MoveIgnored { id };
    };
    let outcome = store.update_status(id, target, false).await;
    finish_move(ctx, ticket, outcome)
}

/// "Proceed anyway": re-issue the refused transition with the override
/// flag. The caller performs a full re-sync after a successful override.
/// Returns `None` when no conflict prompt is open.
pub async fn confirm_override(
    ctx: &mut BoardContext,
    store: &dyn RecordStore,
) -> Option<BoardEvent> {
    let prompt = ctx.pending.take()?;
    let id = prompt.record_id;
    ctx.busy.insert(id);
    let outcome = store.update_status(id, prompt.target, true).await;
    ctx.busy.remove(&id);
    Some(match outcome {
        Ok(TransitionOutcome::Applied) => {
            ctx.move_card(id, prompt.target);
            BoardEvent::OverrideApplied {
                id,
                target: prompt.target,
            }
        }
        Ok(TransitionOutcome::Conflict(conflicts)) => {
            // The authority refused even with the override flag; keep the
            // prompt open with the fresh conflict list.
            ctx.pending = Some(ConflictPrompt {
                record_id: id,
                target: prompt.target,
                conflicts: conflicts.clone(),
            });
            BoardEvent::TransitionRejected { id, conflicts }
        }
        Err(err) => {
            let reason = err.to_string();
            warn!(id, %reason, "override failed");
            ctx.notice = Some(reason.clone());
            BoardEvent::TransitionFailed { id, reason }
        }
    })
}

/// Dismissing the prompt is an explicit cancel: the reverted state stands
/// and no further action is taken.
pub fn dismiss_conflict(ctx: &mut BoardContext) -> Option<BoardEvent> {
    let prompt = ctx.pending.take()?;
    Some(BoardEvent::ConflictCancelled {
        id: prompt.record_id,
    })
}
