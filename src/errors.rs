//! Typed error hierarchy for the booking board.
//!
//! Two enums cover the two halves:
//! - `StoreError` — record-store (server-side) failures
//! - `ClientError` — remote-call failures as seen by the board client
//!
//! A scheduling conflict is deliberately NOT an error in either taxonomy:
//! it is a legitimate business outcome (`TransitionOutcome::Conflict`)
//! that requires user input, not a failure.

use thiserror::Error;

use crate::models::{RecordId, Status};

/// Errors from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record {id} not found")]
    RecordNotFound { id: RecordId },

    #[error("Illegal transition {from} -> {to}")]
    IllegalTransition { from: Status, to: Status },

    #[error("Invalid session '{value}'")]
    InvalidSession { value: String },

    #[error("Invalid date '{value}'")]
    InvalidDate { value: String },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

/// Remote-call failures as seen by the board client. Every variant maps to
/// the same user-visible behavior: revert the optimistic change and show a
/// notice; none is retried automatically.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Record not found")]
    NotFound,

    #[error("Rejected: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
