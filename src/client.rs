//! Remote authority contract and its HTTP implementation.
//!
//! The board client never talks to the record store directly; everything
//! goes through the [`RecordStore`] trait so the coordinator and sync
//! cycle are testable against an in-memory fake. [`HttpStore`] is the
//! production implementation over reqwest.

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::ClientError;
use crate::lifecycle::TransitionOutcome;
use crate::models::{BoardColumns, ConflictRef, Interval, Record, RecordDraft, RecordId, Status};

/// Request/response contract the board client depends on. Mirrors the
/// server's HTTP surface; the server remains authoritative for every
/// conflict decision.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Categorized record set, optionally narrowed by a search query.
    async fn list(&self, query: &str) -> Result<BoardColumns, ClientError>;

    /// Pre-check a candidate interval without touching any record.
    async fn check_conflict(
        &self,
        candidate: &Interval,
        exclude: Option<RecordId>,
    ) -> Result<Vec<ConflictRef>, ClientError>;

    /// Request a lifecycle transition. A guard rejection comes back as
    /// `Ok(TransitionOutcome::Conflict(..))` — it is an outcome, not an
    /// error.
    async fn update_status(
        &self,
        id: RecordId,
        target: Status,
        overridden: bool,
    ) -> Result<TransitionOutcome, ClientError>;

    async fn create_record(&self, draft: &RecordDraft) -> Result<Record, ClientError>;

    async fn update_record(&self, id: RecordId, draft: &RecordDraft)
    -> Result<Record, ClientError>;

    async fn delete_record(&self, id: RecordId) -> Result<(), ClientError>;
}

/// HTTP-backed record store client.
pub struct HttpStore {
    base: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ConflictCheckBody {
    #[allow(dead_code)]
    success: bool,
    conflicts: Vec<ConflictRef>,
}

#[derive(Deserialize)]
struct ConflictRejection {
    conflicts: Vec<ConflictRef>,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Collapse every transport-level failure into `Unavailable`: the
    /// caller reverts and reports, it never retries.
    fn transport(err: reqwest::Error) -> ClientError {
        ClientError::Unavailable(err.to_string())
    }

    async fn rejection_message(resp: reqwest::Response) -> String {
        let status = resp.status();
        match resp.text().await {
            Ok(body) if !body.is_empty() => body,
            _ => status.to_string(),
        }
    }

    /// Map a non-conflict error response onto the client taxonomy.
    async fn classify_failure(resp: reqwest::Response) -> ClientError {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return ClientError::NotFound;
        }
        if status.is_client_error() {
            return ClientError::Validation(Self::rejection_message(resp).await);
        }
        ClientError::Unavailable(Self::rejection_message(resp).await)
    }
}

#[async_trait]
impl RecordStore for HttpStore {
    async fn list(&self, query: &str) -> Result<BoardColumns, ClientError> {
        let resp = self
            .http
            .get(self.url("/api/records"))
            .query(&[("q", query)])
            .send()
            .await
            .map_err(Self::transport)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        resp.json().await.map_err(Self::transport)
    }

    async fn check_conflict(
        &self,
        candidate: &Interval,
        exclude: Option<RecordId>,
    ) -> Result<Vec<ConflictRef>, ClientError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(date) = candidate.start_date {
            params.push(("date", date.to_string()));
        }
        params.push(("session", candidate.start_session.to_string()));
        if let Some(end) = candidate.end_date {
            params.push(("end_date", end.to_string()));
            params.push(("end_session", candidate.end_session.to_string()));
        }
        if let Some(id) = exclude {
            params.push(("exclude", id.to_string()));
        }

        let resp = self
            .http
            .get(self.url("/api/check-conflict"))
            .query(&params)
            .send()
            .await
            .map_err(Self::transport)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        let body: ConflictCheckBody = resp.json().await.map_err(Self::transport)?;
        Ok(body.conflicts)
    }

    async fn update_status(
        &self,
        id: RecordId,
        target: Status,
        overridden: bool,
    ) -> Result<TransitionOutcome, ClientError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/records/{}/status", id)))
            .json(&serde_json::json!({"status": target, "override": overridden}))
            .send()
            .await
            .map_err(Self::transport)?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            let body: ConflictRejection = resp.json().await.map_err(Self::transport)?;
            return Ok(TransitionOutcome::Conflict(body.conflicts));
        }
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn create_record(&self, draft: &RecordDraft) -> Result<Record, ClientError> {
        let resp = self
            .http
            .post(self.url("/api/records"))
            .json(draft)
            .send()
            .await
            .map_err(Self::transport)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        resp.json().await.map_err(Self::transport)
    }

    async fn update_record(
        &self,
        id: RecordId,
        draft: &RecordDraft,
    ) -> Result<Record, ClientError> {
        let resp = self
            .http
            .patch(self.url(&format!("/api/records/{}", id)))
            .json(draft)
            .send()
            .await
            .map_err(Self::transport)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        resp.json().await.map_err(Self::transport)
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/records/{}", id)))
            .send()
            .await
            .map_err(Self::transport)?;
        if !resp.status().is_success() {
            return Err(Self::classify_failure(resp).await);
        }
        Ok(())
    }
}
