use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::db::DbHandle;
use crate::errors::StoreError;
use crate::lifecycle::TransitionOutcome;
use crate::models::{ConflictRef, Interval, RecordDraft, RecordId, Session, Status};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct ConflictQuery {
    pub date: Option<String>,
    pub session: Option<String>,
    pub end_date: Option<String>,
    pub end_session: Option<String>,
    pub exclude: Option<RecordId>,
}

#[derive(Deserialize)]
pub struct StatusChangeRequest {
    pub status: Status,
    /// Explicit user confirmation to proceed despite reported conflicts.
    /// `force` is accepted as a legacy spelling.
    #[serde(default, alias = "force")]
    pub r#override: bool,
}

#[derive(serde::Serialize)]
pub struct ConflictCheckResponse {
    pub success: bool,
    pub conflicts: Vec<ConflictRef>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Guard rejection: a business outcome, not a failure. Maps to 409
    /// with the full conflict list so the client can display all of them.
    Conflict(Vec<ConflictRef>),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": msg}))).into_response()
            }
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": msg})),
            )
                .into_response(),
            ApiError::Conflict(conflicts) => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "success": false,
                    "conflict": true,
                    "conflicts": conflicts,
                })),
            )
                .into_response(),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": msg})),
            )
                .into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RecordNotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::IllegalTransition { .. }
            | StoreError::InvalidSession { .. }
            | StoreError::InvalidDate { .. } => ApiError::BadRequest(err.to_string()),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/records", get(list_records).post(create_record))
        .route("/api/records/{id}", patch(update_record).delete(delete_record))
        .route("/api/records/{id}/status", post(update_status))
        .route("/api/check-conflict", get(check_conflict))
        .route("/api/amounts", get(amounts))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Parse an optional session query parameter. A missing value falls back
/// to the given default; a present but unrecognized value is rejected
/// rather than silently defaulted, so a typo can never mask a conflict.
fn parse_session(value: Option<&str>, default: Session) -> Result<Session, ApiError> {
    match value {
        None | Some("") => Ok(default),
        Some(s) => Session::from_str(s).map_err(|_| {
            StoreError::InvalidSession {
                value: s.to_string(),
            }
            .into()
        }),
    }
}

fn parse_query_date(value: &str) -> Result<chrono::NaiveDate, ApiError> {
    value.parse().map_err(|_| {
        StoreError::InvalidDate {
            value: value.to_string(),
        }
        .into()
    })
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_records(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q;
    let columns = state
        .db
        .call(move |db| db.list_records(&q))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(columns))
}

async fn create_record(
    State(state): State<SharedState>,
    Json(draft): Json<RecordDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .call(move |db| db.create_record(&draft))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(id = record.id, code = ?record.project_code, "record created");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
    Json(draft): Json<RecordDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .call(move |db| Ok(db.update_record(id, &draft)))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(record))
}

async fn delete_record(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .call(move |db| db.delete_record(id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match deleted {
        true => {
            info!(id, "record deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        false => Err(ApiError::NotFound(format!("Record {} not found", id))),
    }
}

/// The authoritative transition endpoint. Success is 200; a guard
/// rejection is 409 with the conflict list; an illegal transition is 400.
async fn update_status(
    State(state): State<SharedState>,
    Path(id): Path<RecordId>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = req.status;
    let overridden = req.r#override;
    let outcome = state
        .db
        .call(move |db| Ok(db.update_status(id, target, overridden)))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    match outcome {
        TransitionOutcome::Applied => {
            info!(id, target = %target, overridden, "status updated");
            Ok(Json(serde_json::json!({"success": true})))
        }
        TransitionOutcome::Conflict(conflicts) => {
            debug!(id, count = conflicts.len(), "transition refused on conflict");
            Err(ApiError::Conflict(conflicts))
        }
    }
}

/// Pure conflict probe used by the client's add/edit pre-check. A missing
/// date means the check is skipped: `success: false` with no conflicts,
/// never a wildcard overlap.
async fn check_conflict(
    State(state): State<SharedState>,
    Query(query): Query<ConflictQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(date_str) = query.date.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(Json(ConflictCheckResponse {
            success: false,
            conflicts: Vec::new(),
        }));
    };
    let start_date = parse_query_date(date_str)?;
    let start_session = parse_session(query.session.as_deref(), Session::Morning)?;

    let candidate = match query.end_date.as_deref().filter(|s| !s.is_empty()) {
        None => Interval::single(start_date, start_session),
        Some(end_str) => Interval {
            start_date: Some(start_date),
            start_session,
            end_date: Some(parse_query_date(end_str)?),
            end_session: parse_session(query.end_session.as_deref(), Session::Evening)?,
        },
    };

    let exclude = query.exclude;
    let conflicts = state
        .db
        .call(move |db| db.check_conflicts(&candidate, exclude))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ConflictCheckResponse {
        success: true,
        conflicts,
    }))
}

async fn amounts(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .db
        .call(|db| db.amounts())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(summary))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BoardDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let db = BoardDb::new_in_memory().unwrap();
        let state = Arc::new(AppState {
            db: DbHandle::new(db),
        });
        api_router().with_state(state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn create(app: &Router, name: &str, start: &str, end: &str) -> i64 {
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/records",
                serde_json::json!({
                    "name": name,
                    "amount": 10000.0,
                    "start_date": start,
                    "start_session": "MOR",
                    "end_date": end,
                    "end_session": "EVE",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let record: serde_json::Value = body_json(resp.into_body()).await;
        record["id"].as_i64().unwrap()
    }

    async fn set_status(app: &Router, id: i64, status: &str, overridden: bool) -> StatusCode {
        let resp = app
            .clone()
            .oneshot(post_json(
                &format!("/api/records/{}/status", id),
                serde_json::json!({"status": status, "override": overridden}),
            ))
            .await
            .unwrap();
        resp.status()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_list_empty_board() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/records")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let columns: serde_json::Value = body_json(resp.into_body()).await;
        for status in ["NEW", "FOLLOW", "ACCEPTED", "LOST"] {
            assert!(columns[status].as_array().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let app = test_app();
        create(&app, "Asha", "2024-06-01", "2024-06-01").await;

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/records?q=asha")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let columns: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(columns["NEW"].as_array().unwrap().len(), 1);
        assert_eq!(columns["NEW"][0]["name"], "Asha");
        assert_eq!(columns["NEW"][0]["project_code"], "BK001");
    }

    #[tokio::test]
    async fn test_conflicting_accept_returns_409_with_conflicts() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        assert_eq!(set_status(&app, a, "ACCEPTED", false).await, StatusCode::OK);
        let b = create(&app, "B", "2024-06-01", "2024-06-02").await;

        let resp = app
            .clone()
            .oneshot(post_json(
                &format!("/api/records/{}/status", b),
                serde_json::json!({"status": "ACCEPTED"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["conflict"], true);
        assert_eq!(body["conflicts"][0]["name"], "A");

        // Refusal left B unchanged.
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/records")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let columns: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(columns["NEW"][0]["id"], b);
    }

    #[tokio::test]
    async fn test_override_accepts_despite_conflict() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        assert_eq!(set_status(&app, a, "ACCEPTED", false).await, StatusCode::OK);
        let b = create(&app, "B", "2024-06-01", "2024-06-02").await;
        assert_eq!(set_status(&app, b, "ACCEPTED", false).await, StatusCode::CONFLICT);
        assert_eq!(set_status(&app, b, "ACCEPTED", true).await, StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/records")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let columns: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(columns["ACCEPTED"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_force_alias_is_accepted() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        assert_eq!(set_status(&app, a, "ACCEPTED", false).await, StatusCode::OK);
        let b = create(&app, "B", "2024-06-01", "2024-06-01").await;

        let resp = app
            .clone()
            .oneshot(post_json(
                &format!("/api/records/{}/status", b),
                serde_json::json!({"status": "ACCEPTED", "force": true}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_update_unknown_record_is_404() {
        let app = test_app();
        let resp = app
            .oneshot(post_json(
                "/api/records/999/status",
                serde_json::json!({"status": "FOLLOW"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_400() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        assert_eq!(set_status(&app, a, "LOST", false).await, StatusCode::OK);
        assert_eq!(
            set_status(&app, a, "NEW", false).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_unrecognized_status_is_rejected() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        let resp = app
            .clone()
            .oneshot(post_json(
                &format!("/api/records/{}/status", a),
                serde_json::json!({"status": "PENDING"}),
            ))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_check_conflict_missing_date_skips_check() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/check-conflict")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["success"], false);
        assert!(body["conflicts"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_conflict_reports_overlap() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        assert_eq!(set_status(&app, a, "ACCEPTED", false).await, StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/check-conflict?date=2024-06-01&session=MOR")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["conflicts"][0]["id"], a);

        // Excluding the accepted record itself silences the report.
        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/check-conflict?date=2024-06-01&session=MOR&exclude={}", a))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert!(body["conflicts"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_conflict_missing_session_defaults_to_morning() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        assert_eq!(set_status(&app, a, "ACCEPTED", false).await, StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/check-conflict?date=2024-06-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["conflicts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_conflict_rejects_unrecognized_session() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/check-conflict?date=2024-06-01&session=EVENING")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_edit_and_delete() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/api/records/{}", a))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"name": "A renamed", "amount": 5000.0}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let record: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(record["name"], "A renamed");

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/records/{}", a))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/records/{}", a))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_amounts_endpoint() {
        let app = test_app();
        let a = create(&app, "A", "2024-06-01", "2024-06-01").await;
        assert_eq!(set_status(&app, a, "ACCEPTED", false).await, StatusCode::OK);
        create(&app, "B", "2024-07-01", "2024-07-01").await;

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/amounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(resp.into_body()).await;
        assert_eq!(body["total_records"], 2);
        assert_eq!(body["accepted_amount"], 10000.0);
    }
}
