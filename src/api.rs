//! HTTP API for the visit billing engine.
//!
//! This module exposes a minimal REST API around the calculator using
//! the [`axum`](https://crates.io/crates/axum) framework.  Clients can
//! request a billing preview for form input, submit finalized visits
//! for persistence, and query the stored records.  The handlers use
//! the same validator and calculator as library callers; nothing is
//! recomputed differently over HTTP.

use crate::config::BillingConfig;
use crate::engine::{compute_billing, summarize, worker_amounts};
use crate::error::{EngineError, StoreError, ValidationError};
use crate::models::{
    BillingStatus, FinancialSummary, NewVisit, PaymentMethod, VisitRecord, WorkerAssignment,
};
use crate::store::{RecordStore, VisitFilter};
use crate::validate::{validate_visit_input, RawVisitInput, ValidatedVisit};
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Application state shared across requests.
pub struct AppState {
    pub config: BillingConfig,
    pub store: Arc<dyn RecordStore>,
    /// Set while a visit submission is in flight.  Guards against
    /// double-submission; concurrent submitters get a conflict response
    /// instead of a duplicate write.
    submitting: AtomicBool,
}

impl AppState {
    pub fn new(config: BillingConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config,
            store,
            submitting: AtomicBool::new(false),
        }
    }
}

/// Errors a handler can answer with, mapped onto HTTP statuses.
#[derive(Debug)]
enum ApiError {
    Validation(ValidationError),
    Engine(EngineError),
    Store(StoreError),
    Busy,
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({"error": err.message, "field": err.field}),
            ),
            ApiError::Engine(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({"error": err.to_string()}),
            ),
            ApiError::Store(StoreError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": format!("visit not found: {id}")}),
            ),
            ApiError::Store(err) => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({"error": err.to_string()}),
            ),
            ApiError::Busy => (
                StatusCode::CONFLICT,
                serde_json::json!({"error": "a submission is already in flight"}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Releases the submission flag when the handler finishes, on success
/// and on error alike.
struct SubmitGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ApiError> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| Self { flag })
            .map_err(|_| ApiError::Busy)
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A persisted visit together with the per-worker rows written for it.
#[derive(Debug, Serialize, Deserialize)]
pub struct VisitResponse {
    pub visit: VisitRecord,
    pub assignments: Vec<WorkerAssignment>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<BillingStatus>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub assignment_ids: Vec<String>,
    pub payment_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub updated: u32,
}

#[derive(Debug, Deserialize)]
pub struct BillingUpdateRequest {
    pub status: BillingStatus,
    pub billing_date: DateTime<Utc>,
    pub invoice_reference: Option<String>,
}

/// Build the API router around the given configuration and store.
pub fn build_router(config: BillingConfig, store: Arc<dyn RecordStore>) -> Router {
    let state = Arc::new(AppState::new(config, store));
    Router::new()
        .route("/api/quote", post(quote_handler))
        .route("/api/visits", get(list_handler).post(create_handler))
        .route("/api/visits/:id", put(update_handler))
        .route("/api/visits/:id/billing", post(billing_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/payments", post(payment_handler))
        .with_state(state)
}

/// Handler for POST /api/quote: the live preview shown while the form
/// is being filled in.  Computes, never persists.
async fn quote_handler(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawVisitInput>,
) -> Result<impl IntoResponse, ApiError> {
    let validated = validate_visit_input(&raw, &state.config)?;
    let billing = compute_billing(&validated.interval, &state.config)?;
    Ok(Json(billing))
}

/// Validate, compute and write the visit plus its per-worker rows.
///
/// The visit upsert and the assignment-row replacement are two
/// sequential store calls with no transaction across them; a failure of
/// the second call leaves the visit persisted without rows and is
/// reported to the caller, who retries by resubmitting.
async fn persist(
    state: &AppState,
    validated: ValidatedVisit,
    existing_id: Option<&str>,
) -> Result<VisitResponse, ApiError> {
    let billing = compute_billing(&validated.interval, &state.config)?;
    let new_visit = NewVisit {
        start_time: validated.interval.start,
        end_time: validated.interval.end,
        description: validated.description,
        num_workers: validated.interval.num_workers,
        billing,
    };

    let visit = match existing_id {
        Some(id) => state.store.update_visit(id, new_visit).await?,
        None => state.store.insert_visit(new_visit).await?,
    };

    let assignments = match &validated.worker_ids {
        Some(ids) => {
            let rows = worker_amounts(billing.num_visits, ids, &state.config);
            match state.store.replace_assignments(&visit.id, rows).await {
                Ok(rows) => rows,
                Err(err) => {
                    tracing::warn!(
                        visit_id = %visit.id,
                        error = %err,
                        "visit persisted but worker amounts were not"
                    );
                    return Err(err.into());
                }
            }
        }
        None => Vec::new(),
    };

    tracing::info!(
        visit_id = %visit.id,
        num_visits = visit.num_visits,
        total_cost = visit.total_cost,
        "visit persisted"
    );
    Ok(VisitResponse { visit, assignments })
}

/// Handler for POST /api/visits.
async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawVisitInput>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = SubmitGuard::acquire(&state.submitting)?;
    let validated = validate_visit_input(&raw, &state.config)?;
    let response = persist(&state, validated, None).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for PUT /api/visits/:id.  Billing figures are recomputed
/// from the edited inputs and replaced whole.
async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(raw): Json<RawVisitInput>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = SubmitGuard::acquire(&state.submitting)?;
    let validated = validate_visit_input(&raw, &state.config)?;
    let response = persist(&state, validated, Some(&id)).await?;
    Ok(Json(response))
}

/// Handler for GET /api/visits.
async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = VisitFilter {
        billing_status: params.status,
        date: params.date,
    };
    let visits = state.store.list_visits(&filter).await?;
    Ok(Json(visits))
}

/// Handler for POST /api/visits/:id/billing: move the client-side
/// billing lifecycle forward (invoiced, collected).
async fn billing_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<BillingUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let visit = state
        .store
        .mark_visit_billing(
            &id,
            request.status,
            request.billing_date,
            request.invoice_reference,
        )
        .await?;
    Ok(Json(visit))
}

/// Handler for GET /api/summary.
async fn summary_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FinancialSummary>, ApiError> {
    let visits = state.store.list_visits(&VisitFilter::default()).await?;
    let assignments = state.store.list_assignments(None).await?;
    Ok(Json(summarize(&visits, &assignments)))
}

/// Handler for POST /api/payments: settle a batch of per-worker rows.
async fn payment_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .store
        .mark_assignments_paid(
            &request.assignment_ids,
            request.payment_date,
            request.payment_method,
        )
        .await?;
    tracing::info!(updated, "worker payments registered");
    Ok(Json(PaymentResponse { updated }))
}

/// Launch the API server.  Builds the router from the given
/// configuration and store, binds to the supplied address and blocks
/// until the server terminates.
pub async fn serve(
    addr: &str,
    config: BillingConfig,
    store: Arc<dyn RecordStore>,
) -> Result<()> {
    let router = build_router(config, store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "visit billing API listening");
    axum::serve(listener, router).await.map_err(Into::into)
}
