//! Data models for the visit billing engine.
//!
//! The `models` module defines the serialisable structs and enums
//! representing work-session visits, their computed billing figures and
//! the per-worker payment obligations derived from them.  These types
//! derive `Serialize` and `Deserialize` so that they can be persisted
//! to the record store or transmitted over the HTTP API unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A work-session time interval together with the crew size performing it.
///
/// This is the calculator's input.  It is constructed fresh from the form
/// fields on every recomputation and is never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisitInterval {
    /// Absolute instant at which the crew started work.
    pub start: DateTime<Utc>,
    /// Absolute instant at which the crew finished.  Must be strictly
    /// after `start`.
    pub end: DateTime<Utc>,
    /// Number of distinct workers on the crew.  Business rule: at
    /// least 2.
    pub num_workers: u32,
}

/// The computed billing figures for one visit interval.
///
/// Ephemeral preview state until submission, at which point the three
/// fields are copied verbatim into the persisted [`VisitRecord`].  Once
/// persisted they are only ever replaced by re-running the calculation
/// against edited inputs, never adjusted incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillingResult {
    /// Elapsed time in hours, rounded to 2 decimal places for display.
    pub total_hours: f64,
    /// Number of billable visit units the elapsed time converts to.
    pub num_visits: u32,
    /// `num_visits * num_workers * cost_per_worker_per_visit`, rounded
    /// to 2 decimal places.
    pub total_cost: f64,
}

/// Lifecycle of the amount owed by the client company for a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    /// Recorded but not yet invoiced.
    Pending,
    /// Invoice issued, money not yet received.
    Invoiced,
    /// Payment received.
    Collected,
}

/// Lifecycle of the amount owed to an individual worker for a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

/// How a worker payment was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Check,
}

/// A visit as accepted for persistence: the validated raw fields plus
/// the billing figures computed from them.  The store assigns the
/// identifier and creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVisit {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: Option<String>,
    pub num_workers: u32,
    pub billing: BillingResult,
}

/// A persisted visit record as returned by the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub description: Option<String>,
    pub num_workers: u32,
    /// Billing figures copied verbatim from the [`BillingResult`] that
    /// was previewed at submission time.
    pub total_hours: f64,
    pub num_visits: u32,
    pub total_cost: f64,
    pub billing_status: BillingStatus,
    /// Set when the status moves past pending.
    pub billing_date: Option<DateTime<Utc>>,
    /// Free-form invoice reference recorded when the client is billed.
    pub invoice_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VisitRecord {
    /// The billing figures of this record, in calculator output form.
    pub fn billing(&self) -> BillingResult {
        BillingResult {
            total_hours: self.total_hours,
            num_visits: self.num_visits,
            total_cost: self.total_cost,
        }
    }

    /// The raw interval this record's billing was computed from.
    pub fn interval(&self) -> VisitInterval {
        VisitInterval {
            start: self.start_time,
            end: self.end_time,
            num_workers: self.num_workers,
        }
    }
}

/// Amount owed to one worker for one visit, before the store has
/// assigned row identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkerAmount {
    pub worker_id: String,
    /// `num_visits * cost_per_worker_per_visit` for the visit in
    /// question.
    pub amount: f64,
}

/// A persisted per-worker payment obligation referencing a visit.
///
/// Each row carries its own payment lifecycle, independent of the
/// visit's billing status and of the other workers on the same crew.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub id: String,
    pub visit_id: String,
    pub worker_id: String,
    pub amount: f64,
    pub payment_status: PaymentStatus,
    pub payment_date: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
}

/// Pending balance owed to one worker, aggregated across visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerBalance {
    pub worker_id: String,
    /// Sum of the pending assignment amounts for this worker.
    pub pending_amount: f64,
    /// Number of visits with an unpaid obligation for this worker.
    pub pending_visits: u32,
}

/// Aggregate financial figures over a set of fetched records.
///
/// Plain sums over already-fetched rows; there is no incremental
/// bookkeeping behind these numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    /// Total billed across all visits regardless of status.
    pub total_earnings: f64,
    /// Portion of `total_earnings` not yet collected.
    pub pending_amount: f64,
    /// Portion of `total_earnings` already collected.
    pub collected_amount: f64,
    /// Outstanding per-worker balances, one entry per worker with at
    /// least one unpaid assignment.
    pub worker_balances: Vec<WorkerBalance>,
}
