//! Record store contract.
//!
//! Persistence is delegated to an external managed backend; this module
//! defines the narrow surface the engine depends on, plus an in-memory
//! implementation used by tests and the standalone binary.  The store
//! only ever receives fully computed records: validation and billing
//! errors are resolved before anything reaches it.

use crate::error::StoreError;
use crate::models::{
    BillingStatus, NewVisit, NewWorkerAmount, PaymentMethod, PaymentStatus, VisitRecord,
    WorkerAssignment,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Filters applied when listing visits.
#[derive(Debug, Clone, Default)]
pub struct VisitFilter {
    pub billing_status: Option<BillingStatus>,
    /// Keep only visits whose start instant falls on this calendar day
    /// (UTC).
    pub date: Option<NaiveDate>,
}

/// The persistence operations the engine requires.
///
/// A visit upsert and the replacement of its per-worker amount rows are
/// two separate calls; the backend offers no transaction spanning both,
/// and callers must treat the pair as independently failable.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_visit(&self, visit: NewVisit) -> Result<VisitRecord, StoreError>;

    /// Replace the stored fields of an existing visit with freshly
    /// computed ones.  Billing figures are overwritten whole.
    async fn update_visit(&self, id: &str, visit: NewVisit) -> Result<VisitRecord, StoreError>;

    async fn get_visit(&self, id: &str) -> Result<VisitRecord, StoreError>;

    /// Visits matching the filter, most recently created first.
    async fn list_visits(&self, filter: &VisitFilter) -> Result<Vec<VisitRecord>, StoreError>;

    /// Drop any existing per-worker rows for the visit and insert the
    /// given ones, all starting out pending.
    async fn replace_assignments(
        &self,
        visit_id: &str,
        rows: Vec<NewWorkerAmount>,
    ) -> Result<Vec<WorkerAssignment>, StoreError>;

    async fn list_assignments(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<WorkerAssignment>, StoreError>;

    /// Mark a set of assignment rows paid, recording when and how.
    /// Returns the number of rows updated.
    async fn mark_assignments_paid(
        &self,
        ids: &[String],
        date: DateTime<Utc>,
        method: PaymentMethod,
    ) -> Result<u32, StoreError>;

    /// Move a visit's billing status forward, recording the date and an
    /// optional invoice reference.
    async fn mark_visit_billing(
        &self,
        id: &str,
        status: BillingStatus,
        date: DateTime<Utc>,
        invoice_reference: Option<String>,
    ) -> Result<VisitRecord, StoreError>;
}

/// In-memory record store.
///
/// Backs the test suite and the standalone binary.  Production points
/// the same trait at the managed backend's client.
#[derive(Default)]
pub struct MemoryStore {
    visits: RwLock<HashMap<String, VisitRecord>>,
    assignments: RwLock<HashMap<String, WorkerAssignment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_from(id: String, visit: NewVisit, created_at: DateTime<Utc>) -> VisitRecord {
        VisitRecord {
            id,
            start_time: visit.start_time,
            end_time: visit.end_time,
            description: visit.description,
            num_workers: visit.num_workers,
            total_hours: visit.billing.total_hours,
            num_visits: visit.billing.num_visits,
            total_cost: visit.billing.total_cost,
            billing_status: BillingStatus::Pending,
            billing_date: None,
            invoice_reference: None,
            created_at,
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_visit(&self, visit: NewVisit) -> Result<VisitRecord, StoreError> {
        let record = Self::record_from(Uuid::new_v4().to_string(), visit, Utc::now());
        self.visits
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_visit(&self, id: &str, visit: NewVisit) -> Result<VisitRecord, StoreError> {
        let mut visits = self.visits.write().await;
        let existing = visits
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        // Billing lifecycle fields survive an edit; the billing figures
        // themselves are replaced whole.
        let mut record = Self::record_from(id.to_string(), visit, existing.created_at);
        record.billing_status = existing.billing_status;
        record.billing_date = existing.billing_date;
        record.invoice_reference = existing.invoice_reference.clone();
        visits.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn get_visit(&self, id: &str) -> Result<VisitRecord, StoreError> {
        self.visits
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_visits(&self, filter: &VisitFilter) -> Result<Vec<VisitRecord>, StoreError> {
        let visits = self.visits.read().await;
        let mut matching: Vec<VisitRecord> = visits
            .values()
            .filter(|v| {
                filter
                    .billing_status
                    .map_or(true, |status| v.billing_status == status)
            })
            .filter(|v| {
                filter
                    .date
                    .map_or(true, |date| v.start_time.date_naive() == date)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn replace_assignments(
        &self,
        visit_id: &str,
        rows: Vec<NewWorkerAmount>,
    ) -> Result<Vec<WorkerAssignment>, StoreError> {
        if !self.visits.read().await.contains_key(visit_id) {
            return Err(StoreError::NotFound(visit_id.to_string()));
        }
        let mut assignments = self.assignments.write().await;
        assignments.retain(|_, a| a.visit_id != visit_id);
        let inserted: Vec<WorkerAssignment> = rows
            .into_iter()
            .map(|row| WorkerAssignment {
                id: Uuid::new_v4().to_string(),
                visit_id: visit_id.to_string(),
                worker_id: row.worker_id,
                amount: row.amount,
                payment_status: PaymentStatus::Pending,
                payment_date: None,
                payment_method: None,
            })
            .collect();
        for assignment in &inserted {
            assignments.insert(assignment.id.clone(), assignment.clone());
        }
        Ok(inserted)
    }

    async fn list_assignments(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<WorkerAssignment>, StoreError> {
        let assignments = self.assignments.read().await;
        let mut matching: Vec<WorkerAssignment> = assignments
            .values()
            .filter(|a| status.map_or(true, |s| a.payment_status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn mark_assignments_paid(
        &self,
        ids: &[String],
        date: DateTime<Utc>,
        method: PaymentMethod,
    ) -> Result<u32, StoreError> {
        let mut assignments = self.assignments.write().await;
        let mut updated = 0;
        for id in ids {
            let assignment = assignments
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            assignment.payment_status = PaymentStatus::Paid;
            assignment.payment_date = Some(date);
            assignment.payment_method = Some(method);
            updated += 1;
        }
        Ok(updated)
    }

    async fn mark_visit_billing(
        &self,
        id: &str,
        status: BillingStatus,
        date: DateTime<Utc>,
        invoice_reference: Option<String>,
    ) -> Result<VisitRecord, StoreError> {
        let mut visits = self.visits.write().await;
        let record = visits
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.billing_status = status;
        record.billing_date = Some(date);
        record.invoice_reference = invoice_reference;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillingResult;
    use chrono::TimeZone;

    fn new_visit(hour: u32) -> NewVisit {
        let start = Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap();
        NewVisit {
            start_time: start,
            end_time: start + chrono::Duration::minutes(210),
            description: Some("Cooling tower inspection".to_string()),
            num_workers: 2,
            billing: BillingResult {
                total_hours: 3.5,
                num_visits: 2,
                total_cost: 80000.0,
            },
        }
    }

    #[tokio::test]
    async fn billing_fields_round_trip_exactly() {
        let store = MemoryStore::new();
        let inserted = store.insert_visit(new_visit(8)).await.unwrap();
        let fetched = store.get_visit(&inserted.id).await.unwrap();
        assert_eq!(fetched.total_hours, 3.5);
        assert_eq!(fetched.num_visits, 2);
        assert_eq!(fetched.total_cost, 80000.0);
        assert_eq!(fetched.billing_status, BillingStatus::Pending);
    }

    #[tokio::test]
    async fn update_replaces_figures_but_keeps_lifecycle() {
        let store = MemoryStore::new();
        let inserted = store.insert_visit(new_visit(8)).await.unwrap();
        let paid_date = Utc.with_ymd_and_hms(2024, 5, 11, 9, 0, 0).unwrap();
        store
            .mark_visit_billing(&inserted.id, BillingStatus::Collected, paid_date, None)
            .await
            .unwrap();

        let mut edited = new_visit(9);
        edited.billing.num_visits = 1;
        edited.billing.total_cost = 40000.0;
        let updated = store.update_visit(&inserted.id, edited).await.unwrap();
        assert_eq!(updated.num_visits, 1);
        assert_eq!(updated.total_cost, 40000.0);
        assert_eq!(updated.billing_status, BillingStatus::Collected);
        assert_eq!(updated.billing_date, Some(paid_date));
        assert_eq!(updated.created_at, inserted.created_at);
    }

    #[tokio::test]
    async fn updating_a_missing_visit_reports_not_found() {
        let store = MemoryStore::new();
        let err = store.update_visit("nope", new_visit(8)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_day() {
        let store = MemoryStore::new();
        let first = store.insert_visit(new_visit(8)).await.unwrap();
        let mut other_day = new_visit(8);
        other_day.start_time = Utc.with_ymd_and_hms(2024, 5, 11, 8, 0, 0).unwrap();
        other_day.end_time = other_day.start_time + chrono::Duration::minutes(210);
        store.insert_visit(other_day).await.unwrap();

        let filter = VisitFilter {
            billing_status: Some(BillingStatus::Pending),
            date: Some(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()),
        };
        let listed = store.list_visits(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first.id);

        let all = store.list_visits(&VisitFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn replacing_assignments_drops_the_old_rows() {
        let store = MemoryStore::new();
        let visit = store.insert_visit(new_visit(8)).await.unwrap();
        let rows = vec![
            NewWorkerAmount {
                worker_id: "w1".into(),
                amount: 40000.0,
            },
            NewWorkerAmount {
                worker_id: "w2".into(),
                amount: 40000.0,
            },
        ];
        store.replace_assignments(&visit.id, rows).await.unwrap();
        // A recompute after editing the visit writes a fresh set.
        let second = store
            .replace_assignments(
                &visit.id,
                vec![NewWorkerAmount {
                    worker_id: "w3".into(),
                    amount: 20000.0,
                }],
            )
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        let all = store.list_assignments(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].worker_id, "w3");
        assert_eq!(all[0].payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn assignments_for_an_unknown_visit_are_rejected() {
        let store = MemoryStore::new();
        let err = store
            .replace_assignments("missing", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn marking_paid_records_date_and_method() {
        let store = MemoryStore::new();
        let visit = store.insert_visit(new_visit(8)).await.unwrap();
        let inserted = store
            .replace_assignments(
                &visit.id,
                vec![
                    NewWorkerAmount {
                        worker_id: "w1".into(),
                        amount: 40000.0,
                    },
                    NewWorkerAmount {
                        worker_id: "w2".into(),
                        amount: 40000.0,
                    },
                ],
            )
            .await
            .unwrap();

        let date = Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap();
        let ids = vec![inserted[0].id.clone()];
        let updated = store
            .mark_assignments_paid(&ids, date, PaymentMethod::Transfer)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let pending = store
            .list_assignments(Some(PaymentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, inserted[1].id);

        let paid = store
            .list_assignments(Some(PaymentStatus::Paid))
            .await
            .unwrap();
        assert_eq!(paid[0].payment_date, Some(date));
        assert_eq!(paid[0].payment_method, Some(PaymentMethod::Transfer));
    }
}
