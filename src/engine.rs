//! Visit billing calculator.
//!
//! The `engine` module is responsible for turning a [`VisitInterval`]
//! into a [`BillingResult`].  The conversion from elapsed hours to
//! billable visit units is delegated to the rounding rule named by the
//! [`BillingConfig`], so the rule in force is always an explicit
//! configuration choice.  Batch recomputation uses the [`rayon`] crate
//! to parallelise per-visit calculations across multiple CPU cores.

use crate::config::BillingConfig;
use crate::error::EngineError;
use crate::models::{
    BillingResult, BillingStatus, FinancialSummary, NewWorkerAmount, PaymentStatus, VisitInterval,
    VisitRecord, WorkerAssignment, WorkerBalance,
};
use rayon::prelude::*;
use std::collections::BTreeMap;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Round a monetary or hour value to 2 decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the billing figures for one visit interval.
///
/// Pure and synchronous: identical inputs always produce an identical
/// [`BillingResult`], and nothing is read or written outside the
/// arguments.
///
/// Elapsed time is taken from the absolute instants in milliseconds, so
/// cross-midnight and DST-transition intervals come out exact.  The
/// unrounded hour count feeds the rounding rule; only the returned
/// `total_hours` is rounded, to keep display rounding out of the visit
/// count.
pub fn compute_billing(
    interval: &VisitInterval,
    config: &BillingConfig,
) -> Result<BillingResult, EngineError> {
    if interval.end <= interval.start {
        return Err(EngineError::InvalidInterval);
    }
    if interval.num_workers < config.min_workers || interval.num_workers > config.max_workers {
        return Err(EngineError::InvalidCrewSize(interval.num_workers));
    }

    let elapsed_ms = (interval.end - interval.start).num_milliseconds();
    let total_hours = elapsed_ms as f64 / MS_PER_HOUR;

    let num_visits = config.rounding.strategy().visits(total_hours);
    let total_cost = round2(
        num_visits as f64 * interval.num_workers as f64 * config.cost_per_worker_per_visit,
    );

    Ok(BillingResult {
        total_hours: round2(total_hours),
        num_visits,
        total_cost,
    })
}

/// Derive the per-worker payment obligations for a visit.
///
/// Each assigned worker is owed `num_visits * cost_per_worker_per_visit`
/// for the visit, independent of crew size.  Rows start out pending;
/// the store assigns their identity.
pub fn worker_amounts(
    num_visits: u32,
    worker_ids: &[String],
    config: &BillingConfig,
) -> Vec<NewWorkerAmount> {
    let amount = round2(num_visits as f64 * config.cost_per_worker_per_visit);
    worker_ids
        .iter()
        .map(|worker_id| NewWorkerAmount {
            worker_id: worker_id.clone(),
            amount,
        })
        .collect()
}

/// Recompute billing for a batch of already-persisted visits.
///
/// Used after a configuration change (price or rounding rule) to bring
/// stored figures back in line with their raw intervals.  Calculations
/// run in parallel; a visit that no longer passes the calculator's
/// preconditions yields its error in place without aborting the rest of
/// the batch.
pub fn recompute_batch(
    visits: &[VisitRecord],
    config: &BillingConfig,
) -> Vec<(String, Result<BillingResult, EngineError>)> {
    visits
        .par_iter()
        .map(|visit| (visit.id.clone(), compute_billing(&visit.interval(), config)))
        .collect()
}

/// Aggregate financial figures over fetched records.
///
/// Straight filter-and-sum over the rows the caller already holds.
/// Worker balances cover pending assignments only, ordered by worker
/// identifier.
pub fn summarize(visits: &[VisitRecord], assignments: &[WorkerAssignment]) -> FinancialSummary {
    let total_earnings: f64 = visits.iter().map(|v| v.total_cost).sum();
    let collected_amount: f64 = visits
        .iter()
        .filter(|v| v.billing_status == BillingStatus::Collected)
        .map(|v| v.total_cost)
        .sum();

    let mut balances: BTreeMap<&str, WorkerBalance> = BTreeMap::new();
    for assignment in assignments {
        if assignment.payment_status != PaymentStatus::Pending {
            continue;
        }
        let entry = balances
            .entry(assignment.worker_id.as_str())
            .or_insert_with(|| WorkerBalance {
                worker_id: assignment.worker_id.clone(),
                pending_amount: 0.0,
                pending_visits: 0,
            });
        entry.pending_amount += assignment.amount;
        entry.pending_visits += 1;
    }

    FinancialSummary {
        total_earnings: round2(total_earnings),
        pending_amount: round2(total_earnings - collected_amount),
        collected_amount: round2(collected_amount),
        worker_balances: balances.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMethod;
    use crate::policy::RoundingKind;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn interval(start: &str, end: &str, num_workers: u32) -> VisitInterval {
        VisitInterval {
            start: at(start),
            end: at(end),
            num_workers,
        }
    }

    #[test]
    fn morning_visit_bills_two_units() {
        let config = BillingConfig::default();
        let input = interval("2024-01-01T08:00:00Z", "2024-01-01T11:30:00Z", 2);
        let result = compute_billing(&input, &config).unwrap();
        assert_eq!(result.total_hours, 3.5);
        assert_eq!(result.num_visits, 2);
        assert_eq!(result.total_cost, 80000.0);

        // The same interval bills identically under the grace rule; only
        // durations inside the 30-minute window discriminate.
        let grace = BillingConfig {
            rounding: RoundingKind::GraceThreshold,
            ..config
        };
        let result = compute_billing(&input, &grace).unwrap();
        assert_eq!(result.num_visits, 2);
        assert_eq!(result.total_cost, 80000.0);
    }

    #[test]
    fn grace_window_discriminates_the_rules() {
        let input = interval("2024-01-01T08:00:00Z", "2024-01-01T11:15:00Z", 2);
        let ceiling = BillingConfig::default();
        let grace = BillingConfig {
            rounding: RoundingKind::GraceThreshold,
            ..ceiling
        };
        assert_eq!(compute_billing(&input, &ceiling).unwrap().num_visits, 2);
        assert_eq!(compute_billing(&input, &grace).unwrap().num_visits, 1);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let config = BillingConfig::default();
        let input = interval("2024-03-09T22:10:00Z", "2024-03-10T05:25:30Z", 4);
        let first = compute_billing(&input, &config).unwrap();
        let second = compute_billing(&input, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cost_is_exactly_visits_times_workers_times_price() {
        let config = BillingConfig::default();
        for workers in [2u32, 3, 7, 50] {
            let input = interval("2024-01-01T08:00:00Z", "2024-01-01T15:10:00Z", workers);
            let result = compute_billing(&input, &config).unwrap();
            assert!(result.num_visits >= 1);
            assert_eq!(
                result.total_cost,
                result.num_visits as f64 * workers as f64 * 20000.0
            );
        }
    }

    #[test]
    fn price_is_injectable() {
        let config = BillingConfig {
            cost_per_worker_per_visit: 125.5,
            ..BillingConfig::default()
        };
        let input = interval("2024-01-01T08:00:00Z", "2024-01-01T10:00:00Z", 3);
        let result = compute_billing(&input, &config).unwrap();
        assert_eq!(result.total_cost, 376.5);
    }

    #[test]
    fn visits_never_decrease_as_the_end_moves_later() {
        let config = BillingConfig::default();
        let start = at("2024-01-01T08:00:00Z");
        let mut previous = 0u32;
        for minutes in (30..=720).step_by(7) {
            let input = VisitInterval {
                start,
                end: start + chrono::Duration::minutes(minutes),
                num_workers: 2,
            };
            let visits = compute_billing(&input, &config).unwrap().num_visits;
            assert!(visits >= previous, "visits dropped at {minutes} minutes");
            previous = visits;
        }
    }

    #[test]
    fn single_worker_crew_is_rejected() {
        let config = BillingConfig::default();
        let input = interval("2024-01-01T08:00:00Z", "2024-01-01T12:00:00Z", 1);
        assert_eq!(
            compute_billing(&input, &config),
            Err(EngineError::InvalidCrewSize(1))
        );
    }

    #[test]
    fn oversized_crew_is_rejected() {
        let config = BillingConfig::default();
        let input = interval("2024-01-01T08:00:00Z", "2024-01-01T12:00:00Z", 51);
        assert_eq!(
            compute_billing(&input, &config),
            Err(EngineError::InvalidCrewSize(51))
        );
    }

    #[test]
    fn empty_and_reversed_intervals_are_rejected() {
        let config = BillingConfig::default();
        let t = "2024-01-01T08:00:00Z";
        assert_eq!(
            compute_billing(&interval(t, t, 2), &config),
            Err(EngineError::InvalidInterval)
        );
        assert_eq!(
            compute_billing(
                &interval("2024-01-01T11:00:00Z", "2024-01-01T08:00:00Z", 2),
                &config
            ),
            Err(EngineError::InvalidInterval)
        );
    }

    #[test]
    fn cross_midnight_interval_uses_true_elapsed_time() {
        let config = BillingConfig::default();
        let input = interval("2024-06-01T23:00:00Z", "2024-06-02T01:30:00Z", 2);
        let result = compute_billing(&input, &config).unwrap();
        assert_eq!(result.total_hours, 2.5);
        assert_eq!(result.num_visits, 1);
    }

    #[test]
    fn dst_transition_interval_uses_absolute_instants() {
        // Europe/Madrid springs forward during this window; in wall-clock
        // terms the interval looks like 4 hours.  The instants are 3
        // hours apart.
        let start = Utc.with_ymd_and_hms(2024, 3, 31, 0, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 3, 30, 0).unwrap();
        let input = VisitInterval {
            start,
            end,
            num_workers: 2,
        };
        let result = compute_billing(&input, &BillingConfig::default()).unwrap();
        assert_eq!(result.total_hours, 3.0);
        assert_eq!(result.num_visits, 1);
    }

    #[test]
    fn fractional_hours_round_only_on_output() {
        let config = BillingConfig::default();
        // 2h59m59s is 2.9997 hours: displays as 3.0 but must not be
        // treated as a full 3-hour multiple by the grace rule.
        let input = interval("2024-01-01T08:00:00Z", "2024-01-01T10:59:59Z", 2);
        let result = compute_billing(&input, &config).unwrap();
        assert_eq!(result.total_hours, 3.0);
        assert_eq!(result.num_visits, 1);
    }

    #[test]
    fn worker_amounts_are_per_visit_per_worker() {
        let config = BillingConfig::default();
        let ids = vec!["w1".to_string(), "w2".to_string(), "w3".to_string()];
        let rows = worker_amounts(2, &ids, &config);
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.amount, 40000.0);
        }
        assert_eq!(rows[1].worker_id, "w2");
    }

    fn record(id: &str, cost: f64, status: BillingStatus) -> VisitRecord {
        VisitRecord {
            id: id.to_string(),
            start_time: at("2024-01-01T08:00:00Z"),
            end_time: at("2024-01-01T11:30:00Z"),
            description: None,
            num_workers: 2,
            total_hours: 3.5,
            num_visits: 2,
            total_cost: cost,
            billing_status: status,
            billing_date: None,
            invoice_reference: None,
            created_at: at("2024-01-01T12:00:00Z"),
        }
    }

    #[test]
    fn batch_recompute_reports_failures_in_place() {
        let config = BillingConfig::default();
        let mut bad = record("v2", 80000.0, BillingStatus::Pending);
        bad.num_workers = 1;
        let visits = vec![record("v1", 80000.0, BillingStatus::Pending), bad];

        let results = recompute_batch(&visits, &config);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.as_ref().unwrap().num_visits, 2);
        assert_eq!(results[1].1, Err(EngineError::InvalidCrewSize(1)));
    }

    #[test]
    fn summary_splits_collected_from_pending() {
        let visits = vec![
            record("v1", 80000.0, BillingStatus::Collected),
            record("v2", 40000.0, BillingStatus::Pending),
            record("v3", 40000.0, BillingStatus::Invoiced),
        ];
        let assignments = vec![
            WorkerAssignment {
                id: "a1".into(),
                visit_id: "v2".into(),
                worker_id: "w1".into(),
                amount: 40000.0,
                payment_status: PaymentStatus::Pending,
                payment_date: None,
                payment_method: None,
            },
            WorkerAssignment {
                id: "a2".into(),
                visit_id: "v2".into(),
                worker_id: "w2".into(),
                amount: 40000.0,
                payment_status: PaymentStatus::Paid,
                payment_date: Some(at("2024-02-01T00:00:00Z")),
                payment_method: Some(PaymentMethod::Cash),
            },
            WorkerAssignment {
                id: "a3".into(),
                visit_id: "v3".into(),
                worker_id: "w1".into(),
                amount: 40000.0,
                payment_status: PaymentStatus::Pending,
                payment_date: None,
                payment_method: None,
            },
        ];

        let summary = summarize(&visits, &assignments);
        assert_eq!(summary.total_earnings, 160000.0);
        assert_eq!(summary.collected_amount, 80000.0);
        assert_eq!(summary.pending_amount, 80000.0);
        assert_eq!(summary.worker_balances.len(), 1);
        assert_eq!(summary.worker_balances[0].worker_id, "w1");
        assert_eq!(summary.worker_balances[0].pending_amount, 80000.0);
        assert_eq!(summary.worker_balances[0].pending_visits, 2);
    }
}
