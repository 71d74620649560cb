//! Visit rounding strategies.
//!
//! The `policy` module defines how an elapsed duration converts into a
//! whole number of billable visit units.  It provides the
//! `VisitRounding` trait, which each rounding rule implements, and the
//! `RoundingKind` selector used by configuration to name the active
//! rule.  The rule in force is always an explicit configuration choice,
//! never an implicit code branch.

use serde::{Deserialize, Serialize};

/// Billing granularity: one billable visit unit covers up to this many
/// hours of elapsed work.
pub const HOURS_PER_VISIT: f64 = 3.0;

/// Grace allowance used by [`GraceThreshold`]: time past a visit
/// multiple only counts as another visit once it exceeds this many
/// hours (30 minutes).
pub const GRACE_HOURS: f64 = 0.5;

/// A rounding rule determines how many billable visit units an elapsed
/// duration is worth.
///
/// Implementations must be thread-safe (`Send + Sync`) because the
/// engine may invoke them concurrently when recomputing batches of
/// visits across multiple threads.  The input is the unrounded elapsed
/// time in hours; callers must not pass the display-rounded value.
pub trait VisitRounding: Send + Sync {
    /// Stable name of this rule, as it appears in configuration.
    fn name(&self) -> &'static str;

    /// Number of billable visits for a strictly positive elapsed
    /// duration in hours.  Always at least 1.
    fn visits(&self, total_hours: f64) -> u32;
}

/// Rounds any overage up to a full additional visit.
///
/// `num_visits = ceil(total_hours / 3)`: one minute past a 3-hour
/// multiple already counts as the next visit.
pub struct AnyOverage;

impl VisitRounding for AnyOverage {
    fn name(&self) -> &'static str {
        "any-overage"
    }

    fn visits(&self, total_hours: f64) -> u32 {
        (total_hours / HOURS_PER_VISIT).ceil() as u32
    }
}

/// Credits an additional visit only once the elapsed time exceeds the
/// previous 3-hour multiple by more than 30 minutes.
///
/// `num_visits = floor((total_hours + 2.5) / 3)`: a visit is credited
/// once total hours reach `3n - 0.5` for integer `n`.  So 3h15m is one
/// visit, 3h30m is two.  Durations shorter than the grace window still
/// bill a single visit; a crew that showed up is never billed zero.
pub struct GraceThreshold;

impl VisitRounding for GraceThreshold {
    fn name(&self) -> &'static str {
        "grace-threshold"
    }

    fn visits(&self, total_hours: f64) -> u32 {
        let credited = ((total_hours + HOURS_PER_VISIT - GRACE_HOURS) / HOURS_PER_VISIT).floor();
        (credited as u32).max(1)
    }
}

/// Configuration-level name for the active rounding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundingKind {
    /// [`AnyOverage`].  This matches the behaviour the business runs in
    /// production today.
    #[default]
    AnyOverage,
    /// [`GraceThreshold`].
    GraceThreshold,
}

impl RoundingKind {
    /// The strategy this name selects.
    pub fn strategy(self) -> &'static dyn VisitRounding {
        match self {
            RoundingKind::AnyOverage => &AnyOverage,
            RoundingKind::GraceThreshold => &GraceThreshold,
        }
    }
}
