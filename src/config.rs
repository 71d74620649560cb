//! Billing configuration.
//!
//! The `config` module defines the tunable values the calculator runs
//! under: the per-worker price of a visit unit, the active rounding
//! rule and the crew-size and description limits enforced at the form
//! boundary.  Configuration is loaded from a JSON file and injected
//! into the engine explicitly, so tests can vary the price and a
//! currency change never requires a code edit.

use crate::policy::RoundingKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default price charged to the client per worker per billable visit.
/// Currency-unit agnostic; the business today quotes in colones.
pub const DEFAULT_COST_PER_WORKER_PER_VISIT: f64 = 20000.0;

/// Crew-size bounds enforced by business rule.
pub const MIN_WORKERS: u32 = 2;
pub const MAX_WORKERS: u32 = 50;

/// Maximum accepted length of a visit description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Runtime configuration for the billing calculator and validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Amount billed per worker for each visit unit.
    pub cost_per_worker_per_visit: f64,
    /// The rounding rule used to convert elapsed hours into visit
    /// units.
    pub rounding: RoundingKind,
    /// Smallest crew size a visit may be recorded with.
    pub min_workers: u32,
    /// Largest crew size a visit may be recorded with.
    pub max_workers: u32,
    /// Longest accepted description, in characters.
    pub max_description_len: usize,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            cost_per_worker_per_visit: DEFAULT_COST_PER_WORKER_PER_VISIT,
            rounding: RoundingKind::default(),
            min_workers: MIN_WORKERS,
            max_workers: MAX_WORKERS,
            max_description_len: MAX_DESCRIPTION_LEN,
        }
    }
}

/// Load configuration from a JSON file.
///
/// Absent files fall back to the defaults so a fresh deployment works
/// without any configuration on disk.  A present but malformed file is
/// an error; silently ignoring it would run the business under prices
/// nobody chose.
pub fn load_config(path: &Path) -> Result<BillingConfig> {
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "no billing config file, using defaults");
        return Ok(BillingConfig::default());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read billing config {}", path.display()))?;
    let config: BillingConfig = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse billing config {}", path.display()))?;
    Ok(config)
}
