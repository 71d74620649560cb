//! Form-boundary validation.
//!
//! The `validate` module checks raw, string-typed form input before the
//! calculator ever runs, so the user sees a field-attributed message
//! instead of a generic failure.  Validation stops at the first
//! violated rule; messages are not aggregated.

use crate::config::BillingConfig;
use crate::error::ValidationError;
use crate::models::VisitInterval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Raw visit input exactly as the form submits it.
///
/// Timestamps arrive as RFC 3339 strings.  The crew is given either as
/// a bare head count or, when worker identities are tracked, as the
/// list of selected worker identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVisitInput {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub num_workers: Option<u32>,
    #[serde(default)]
    pub worker_ids: Option<Vec<String>>,
}

/// Input that has passed every form-boundary rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedVisit {
    pub interval: VisitInterval,
    pub description: Option<String>,
    /// Present when the form selected individual workers; already known
    /// to be distinct and within crew-size bounds.
    pub worker_ids: Option<Vec<String>>,
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::new(field, "a timestamp is required"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ValidationError::new(field, format!("not a valid timestamp: {raw}")))
}

/// Validate raw form input, returning the first violated rule.
///
/// Rules, in the order they are checked:
/// start and end must be non-empty parseable timestamps; the end must be
/// strictly after the start; the description, when present, must fit the
/// configured length; the crew (count or selected workers) must be
/// within crew-size bounds, and selected workers must be distinct.
pub fn validate_visit_input(
    raw: &RawVisitInput,
    config: &BillingConfig,
) -> Result<ValidatedVisit, ValidationError> {
    let start = parse_timestamp("start_time", &raw.start_time)?;
    let end = parse_timestamp("end_time", &raw.end_time)?;

    if end <= start {
        return Err(ValidationError::new(
            "end_time",
            "end time must be after start time",
        ));
    }

    if let Some(description) = &raw.description {
        let len = description.chars().count();
        if len > config.max_description_len {
            return Err(ValidationError::new(
                "description",
                format!(
                    "description is {len} characters, the maximum is {}",
                    config.max_description_len
                ),
            ));
        }
    }

    let num_workers = match &raw.worker_ids {
        Some(ids) => {
            let distinct: HashSet<&str> = ids.iter().map(String::as_str).collect();
            if distinct.len() != ids.len() {
                return Err(ValidationError::new(
                    "worker_ids",
                    "the same worker is selected more than once",
                ));
            }
            ids.len() as u32
        }
        None => raw.num_workers.ok_or_else(|| {
            ValidationError::new("num_workers", "a crew size or worker selection is required")
        })?,
    };

    if num_workers < config.min_workers {
        return Err(ValidationError::new(
            crew_field(raw),
            format!("at least {} workers are required per visit", config.min_workers),
        ));
    }
    if num_workers > config.max_workers {
        return Err(ValidationError::new(
            crew_field(raw),
            format!("at most {} workers are allowed per visit", config.max_workers),
        ));
    }

    Ok(ValidatedVisit {
        interval: VisitInterval {
            start,
            end,
            num_workers,
        },
        description: raw.description.clone().filter(|d| !d.is_empty()),
        worker_ids: raw.worker_ids.clone(),
    })
}

fn crew_field(raw: &RawVisitInput) -> &'static str {
    if raw.worker_ids.is_some() {
        "worker_ids"
    } else {
        "num_workers"
    }
}
