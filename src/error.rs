//! Error types for the visit billing engine.
//!
//! The taxonomy separates user-correctable failures, which are resolved
//! entirely before anything is persisted, from record-store failures,
//! which are the only category that crosses the external boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the billing calculator itself.
///
/// Both variants are user-correctable: the caller surfaces them inline and
/// blocks submission. They never reach the record store.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum EngineError {
    /// The end instant is not strictly after the start instant. A zero or
    /// negative duration is never billable.
    #[error("end time must be after start time")]
    InvalidInterval,

    /// The crew size is outside the allowed range (fewer than the minimum
    /// of 2 workers, or more than the configured maximum).
    #[error("crew size {0} is outside the allowed range")]
    InvalidCrewSize(u32),
}

/// A field-attributed validation failure from the form boundary.
///
/// Only the first violated rule is reported; the caller shows one message
/// at a time rather than aggregating every broken field.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Name of the raw input field that failed, e.g. `"end_time"`.
    pub field: String,
    /// Human-readable description of the violated rule.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Failures reported by the record store.
///
/// These are surfaced to the caller verbatim and never retried
/// automatically; the submitted data stays intact so the user can retry.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("visit not found: {0}")]
    NotFound(String),

    #[error("record store rejected the write: {0}")]
    Rejected(String),
}
