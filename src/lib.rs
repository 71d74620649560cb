//! Visit billing engine library crate.
//!
//! This crate exposes the billing calculator, form validator and
//! record-store contract for maintenance-service visit tracking as
//! reusable modules.  External applications may depend on the
//! `visit_engine` crate and call into `engine::compute_billing`
//! directly or embed the API via `api::build_router`.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod policy;
pub mod store;
pub mod validate;
