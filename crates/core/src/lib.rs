//! Domain core for the Procura request/proposal workflow.
//!
//! Everything in this crate is pure: the request lifecycle state machine,
//! proposal eligibility rules, need-satisfaction evaluation, authorization
//! and input validation. Persistence and transport live in the sibling
//! crates and call into these rules.

pub mod auth;
pub mod clock;
pub mod config;
pub mod domain;
pub mod eligibility;
pub mod errors;
pub mod fulfillment;
pub mod lifecycle;

pub use chrono;

pub use errors::WorkflowError;
