//! Crate-wide error type.
//!
//! Per the error-handling design: recoverable conditions never reach this
//! type (they are recorded in `trace.errors` and the pipeline continues).
//! Only the few failure kinds spec.md marks "surfaced to caller" produce a
//! `PlannerError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("no adapter registered for kind {kind:?} in country {country}")]
    NoAdapter { kind: String, country: String },

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("hard node {node_id} unreachable: {reason}")]
    HardNodeUnreachable { node_id: String, reason: String },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type PlannerResult<T> = Result<T, PlannerError>;
