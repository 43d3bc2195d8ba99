//! Session-level errors.
//!
//! Only conditions that make the session unusable are errors. Per-edge
//! outcomes (no body, recursion, depth, cost, visibility) are recorded in the
//! decision report as `SkipReason`s instead.

use crate::domain::ir::CallSiteId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InlineError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InlineError {
    /// The same symbol has a body in two modules; linkage is ambiguous.
    #[error("Duplicate symbol {name}: defined in module {first_module} and in module {second_module}")]
    DuplicateSymbol {
        name: String,
        first_module: String,
        second_module: String,
    },

    /// `apply` was called on an edge that is no longer pending.
    #[error("Edge {caller} -> {callee} (site {site}) was already decided; refusing to splice again")]
    AlreadyApplied {
        caller: String,
        callee: String,
        site: CallSiteId,
    },

    /// The call op an edge points at is gone from the caller body.
    #[error("Call site {site} not found in {caller}")]
    MissingCallSite { caller: String, site: CallSiteId },

    /// `apply` was called on an edge whose target has no body.
    #[error("Edge {caller} -> {callee} has no definition to inline")]
    NotInlinable { caller: String, callee: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(String),
}
