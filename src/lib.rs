// Main library entry point for the cross-module inlining resolver.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use application::{run_inlining, InlineConfig, InlineSession};
pub use domain::error::{InlineError, Result};
pub use domain::report::InlineReport;
