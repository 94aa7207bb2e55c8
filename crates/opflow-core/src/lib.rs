//! # Opflow Core
//!
//! Core types shared by the opflow execution engine and its report stores.
//!
//! This crate provides the fundamental building blocks:
//! - [`Definition`] - Name, version and description of a unit of work
//! - [`Report`] - Final outcome of one invocation
//! - [`SequenceReport`] - A report plus its flattened report tree
//! - [`Backoff`] - Delay schedule between retry attempts
//! - [`OpflowError`] - Error types and the recoverable/unrecoverable split

pub mod definition;
pub mod error;
pub mod report;
pub mod retry;
pub mod types;

// Re-exports for convenience
pub use definition::Definition;
pub use error::{unrecoverable, OpflowError, Result};
pub use report::{content_key, GenericReport, Report, ReportError, SequenceReport};
pub use retry::Backoff;
pub use semver::Version;
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::definition::Definition;
    pub use crate::error::{unrecoverable, OpflowError, Result};
    pub use crate::report::{GenericReport, Report, ReportError, SequenceReport};
    pub use crate::retry::Backoff;
    pub use crate::types::EmptyInput;
    pub use semver::Version;
}
