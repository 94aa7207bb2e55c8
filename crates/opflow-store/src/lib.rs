//! # Opflow Store
//!
//! Keyed storage for execution reports.

pub mod store;

pub use store::{InMemoryReportStore, ReportStore};
