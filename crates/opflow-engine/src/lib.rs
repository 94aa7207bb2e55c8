//! # Opflow Engine
//!
//! Runs operations and sequences under a retry policy and records one
//! execution report per invocation.
//!
//! ```ignore
//! let plus1 = Operation::new("plus1", Version::new(1, 0, 0), "adds one",
//!     |_bundle, _deps: (), input: i64| async move { Ok(input + 1) });
//!
//! let bundle = Bundle::new(CancellationToken::new(), Arc::new(InMemoryReportStore::new()));
//! let report = execute_operation(&bundle, &plus1, (), 1).await?;
//! assert_eq!(report.output, Some(2));
//! ```

pub mod bundle;
pub mod execute;
pub mod operation;
pub mod options;

pub use bundle::Bundle;
pub use execute::{
    execute_operation, execute_operation_with, execute_sequence, execute_sequence_with,
    ExecutionFailure, OperationOutcome, SequenceOutcome,
};
pub use operation::{HandlerFuture, Operation, Sequence};
pub use options::{ExecuteOptions, InputHook, RetryConfig};

/// Prelude module for common imports.
pub mod prelude {
    pub use crate::bundle::Bundle;
    pub use crate::execute::{
        execute_operation, execute_operation_with, execute_sequence, execute_sequence_with,
        ExecutionFailure,
    };
    pub use crate::operation::{Operation, Sequence};
    pub use crate::options::{ExecuteOptions, RetryConfig};
    pub use opflow_core::prelude::*;
    pub use opflow_store::{InMemoryReportStore, ReportStore};
    pub use tokio_util::sync::CancellationToken;
}
