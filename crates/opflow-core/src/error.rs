//! Error types for opflow operations.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

/// Main error type for opflow operations.
///
/// Handler failures are split in two: [`OpflowError::Transient`] is subject to
/// the retry policy, [`OpflowError::Unrecoverable`] stops the retry loop on the
/// attempt that produced it.
#[derive(Error, Debug, Clone)]
pub enum OpflowError {
    /// Handler failure that may succeed on a later attempt.
    #[error("{0:#}")]
    Transient(Arc<anyhow::Error>),

    /// Handler failure that must not be retried.
    #[error("{0:#}")]
    Unrecoverable(Arc<anyhow::Error>),

    /// The handler observed cancellation of its context.
    #[error("Operation cancelled")]
    Cancelled,

    /// A report with this ID was already written.
    #[error("Report {id} already exists")]
    DuplicateReport { id: Uuid },

    /// Report lookup failed.
    #[error("Report not found: {id}")]
    ReportNotFound { id: Uuid },

    /// Report store backend error.
    #[error("Report store error: {message}")]
    StoreError { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A definition version could not be parsed.
    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },
}

impl OpflowError {
    /// Wrap any error as a retryable handler failure.
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        OpflowError::Transient(Arc::new(err.into()))
    }

    /// Wrap any error as a handler failure that stops the retry loop.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        OpflowError::Unrecoverable(Arc::new(err.into()))
    }

    /// Returns true if the retry loop may attempt the invocation again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            OpflowError::Transient(_) => true,
            OpflowError::StoreError { .. } => true,
            _ => false,
        }
    }

    /// The underlying handler error, if this is a handler failure.
    pub fn inner(&self) -> Option<&anyhow::Error> {
        match self {
            OpflowError::Transient(err) | OpflowError::Unrecoverable(err) => Some(err),
            _ => None,
        }
    }
}

/// Mark `err` as unrecoverable so the retry loop stops immediately.
pub fn unrecoverable(err: impl Into<anyhow::Error>) -> OpflowError {
    OpflowError::unrecoverable(err)
}

/// Convenience Result type for opflow operations.
pub type Result<T> = std::result::Result<T, OpflowError>;

impl From<anyhow::Error> for OpflowError {
    fn from(err: anyhow::Error) -> Self {
        // Only unwrap a bare error; downcasting through a context layer would
        // drop the added message.
        if err.chain().count() == 1 {
            if let Some(inner) = err.downcast_ref::<OpflowError>() {
                return inner.clone();
            }
        }

        // An unrecoverable error stays unrecoverable even when a handler has
        // added context on top of it.
        let tagged = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<OpflowError>(),
                Some(OpflowError::Unrecoverable(_)) | Some(OpflowError::Cancelled)
            )
        });

        if tagged {
            OpflowError::Unrecoverable(Arc::new(err))
        } else {
            OpflowError::Transient(Arc::new(err))
        }
    }
}

impl From<serde_json::Error> for OpflowError {
    fn from(err: serde_json::Error) -> Self {
        OpflowError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_recoverable_classification() {
        assert!(OpflowError::transient(anyhow!("rpc timeout")).is_recoverable());
        assert!(!unrecoverable(anyhow!("fatal error")).is_recoverable());
        assert!(!OpflowError::Cancelled.is_recoverable());
        assert!(!OpflowError::SerializationError("bad".into()).is_recoverable());
    }

    #[test]
    fn test_unrecoverable_display_keeps_message() {
        let err = unrecoverable(anyhow!("fatal error"));
        assert!(err.to_string().contains("fatal error"));
    }

    #[test]
    fn test_anyhow_defaults_to_transient() {
        let err: OpflowError = anyhow!("test error").into();
        assert!(matches!(err, OpflowError::Transient(_)));
    }

    #[test]
    fn test_context_does_not_hide_unrecoverable() {
        let wrapped = Err::<(), _>(unrecoverable(anyhow!("rejected")))
            .context("failed to deploy registry for chain 1")
            .unwrap_err();

        let err: OpflowError = wrapped.into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("failed to deploy registry"));
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn test_anyhow_roundtrip_preserves_variant() {
        let original = OpflowError::ReportNotFound { id: Uuid::new_v4() };
        let err: OpflowError = anyhow::Error::new(original).into();
        assert!(matches!(err, OpflowError::ReportNotFound { .. }));
    }
}
