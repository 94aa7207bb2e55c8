//! Execution reports.
//!
//! A [`Report`] is the final outcome of one invocation of an operation or
//! sequence. It is built once, when the retry loop ends, and never changes
//! afterwards. Report stores hold the type-erased [`GenericReport`] form.

use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::definition::Definition;
use crate::error::{OpflowError, Result};

/// A report with its input and output erased to JSON values.
pub type GenericReport = Report<serde_json::Value, serde_json::Value>;

/// Final outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report<I, O> {
    /// Unique identifier for this invocation (shared by all of its attempts).
    pub id: Uuid,

    /// The definition that was executed.
    pub def: Definition,

    /// Input as supplied to the final attempt.
    pub input: I,

    /// Output of the handler; absent on failure.
    pub output: Option<O>,

    /// Error of the final attempt; absent on success.
    pub err: Option<ReportError>,

    /// Timestamp when the retry loop ended.
    pub timestamp: DateTime<Utc>,

    /// Number of handler attempts consumed.
    pub attempts: u32,

    /// IDs of the reports of directly nested invocations, in call order.
    #[serde(default)]
    pub child_operation_reports: Vec<Uuid>,
}

/// Serializable form of the error recorded in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    /// Rendered error message, including any context chain.
    pub message: String,

    /// Whether the error was eligible for retry.
    pub recoverable: bool,
}

impl From<&OpflowError> for ReportError {
    fn from(err: &OpflowError) -> Self {
        Self {
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

impl From<ReportError> for OpflowError {
    fn from(err: ReportError) -> Self {
        if err.recoverable {
            OpflowError::transient(err)
        } else {
            OpflowError::unrecoverable(err)
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ReportError {}

impl<I, O> Report<I, O> {
    /// Create a report for a finished invocation.
    pub fn new(
        id: Uuid,
        def: Definition,
        input: I,
        outcome: std::result::Result<O, &OpflowError>,
        attempts: u32,
        child_operation_reports: Vec<Uuid>,
    ) -> Self {
        let (output, err) = match outcome {
            Ok(output) => (Some(output), None),
            Err(err) => (None, Some(ReportError::from(err))),
        };

        Self {
            id,
            def,
            input,
            output,
            err,
            timestamp: Utc::now(),
            attempts,
            child_operation_reports,
        }
    }

    /// Check if the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }

    /// Turn the report back into the handler's result.
    pub fn into_result(self) -> Result<O> {
        match (self.output, self.err) {
            (_, Some(err)) => Err(err.into()),
            (Some(output), None) => Ok(output),
            (None, None) => Err(OpflowError::SerializationError(format!(
                "report {} has neither output nor error",
                self.id
            ))),
        }
    }
}

impl<I: Serialize, O: Serialize> Report<I, O> {
    /// Erase input and output to JSON values.
    pub fn to_generic(&self) -> Result<GenericReport> {
        let output = match &self.output {
            Some(output) => Some(serde_json::to_value(output)?),
            None => None,
        };

        Ok(GenericReport {
            id: self.id,
            def: self.def.clone(),
            input: serde_json::to_value(&self.input)?,
            output,
            err: self.err.clone(),
            timestamp: self.timestamp,
            attempts: self.attempts,
            child_operation_reports: self.child_operation_reports.clone(),
        })
    }
}

impl GenericReport {
    /// Recover typed input and output from a stored report.
    pub fn decode<I: DeserializeOwned, O: DeserializeOwned>(&self) -> Result<Report<I, O>> {
        let output = match &self.output {
            Some(output) => Some(serde_json::from_value(output.clone())?),
            None => None,
        };

        Ok(Report {
            id: self.id,
            def: self.def.clone(),
            input: serde_json::from_value(self.input.clone())?,
            output,
            err: self.err.clone(),
            timestamp: self.timestamp,
            attempts: self.attempts,
            child_operation_reports: self.child_operation_reports.clone(),
        })
    }

    /// Content-addressed key of this report's definition and input.
    pub fn content_key(&self) -> String {
        content_key(&self.def, &self.input)
    }
}

/// Compute the SHA-256 content key of a definition identity and input.
///
/// Descriptions do not take part in the key.
pub fn content_key(def: &Definition, input: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(def.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(def.version.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(input.to_string().as_bytes());

    hex::encode(hasher.finalize())
}

/// Report of a sequence invocation together with its flattened report tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceReport<I, O> {
    /// The sequence's own report.
    #[serde(flatten)]
    pub report: Report<I, O>,

    /// The sequence's own report followed by every descendant report, in
    /// invocation order.
    pub execution_reports: Vec<GenericReport>,
}

impl<I, O> SequenceReport<I, O> {
    /// Split into the sequence's own report and the flattened tree.
    pub fn into_parts(self) -> (Report<I, O>, Vec<GenericReport>) {
        (self.report, self.execution_reports)
    }

    /// Turn the sequence's own report back into the handler's result.
    pub fn into_result(self) -> Result<O> {
        self.report.into_result()
    }
}

impl<I: Serialize, O: Serialize> SequenceReport<I, O> {
    /// Erase the sequence's own report to JSON values.
    pub fn to_generic(&self) -> Result<GenericReport> {
        self.report.to_generic()
    }
}

impl<I, O> Deref for SequenceReport<I, O> {
    type Target = Report<I, O>;

    fn deref(&self) -> &Self::Target {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use semver::Version;

    fn def() -> Definition {
        Definition::new("plus1", Version::new(1, 0, 0), "adds one")
    }

    #[test]
    fn test_success_report() {
        let report: Report<i64, i64> = Report::new(Uuid::new_v4(), def(), 1, Ok(2), 1, vec![]);

        assert!(report.is_success());
        assert_eq!(report.output, Some(2));
        assert!(report.err.is_none());
    }

    #[test]
    fn test_failure_report_has_no_output() {
        let err = OpflowError::unrecoverable(anyhow!("fatal error"));
        let report: Report<i64, i64> = Report::new(Uuid::new_v4(), def(), 1, Err(&err), 1, vec![]);

        assert!(!report.is_success());
        assert!(report.output.is_none());
        let recorded = report.err.unwrap();
        assert!(recorded.message.contains("fatal error"));
        assert!(!recorded.recoverable);
    }

    #[test]
    fn test_into_result() {
        let ok: Report<i64, i64> = Report::new(Uuid::new_v4(), def(), 1, Ok(2), 1, vec![]);
        assert_eq!(ok.into_result().unwrap(), 2);

        let err = OpflowError::unrecoverable(anyhow!("fatal error"));
        let failed: Report<i64, i64> = Report::new(Uuid::new_v4(), def(), 1, Err(&err), 1, vec![]);
        let err = failed.into_result().unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "fatal error");
    }

    #[test]
    fn test_generic_decode() {
        let report: Report<i64, String> =
            Report::new(Uuid::new_v4(), def(), 7, Ok("0xabc".to_string()), 3, vec![]);

        let generic = report.to_generic().unwrap();
        assert_eq!(generic.input, serde_json::json!(7));

        let decoded: Report<i64, String> = generic.decode().unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn test_content_key_ignores_description_and_tracks_input() {
        let a = content_key(&def(), &serde_json::json!({"chain": 1}));
        let b = content_key(
            &Definition::new("plus1", Version::new(1, 0, 0), "other text"),
            &serde_json::json!({"chain": 1}),
        );
        let c = content_key(&def(), &serde_json::json!({"chain": 2}));
        let d = content_key(
            &Definition::new("plus1", Version::new(2, 0, 0), "adds one"),
            &serde_json::json!({"chain": 1}),
        );

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_sequence_report_serializes_flat() {
        let report: Report<i64, i64> = Report::new(Uuid::new_v4(), def(), 1, Ok(3), 1, vec![]);
        let generic = report.to_generic().unwrap();
        let seq = SequenceReport {
            report,
            execution_reports: vec![generic],
        };

        let json = serde_json::to_value(&seq).unwrap();
        assert_eq!(json["output"], 3);
        assert_eq!(json["execution_reports"].as_array().unwrap().len(), 1);
        assert_eq!(seq.output, Some(3));
    }
}
