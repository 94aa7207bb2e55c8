//! Execution engine: the retry loop and report recording.
//!
//! Every call to [`execute_operation`] or [`execute_sequence`] gets one fresh
//! report ID and writes exactly one report, after its retry loop has ended.
//! Calls made from inside a handler are recorded as that invocation's
//! children, so report trees follow the call stack.

use opflow_core::{
    content_key, Definition, OpflowError, Report, ReportError, Result, SequenceReport, UnitKind,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::bundle::{Bundle, ChildRecorder};
use crate::operation::{HandlerFuture, Operation, Sequence};
use crate::options::{ExecuteOptions, RetryConfig};

/// A failed invocation: the stored report together with the error.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExecutionFailure<R> {
    /// The report written for the invocation.
    pub report: R,

    /// The error of the final attempt, verbatim.
    pub error: OpflowError,
}

impl<R> From<ExecutionFailure<R>> for OpflowError {
    fn from(failure: ExecutionFailure<R>) -> Self {
        failure.error
    }
}

/// Result of [`execute_operation`].
pub type OperationOutcome<I, O> =
    std::result::Result<Report<I, O>, ExecutionFailure<Report<I, O>>>;

/// Result of [`execute_sequence`].
pub type SequenceOutcome<I, O> =
    std::result::Result<SequenceReport<I, O>, ExecutionFailure<SequenceReport<I, O>>>;

/// Execute an operation with the engine's default options.
pub async fn execute_operation<I, O, D>(
    bundle: &Bundle,
    operation: &Operation<I, O, D>,
    deps: D,
    input: I,
) -> OperationOutcome<I, O>
where
    I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    O: Serialize + DeserializeOwned + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    execute_operation_with(bundle, operation, deps, input, ExecuteOptions::default()).await
}

/// Execute an operation under the given options.
pub async fn execute_operation_with<I, O, D>(
    bundle: &Bundle,
    operation: &Operation<I, O, D>,
    deps: D,
    input: I,
    options: ExecuteOptions<I, D>,
) -> OperationOutcome<I, O>
where
    I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    O: Serialize + DeserializeOwned + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    let (report, error) = execute_unit(
        bundle,
        UnitKind::Operation,
        operation.def(),
        |b, d, i| (operation.handler())(b, d, i),
        deps,
        input,
        &options,
    )
    .await;

    match error {
        None => Ok(report),
        Some(error) => Err(ExecutionFailure { report, error }),
    }
}

/// Execute a sequence with the engine's default options.
pub async fn execute_sequence<I, O, D>(
    bundle: &Bundle,
    sequence: &Sequence<I, O, D>,
    deps: D,
    input: I,
) -> SequenceOutcome<I, O>
where
    I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    O: Serialize + DeserializeOwned + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    execute_sequence_with(bundle, sequence, deps, input, ExecuteOptions::default()).await
}

/// Execute a sequence under the given options.
///
/// The retry policy applies to the whole handler body. Handlers that are not
/// safe to re-run from the top should pass [`RetryConfig::disabled`] and rely
/// on the retry policies of their nested operations instead.
pub async fn execute_sequence_with<I, O, D>(
    bundle: &Bundle,
    sequence: &Sequence<I, O, D>,
    deps: D,
    input: I,
    options: ExecuteOptions<I, D>,
) -> SequenceOutcome<I, O>
where
    I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    O: Serialize + DeserializeOwned + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    let (mut report, error) = execute_unit(
        bundle,
        UnitKind::Sequence,
        sequence.def(),
        |b, d, i| (sequence.handler())(b, d, i),
        deps,
        input,
        &options,
    )
    .await;

    let (execution_reports, error) = match bundle.reporter().execution_reports(report.id).await {
        Ok(reports) => (reports, error),
        Err(walk_error) => {
            error!("Failed to collect reports of sequence {}: {}", report.id, walk_error);
            let error = error.unwrap_or_else(|| engine_failure(&mut report, walk_error));
            (Vec::new(), Some(error))
        }
    };

    let report = SequenceReport {
        report,
        execution_reports,
    };

    match error {
        None => Ok(report),
        Some(error) => Err(ExecutionFailure { report, error }),
    }
}

/// State of one attempt of the retry loop.
struct Attempt<I> {
    /// 1-based attempt number.
    number: u32,

    /// Input handed to the handler on this attempt.
    input: I,

    /// Error of the previous attempt.
    last_error: Option<OpflowError>,
}

impl<I> Attempt<I> {
    fn first(input: I) -> Self {
        Self {
            number: 1,
            input,
            last_error: None,
        }
    }

    fn retry(self, input: I, error: OpflowError) -> Self {
        Self {
            number: self.number + 1,
            input,
            last_error: Some(error),
        }
    }
}

/// Outcome of the retry loop.
struct Finished<I, O> {
    input: I,
    attempts: u32,
    outcome: Result<O>,
}

/// Run one invocation end to end and write its report.
///
/// Returns the report and, on failure, the error to hand back to the caller.
async fn execute_unit<I, O, D, F>(
    bundle: &Bundle,
    kind: UnitKind,
    def: &Definition,
    call: F,
    deps: D,
    input: I,
    options: &ExecuteOptions<I, D>,
) -> (Report<I, O>, Option<OpflowError>)
where
    I: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    O: Serialize + DeserializeOwned + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
    F: Fn(Bundle, D, I) -> HandlerFuture<O>,
{
    let id = Uuid::new_v4();
    let span = info_span!(
        parent: bundle.logger(),
        "invocation",
        kind = kind.as_str(),
        name = %def.name,
        version = %def.version,
        report_id = %id,
    );

    async move {
        if options.reuse_previous {
            if let Some(previous) = find_previous::<I, O>(bundle, def, &input).await {
                info!("Reusing report {} of {}", previous.id, def);
                bundle.record_child(previous.id).await;
                return (previous, None);
            }
        }

        let children = ChildRecorder::default();
        let scoped = bundle.scoped(tracing::Span::current(), children.clone());

        let finished = run_with_retry(&scoped, def, &call, &deps, input, &options.retry).await;
        let child_ids = children.ids().await;

        let (mut report, error) = match finished.outcome {
            Ok(output) => (
                Report::new(id, def.clone(), finished.input, Ok(output), finished.attempts, child_ids),
                None,
            ),
            Err(err) => {
                let report = Report::new(
                    id,
                    def.clone(),
                    finished.input,
                    Err(&err),
                    finished.attempts,
                    child_ids,
                );
                (report, Some(err))
            }
        };

        let stored = match report.to_generic() {
            Ok(generic) => bundle.record(generic).await,
            Err(err) => Err(err),
        };

        match stored {
            Ok(()) => {
                if error.is_none() {
                    info!("✅ {} completed after {} attempt(s)", def, report.attempts);
                }
                (report, error)
            }
            Err(store_error) => {
                error!("Failed to store report {} of {}: {}", id, def, store_error);
                let error = error.unwrap_or_else(|| engine_failure(&mut report, store_error));
                (report, Some(error))
            }
        }
    }
    .instrument(span)
    .await
}

/// Turn a successful report into a failed one after the engine itself failed
/// to record or collect it.
///
/// The error is unrecoverable: the handler's side effects already happened,
/// and an enclosing sequence must not run them again.
fn engine_failure<I, O>(report: &mut Report<I, O>, cause: OpflowError) -> OpflowError {
    let error = OpflowError::unrecoverable(cause);
    report.output = None;
    report.err = Some(ReportError::from(&error));
    error
}

/// The retry loop. Returns after the first success, the first unrecoverable
/// error, or the last allowed attempt.
async fn run_with_retry<I, O, D, F>(
    bundle: &Bundle,
    def: &Definition,
    call: &F,
    deps: &D,
    input: I,
    retry: &RetryConfig<I, D>,
) -> Finished<I, O>
where
    I: Clone,
    D: Clone,
    F: Fn(Bundle, D, I) -> HandlerFuture<O>,
{
    let max_attempts = retry.effective_attempts();
    let mut attempt = Attempt::first(input);

    loop {
        match &attempt.last_error {
            Some(last) => debug!("Attempt {}/{} of {} after: {}", attempt.number, max_attempts, def, last),
            None => debug!("Attempt {}/{} of {}", attempt.number, max_attempts, def),
        }

        let result = call(bundle.clone(), deps.clone(), attempt.input.clone()).await;

        let err = match result {
            Ok(output) => {
                return Finished {
                    input: attempt.input,
                    attempts: attempt.number,
                    outcome: Ok(output),
                }
            }
            Err(err) => err,
        };

        if !err.is_recoverable() {
            error!("❌ {} failed with unrecoverable error: {}", def, err);
            return Finished {
                input: attempt.input,
                attempts: attempt.number,
                outcome: Err(err),
            };
        }

        if attempt.number >= max_attempts {
            error!("❌ {} failed after {} attempt(s): {}", def, attempt.number, err);
            return Finished {
                input: attempt.input,
                attempts: attempt.number,
                outcome: Err(err),
            };
        }

        let delay = retry.backoff.delay_after(attempt.number);
        warn!(
            "{} attempt {}/{} failed, retrying in {:?}: {}",
            def, attempt.number, max_attempts, delay, err
        );

        let next_input = match &retry.input_hook {
            Some(hook) => hook(&attempt.input, deps),
            None => attempt.input.clone(),
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }

        attempt = attempt.retry(next_input, err);
    }
}

/// Look up an earlier successful report for the same definition and input.
async fn find_previous<I, O>(bundle: &Bundle, def: &Definition, input: &I) -> Option<Report<I, O>>
where
    I: Serialize + DeserializeOwned,
    O: DeserializeOwned,
{
    let key = match serde_json::to_value(input) {
        Ok(value) => content_key(def, &value),
        Err(err) => {
            warn!("Cannot compute content key for {}: {}", def, err);
            return None;
        }
    };

    let previous = match bundle.reporter().find_successful(&key).await {
        Ok(previous) => previous?,
        Err(err) => {
            warn!("Report lookup for {} failed: {}", def, err);
            return None;
        }
    };

    match previous.decode() {
        Ok(report) => Some(report),
        Err(err) => {
            warn!("Stored report {} of {} does not decode: {}", previous.id, def, err);
            None
        }
    }
}
