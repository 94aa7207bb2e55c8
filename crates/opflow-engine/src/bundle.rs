//! Execution context passed to every invocation.

use std::sync::Arc;

use opflow_core::{GenericReport, Result};
use opflow_store::ReportStore;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Span;
use uuid::Uuid;

/// Everything a handler needs from its caller: a logger, a source of
/// cancellable contexts and the report store.
///
/// A bundle is cheap to clone. The engine hands each handler its own copy,
/// scoped to the invocation's tracing span.
#[derive(Clone)]
pub struct Bundle {
    /// Span that log events of this invocation are attached to.
    logger: Span,

    /// Root of the cancellable contexts given to handlers.
    cancel: CancellationToken,

    /// Where execution reports are written.
    reporter: Arc<dyn ReportStore>,

    /// Report IDs of invocations made directly by the current handler.
    children: Option<ChildRecorder>,
}

/// Collects child report IDs in the order their invocations finish.
#[derive(Clone, Default)]
pub(crate) struct ChildRecorder {
    ids: Arc<Mutex<Vec<Uuid>>>,
}

impl ChildRecorder {
    pub(crate) async fn push(&self, id: Uuid) {
        self.ids.lock().await.push(id);
    }

    pub(crate) async fn ids(&self) -> Vec<Uuid> {
        self.ids.lock().await.clone()
    }
}

impl Bundle {
    /// Create a new bundle. Log events go to the span current at creation.
    pub fn new(cancel: CancellationToken, reporter: Arc<dyn ReportStore>) -> Self {
        Self {
            logger: Span::current(),
            cancel,
            reporter,
            children: None,
        }
    }

    /// Attach log events to the given span instead.
    pub fn with_logger(mut self, logger: Span) -> Self {
        self.logger = logger;
        self
    }

    /// The span for this invocation.
    pub fn logger(&self) -> &Span {
        &self.logger
    }

    /// A fresh cancellable context, cancelled when the bundle's root is.
    pub fn context(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Check if the root context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The report store.
    pub fn reporter(&self) -> &Arc<dyn ReportStore> {
        &self.reporter
    }

    /// Bundle handed to a handler: scoped to its span, recording its children.
    pub(crate) fn scoped(&self, logger: Span, children: ChildRecorder) -> Self {
        Self {
            logger,
            cancel: self.cancel.clone(),
            reporter: self.reporter.clone(),
            children: Some(children),
        }
    }

    /// Write a report and register it with the enclosing invocation.
    pub(crate) async fn record(&self, report: GenericReport) -> Result<()> {
        let id = report.id;
        self.reporter.put(report).await?;
        self.record_child(id).await;
        Ok(())
    }

    /// Register an already stored report with the enclosing invocation.
    pub(crate) async fn record_child(&self, id: Uuid) {
        if let Some(children) = &self.children {
            children.push(id).await;
        }
    }
}
