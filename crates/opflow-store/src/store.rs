//! Report store implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use opflow_core::{GenericReport, OpflowError, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Trait for report stores.
///
/// Implementations must tolerate concurrent writers: independent top-level
/// invocations share one store.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Write a report. Each ID is written exactly once.
    async fn put(&self, report: GenericReport) -> Result<()>;

    /// Get a report by ID.
    async fn get(&self, id: Uuid) -> Result<Option<GenericReport>>;

    /// Get all reports in the order they were written.
    async fn all(&self) -> Result<Vec<GenericReport>>;

    /// Get the most recent successful report with the given content key.
    async fn find_successful(&self, key: &str) -> Result<Option<GenericReport>> {
        let reports = self.all().await?;
        Ok(reports
            .into_iter()
            .rev()
            .find(|r| r.is_success() && r.content_key() == key))
    }

    /// Get a report followed by all of its descendants, depth first, children
    /// in call order.
    async fn execution_reports(&self, id: Uuid) -> Result<Vec<GenericReport>> {
        let mut flattened = Vec::new();
        let mut pending = vec![id];

        while let Some(next) = pending.pop() {
            let report = self
                .get(next)
                .await?
                .ok_or(OpflowError::ReportNotFound { id: next })?;

            // Reverse so the first child is visited first.
            pending.extend(report.child_operation_reports.iter().rev().copied());
            flattened.push(report);
        }

        Ok(flattened)
    }
}

#[derive(Default)]
struct Reports {
    /// Report storage: id -> report.
    by_id: HashMap<Uuid, GenericReport>,

    /// Write order.
    order: Vec<Uuid>,

    /// Latest successful report per content key.
    successful: HashMap<String, Uuid>,
}

/// In-memory implementation of ReportStore.
#[derive(Clone, Default)]
pub struct InMemoryReportStore {
    reports: Arc<RwLock<Reports>>,
}

impl InMemoryReportStore {
    /// Create a new in-memory report store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reports.
    pub async fn len(&self) -> usize {
        self.reports.read().await.order.len()
    }

    /// Check if empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn put(&self, report: GenericReport) -> Result<()> {
        let mut reports = self.reports.write().await;

        if reports.by_id.contains_key(&report.id) {
            return Err(OpflowError::DuplicateReport { id: report.id });
        }

        if report.is_success() {
            reports.successful.insert(report.content_key(), report.id);
        }

        tracing::debug!("Stored report {} for {}", report.id, report.def);

        reports.order.push(report.id);
        reports.by_id.insert(report.id, report);

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenericReport>> {
        let reports = self.reports.read().await;
        Ok(reports.by_id.get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<GenericReport>> {
        let reports = self.reports.read().await;
        Ok(reports
            .order
            .iter()
            .filter_map(|id| reports.by_id.get(id).cloned())
            .collect())
    }

    async fn find_successful(&self, key: &str) -> Result<Option<GenericReport>> {
        let reports = self.reports.read().await;
        Ok(reports
            .successful
            .get(key)
            .and_then(|id| reports.by_id.get(id))
            .cloned())
    }
}
