use std::sync::Arc;

use onair_model::{ApplyReport, FailedOperation, OperationKind, ScheduleItem};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    diff::{PlannedOp, ScheduleDiff},
    locks::WindowGuard,
};
use crate::{
    error::{ReconcileError, ReconcileResult, RemoteError},
    remote::AutomationEngine,
    retry::RetryPolicy,
};

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub dry_run: bool,
    /// Stops new operations from being issued. Completed ones stay applied.
    pub cancel: CancellationToken,
}

/// Pushes a [`ScheduleDiff`] into the automation engine.
#[derive(Debug)]
pub struct ApplyEngine {
    automation: Arc<dyn AutomationEngine>,
    retry: RetryPolicy,
}

impl ApplyEngine {
    pub fn new(automation: Arc<dyn AutomationEngine>, retry: RetryPolicy) -> Self {
        Self { automation, retry }
    }

    /// Applies creates, then updates, then deletes. Protected deletes are
    /// refused and counted. Operations that still fail after retries are
    /// listed in the report rather than aborting the run.
    pub async fn apply(
        &self,
        diff: &ScheduleDiff,
        guard: &WindowGuard,
        options: &ApplyOptions,
    ) -> ReconcileResult<ApplyReport> {
        if guard.label() != diff.window.label {
            return Err(ReconcileError::WindowMismatch {
                held: guard.label().to_string(),
                requested: diff.window.label.clone(),
            });
        }

        let summary = diff.summary();
        let mut report = ApplyReport {
            dry_run: options.dry_run,
            skipped_missing: summary.skipped_missing,
            ..ApplyReport::default()
        };

        if options.dry_run {
            report.created = summary.created;
            report.updated = summary.updated;
            report.deleted = summary.deleted;
            report.summary = summary;
            return Ok(report);
        }

        for op in diff.operations() {
            if options.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if op.kind == OperationKind::Delete && op.protected {
                warn!(
                    item_id = %op.item.id,
                    start = %op.item.start,
                    "refusing to delete entry inside protected window"
                );
                report.refused_protected += 1;
                continue;
            }

            match self.execute(op, &options.cancel).await {
                Ok(()) => match op.kind {
                    OperationKind::Create => report.created += 1,
                    OperationKind::Update => report.updated += 1,
                    OperationKind::Delete => report.deleted += 1,
                },
                Err(RemoteError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(err) => {
                    warn!(
                        item_id = %op.item.id,
                        operation = op.kind.as_str(),
                        error = %err,
                        "schedule operation failed"
                    );
                    report.failed.push(FailedOperation {
                        id: op.item.id,
                        operation: op.kind,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(
            window = %diff.window.label,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            refused = report.refused_protected,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "schedule diff applied"
        );
        report.summary = summary;
        Ok(report)
    }

    async fn execute(
        &self,
        op: &PlannedOp,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let automation = &self.automation;
        let item = &op.item;
        match (op.kind, op.instance_ref.as_deref()) {
            (OperationKind::Create, _) | (OperationKind::Update, None) => {
                self.create(item, cancel).await
            }
            (OperationKind::Update, Some(instance_ref)) => {
                let updated = self
                    .retry
                    .run("automation.update_entry", cancel, || {
                        automation.update_entry(instance_ref, item)
                    })
                    .await;
                match updated {
                    Err(RemoteError::NotFound(_)) => {
                        info!(
                            item_id = %item.id,
                            instance_ref,
                            "entry vanished before update; recreating"
                        );
                        self.create(item, cancel).await
                    }
                    other => other,
                }
            }
            (OperationKind::Delete, Some(instance_ref)) => {
                match self
                    .retry
                    .run("automation.delete_entry", cancel, || {
                        automation.delete_entry(instance_ref)
                    })
                    .await
                {
                    Err(RemoteError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
            (OperationKind::Delete, None) => Ok(()),
        }
    }

    /// Creates `item`. An id the engine already holds, for instance one queued
    /// outside the window, is moved into the requested slot.
    async fn create(
        &self,
        item: &ScheduleItem,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let automation = &self.automation;
        let created = self
            .retry
            .run("automation.create_entry", cancel, || automation.create_entry(item))
            .await?;
        if !created.reused {
            return Ok(());
        }

        let instance_ref = created.instance_ref.as_str();
        debug!(
            item_id = %item.id,
            instance_ref,
            "item already queued elsewhere; moving existing entry"
        );
        self.retry
            .run("automation.update_entry", cancel, || {
                automation.update_entry(instance_ref, item)
            })
            .await
    }
}
