use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// Reconciliation scope requested by a caller. Only the rolling envelope is
/// supported today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    Envelope,
}

/// Counts describing what a diff would change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped_missing: usize,
    pub missing_ids: Vec<ItemId>,
    pub protected_now: usize,
    pub partial: bool,
}

impl DiffSummary {
    /// True when applying would not touch the automation engine.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

/// A create/update/delete that still failed after the retry policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOperation {
    pub id: ItemId,
    pub operation: OperationKind,
    pub message: String,
}

/// Outcome of applying a diff to the automation engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub dry_run: bool,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Deletions inside the protected window that were not issued.
    pub refused_protected: usize,
    pub skipped_missing: usize,
    pub failed: Vec<FailedOperation>,
    /// Set when cancellation stopped the run before every operation was issued.
    pub cancelled: bool,
    pub summary: DiffSummary,
}

impl ApplyReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}
