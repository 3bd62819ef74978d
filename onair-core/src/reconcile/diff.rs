use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use onair_model::{
    DiffSummary, EnvelopeWindow, ItemId, MediaStatus, OperationKind, ScheduleItem,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    clock::SharedClock,
    error::ReconcileResult,
    media::MediaProbe,
    remote::{AutomationEngine, ContentSource},
    retry::RetryPolicy,
};

/// One mutation the apply engine may issue.
///
/// `item` is the desired record for creates and updates and the queued record
/// for deletes. `instance_ref` is set for updates and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOp {
    pub kind: OperationKind,
    pub item: ScheduleItem,
    pub instance_ref: Option<String>,
    pub protected: bool,
}

/// A create or update held back because its media is not airable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub id: ItemId,
    pub media_status: MediaStatus,
    pub protected: bool,
}

#[derive(Debug, Clone)]
pub struct ScheduleDiff {
    pub window: EnvelopeWindow,
    pub computed_at: DateTime<Utc>,
    pub creates: Vec<PlannedOp>,
    pub updates: Vec<PlannedOp>,
    pub deletes: Vec<PlannedOp>,
    pub skipped: Vec<SkippedItem>,
    pub unchanged: usize,
}

impl ScheduleDiff {
    pub fn summary(&self) -> DiffSummary {
        let protected_ops = self
            .creates
            .iter()
            .chain(&self.updates)
            .chain(&self.deletes)
            .filter(|op| op.protected)
            .count();
        let protected_skips = self.skipped.iter().filter(|s| s.protected).count();
        DiffSummary {
            created: self.creates.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
            unchanged: self.unchanged,
            skipped_missing: self.skipped.len(),
            missing_ids: self.skipped.iter().map(|s| s.id).collect(),
            protected_now: protected_ops + protected_skips,
            partial: !self.skipped.is_empty(),
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = &PlannedOp> {
        self.creates.iter().chain(&self.updates).chain(&self.deletes)
    }
}

/// Time range around "now" in which destructive changes are refused.
#[derive(Debug, Clone, Copy)]
struct ProtectedWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl ProtectedWindow {
    fn around(now: DateTime<Utc>, minutes: u32) -> Self {
        let span = Duration::minutes(i64::from(minutes));
        Self {
            from: now - span,
            to: now + span,
        }
    }

    fn touches(&self, item: &ScheduleItem) -> bool {
        item.start <= self.to && item.end >= self.from
    }
}

/// Read-only comparison of desired (content system) against actual
/// (automation engine) for one window.
#[derive(Debug)]
pub struct DiffEngine {
    content: Arc<dyn ContentSource>,
    automation: Arc<dyn AutomationEngine>,
    probe: Arc<dyn MediaProbe>,
    retry: RetryPolicy,
    clock: SharedClock,
    protected_minutes: u32,
}

impl DiffEngine {
    pub fn new(
        content: Arc<dyn ContentSource>,
        automation: Arc<dyn AutomationEngine>,
        probe: Arc<dyn MediaProbe>,
        retry: RetryPolicy,
        clock: SharedClock,
        protected_minutes: u32,
    ) -> Self {
        Self {
            content,
            automation,
            probe,
            retry,
            clock,
            protected_minutes,
        }
    }

    pub async fn diff(
        &self,
        window: &EnvelopeWindow,
        cancel: &CancellationToken,
    ) -> ReconcileResult<ScheduleDiff> {
        let now = self.clock.now();
        let protected = ProtectedWindow::around(now, self.protected_minutes);

        let content = &self.content;
        let automation = &self.automation;
        let (desired, actual) = tokio::try_join!(
            self.retry
                .run("content.list_scheduled", cancel, || content.list_scheduled(window)),
            self.retry
                .run("automation.list_entries", cancel, || automation.list_entries(window)),
        )?;

        let desired = index_desired(window, desired);
        let mut actual = group_actual(window, actual);

        let mut diff = ScheduleDiff {
            window: window.clone(),
            computed_at: now,
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            skipped: Vec::new(),
            unchanged: 0,
        };

        let mut candidates = Vec::new();
        for (id, wanted) in desired {
            match actual.remove(&id) {
                None => candidates.push(PlannedOp {
                    kind: OperationKind::Create,
                    protected: protected.touches(&wanted),
                    item: wanted,
                    instance_ref: None,
                }),
                Some(mut queued) => {
                    // Keep the entry already in the right slot, else the earliest.
                    let keep = queued
                        .iter()
                        .position(|entry| entry.same_slot(&wanted))
                        .unwrap_or(0);
                    let current = queued.remove(keep);
                    for extra in queued {
                        warn!(item_id = %id, "duplicate automation entry queued for item");
                        diff.deletes.push(delete_op(extra, &protected));
                    }
                    if current.same_slot(&wanted) {
                        diff.unchanged += 1;
                    } else {
                        candidates.push(PlannedOp {
                            kind: OperationKind::Update,
                            protected: protected.touches(&wanted)
                                || protected.touches(&current),
                            item: wanted,
                            instance_ref: current.remote_instance_ref,
                        });
                    }
                }
            }
        }

        for queued in actual.into_values().flatten() {
            diff.deletes.push(delete_op(queued, &protected));
        }

        let media_refs: Vec<String> = candidates
            .iter()
            .map(|op| op.item.media_ref.clone())
            .collect();
        let statuses: Vec<MediaStatus> = stream::iter(media_refs.into_iter().map(|media_ref| {
            let probe = Arc::clone(&self.probe);
            async move { probe.check(&media_ref).await }
        }))
        .buffered(8)
        .collect()
        .await;

        for (op, status) in candidates.into_iter().zip(statuses) {
            if !status.is_present() {
                debug!(
                    item_id = %op.item.id,
                    media_ref = %op.item.media_ref,
                    media_status = status.as_str(),
                    "skipping {} with unavailable media",
                    op.kind.as_str()
                );
                diff.skipped.push(SkippedItem {
                    id: op.item.id,
                    media_status: status,
                    protected: op.protected,
                });
                continue;
            }
            match op.kind {
                OperationKind::Create => diff.creates.push(op),
                _ => diff.updates.push(op),
            }
        }

        info!(
            window = %window.label,
            creates = diff.creates.len(),
            updates = diff.updates.len(),
            deletes = diff.deletes.len(),
            skipped = diff.skipped.len(),
            unchanged = diff.unchanged,
            "schedule diff computed"
        );
        Ok(diff)
    }
}

fn delete_op(queued: ScheduleItem, protected: &ProtectedWindow) -> PlannedOp {
    PlannedOp {
        kind: OperationKind::Delete,
        protected: protected.touches(&queued),
        instance_ref: queued.remote_instance_ref.clone(),
        item: queued,
    }
}

fn index_desired(
    window: &EnvelopeWindow,
    items: Vec<ScheduleItem>,
) -> BTreeMap<ItemId, ScheduleItem> {
    let mut desired = BTreeMap::new();
    for item in items {
        if !item.is_well_formed() {
            warn!(item_id = %item.id, "ignoring content item with start >= end");
            continue;
        }
        if !window.intersects(&item) {
            continue;
        }
        if desired.contains_key(&item.id) {
            warn!(item_id = %item.id, "content system returned item id twice; keeping first");
            continue;
        }
        desired.insert(item.id, item);
    }
    desired
}

fn group_actual(
    window: &EnvelopeWindow,
    entries: Vec<ScheduleItem>,
) -> BTreeMap<ItemId, Vec<ScheduleItem>> {
    let mut grouped: BTreeMap<ItemId, Vec<ScheduleItem>> = BTreeMap::new();
    for entry in entries {
        if entry.remote_instance_ref.is_none() {
            warn!(item_id = %entry.id, "automation entry without instance ref ignored");
            continue;
        }
        if !window.intersects(&entry) {
            continue;
        }
        grouped.entry(entry.id).or_default().push(entry);
    }
    for queued in grouped.values_mut() {
        queued.sort_by(|a, b| {
            (a.start, &a.remote_instance_ref).cmp(&(b.start, &b.remote_instance_ref))
        });
    }
    grouped
}
