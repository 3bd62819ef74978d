//! Envelope reconciliation between the content system and the automation
//! engine.
//!
//! [`DiffEngine`] is read-only. [`ApplyEngine`] mutates the automation engine
//! and only runs while holding the [`WindowGuard`] for the diff's window, which
//! [`Reconciler::reconcile`] takes with [`WindowLocks::try_acquire`].

mod apply;
mod diff;
mod locks;

pub use apply::{ApplyEngine, ApplyOptions};
pub use diff::{DiffEngine, PlannedOp, ScheduleDiff, SkippedItem};
pub use locks::{WindowGuard, WindowLocks};

use onair_model::{ApplyReport, EnvelopeWindow};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{clock::SharedClock, error::ReconcileResult, retry::RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Full calendar weeks past the current ISO week covered by the envelope.
    pub envelope_weeks_ahead: u32,
    pub protected_window_minutes: u32,
    pub retry: RetryPolicy,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            envelope_weeks_ahead: 2,
            protected_window_minutes: 15,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct Reconciler {
    diff: DiffEngine,
    apply: ApplyEngine,
    locks: WindowLocks,
    clock: SharedClock,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        diff: DiffEngine,
        apply: ApplyEngine,
        clock: SharedClock,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            diff,
            apply,
            locks: WindowLocks::new(),
            clock,
            settings,
        }
    }

    /// The envelope for the current instant.
    pub fn envelope(&self) -> EnvelopeWindow {
        EnvelopeWindow::envelope(self.clock.now(), self.settings.envelope_weeks_ahead)
    }

    pub fn locks(&self) -> &WindowLocks {
        &self.locks
    }

    pub async fn diff(
        &self,
        window: &EnvelopeWindow,
        cancel: &CancellationToken,
    ) -> ReconcileResult<ScheduleDiff> {
        self.diff.diff(window, cancel).await
    }

    /// Diff and apply `window` under its lock. A concurrent call for the same
    /// window fails with `InFlight` instead of waiting.
    pub async fn reconcile(
        &self,
        window: &EnvelopeWindow,
        dry_run: bool,
        cancel: CancellationToken,
    ) -> ReconcileResult<ApplyReport> {
        let guard = self.locks.try_acquire(&window.label)?;
        let diff = self.diff.diff(window, &cancel).await?;
        self.apply
            .apply(&diff, &guard, &ApplyOptions { dry_run, cancel })
            .await
    }
}
