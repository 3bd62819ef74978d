//! Core data model definitions shared across onair crates.
//!
//! Everything here is plain data: the two systems of record exchange
//! [`ScheduleItem`]s, the feed side publishes [`FeedSnapshot`]s, and the
//! reconciliation side reports [`DiffSummary`] and [`ApplyReport`] values.
//! Wire names follow the JSON contract consumed by players and the admin UI.

pub mod feed;
pub mod ids;
pub mod reconcile;
pub mod schedule;

pub use feed::{FeedItem, FeedSnapshot, FeedStatus, MediaStatus};
pub use ids::ItemId;
pub use reconcile::{
    ApplyReport, DiffSummary, FailedOperation, OperationKind, ReconcileMode,
};
pub use schedule::{EnvelopeWindow, ScheduleItem};
