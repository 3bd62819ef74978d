//! Ports to the two systems of record.
//!
//! The content system answers "what should air"; the automation engine holds
//! "what is queued to air" and accepts mutations. Both are reached only
//! through these traits so the engines can be exercised against
//! [`memory`] doubles.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use onair_model::{EnvelopeWindow, ScheduleItem};

use crate::error::RemoteError;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Answer to [`AutomationEngine::create_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntry {
    pub instance_ref: String,
    /// The id was already queued. The existing entry keeps whatever slot it
    /// had, which may not be the requested one.
    pub reused: bool,
}

#[async_trait]
pub trait ContentSource: Send + Sync + std::fmt::Debug {
    /// Items the content system has scheduled that intersect `window`.
    async fn list_scheduled(
        &self,
        window: &EnvelopeWindow,
    ) -> RemoteResult<Vec<ScheduleItem>>;
}

#[async_trait]
pub trait AutomationEngine: Send + Sync + std::fmt::Debug {
    /// Entries currently queued that intersect `window`. Each carries its
    /// `remote_instance_ref`.
    async fn list_entries(
        &self,
        window: &EnvelopeWindow,
    ) -> RemoteResult<Vec<ScheduleItem>>;

    /// Queues `item`. Creating an item id that is already queued returns the
    /// existing instance untouched, with `reused` set.
    async fn create_entry(&self, item: &ScheduleItem) -> RemoteResult<CreatedEntry>;

    async fn update_entry(
        &self,
        instance_ref: &str,
        item: &ScheduleItem,
    ) -> RemoteResult<()>;

    async fn delete_entry(&self, instance_ref: &str) -> RemoteResult<()>;
}
