//! In-process stand-ins for the two remote systems, with fault injection.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use onair_model::{EnvelopeWindow, ScheduleItem};
use parking_lot::Mutex;

use super::{AutomationEngine, ContentSource, CreatedEntry, RemoteResult};
use crate::error::RemoteError;

#[derive(Debug, Default)]
pub struct InMemoryContentSource {
    items: Mutex<Vec<ScheduleItem>>,
    faults: Mutex<VecDeque<RemoteError>>,
    latency: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl InMemoryContentSource {
    pub fn new(items: Vec<ScheduleItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    /// Inserts `item`, replacing any item with the same id.
    pub fn upsert(&self, item: ScheduleItem) {
        let mut items = self.items.lock();
        items.retain(|existing| existing.id != item.id);
        items.push(item);
    }

    /// The next call returns `err` instead of reading the schedule.
    pub fn fail_next(&self, err: RemoteError) {
        self.faults.lock().push_back(err);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for InMemoryContentSource {
    async fn list_scheduled(
        &self,
        window: &EnvelopeWindow,
    ) -> RemoteResult<Vec<ScheduleItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.faults.lock().pop_front() {
            return Err(err);
        }
        Ok(self
            .items
            .lock()
            .iter()
            .filter(|item| window.intersects(item))
            .cloned()
            .collect())
    }
}

/// Which automation-engine call a fault or counter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCall {
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct EngineState {
    /// Keyed by instance ref.
    entries: BTreeMap<String, ScheduleItem>,
    next_ref: u64,
}

impl EngineState {
    fn insert(&mut self, item: &ScheduleItem) -> String {
        self.next_ref += 1;
        let instance_ref = format!("inst-{}", self.next_ref);
        let mut stored = item.clone();
        stored.remote_instance_ref = Some(instance_ref.clone());
        self.entries.insert(instance_ref.clone(), stored);
        instance_ref
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAutomationEngine {
    state: Mutex<EngineState>,
    faults: Mutex<HashMap<EngineCall, VecDeque<RemoteError>>>,
    calls: Mutex<HashMap<EngineCall, usize>>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryAutomationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `item` without the idempotency check, returning the new
    /// instance ref. Lets tests reproduce double-create residue.
    pub fn insert_raw(&self, item: &ScheduleItem) -> String {
        self.state.lock().insert(item)
    }

    /// Drops an entry behind the reconciler's back.
    pub fn remove_raw(&self, instance_ref: &str) -> Option<ScheduleItem> {
        self.state.lock().entries.remove(instance_ref)
    }

    pub fn entries(&self) -> Vec<ScheduleItem> {
        let mut entries: Vec<_> = self.state.lock().entries.values().cloned().collect();
        entries.sort_by_key(|entry| (entry.start, entry.id));
        entries
    }

    pub fn fail_next(&self, call: EngineCall, err: RemoteError) {
        self.faults.lock().entry(call).or_default().push_back(err);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self, call: EngineCall) -> usize {
        self.calls.lock().get(&call).copied().unwrap_or(0)
    }

    pub fn mutation_calls(&self) -> usize {
        [EngineCall::Create, EngineCall::Update, EngineCall::Delete]
            .into_iter()
            .map(|call| self.calls(call))
            .sum()
    }

    async fn enter(&self, call: EngineCall) -> RemoteResult<()> {
        *self.calls.lock().entry(call).or_default() += 1;
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        match self.faults.lock().get_mut(&call).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AutomationEngine for InMemoryAutomationEngine {
    async fn list_entries(
        &self,
        window: &EnvelopeWindow,
    ) -> RemoteResult<Vec<ScheduleItem>> {
        self.enter(EngineCall::List).await?;
        Ok(self
            .entries()
            .into_iter()
            .filter(|entry| window.intersects(entry))
            .collect())
    }

    async fn create_entry(&self, item: &ScheduleItem) -> RemoteResult<CreatedEntry> {
        self.enter(EngineCall::Create).await?;
        let mut state = self.state.lock();
        let existing = state
            .entries
            .iter()
            .find(|(_, entry)| entry.id == item.id)
            .map(|(instance_ref, _)| instance_ref.clone());
        Ok(match existing {
            Some(instance_ref) => CreatedEntry {
                instance_ref,
                reused: true,
            },
            None => CreatedEntry {
                instance_ref: state.insert(item),
                reused: false,
            },
        })
    }

    async fn update_entry(
        &self,
        instance_ref: &str,
        item: &ScheduleItem,
    ) -> RemoteResult<()> {
        self.enter(EngineCall::Update).await?;
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(instance_ref) else {
            return Err(RemoteError::NotFound(instance_ref.to_string()));
        };
        *entry = ScheduleItem {
            remote_instance_ref: Some(instance_ref.to_string()),
            ..item.clone()
        };
        Ok(())
    }

    async fn delete_entry(&self, instance_ref: &str) -> RemoteResult<()> {
        self.enter(EngineCall::Delete).await?;
        match self.state.lock().entries.remove(instance_ref) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(instance_ref.to_string())),
        }
    }
}
