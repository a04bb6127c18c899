//!
//! # Watch
//!
//! Lazy, infinite sequence of object events for one kind.
//! A watcher starting without version first lists every object as `Added`.
//! Events for a single object follow store order; nothing is promised across objects.
//! Watchers falling behind a fenced history resynchronise from a full listing.
//!
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::{ObjectKey, ResourceVersion, Spec};

use super::{
    ChangeFlag, ChangeListener, Epoch, EpochDeltaChanges, FULL_FILTER, INIT_EPOCH, LocalStore,
    META_FILTER, MetadataStoreObject, SPEC_FILTER, STATUS_FILTER,
};

/// which part of an object wakes a watcher
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WatchFilter {
    /// spec and metadata writes
    Spec,
    /// status sub-resource writes
    Status,
    #[default]
    All,
}

impl WatchFilter {
    pub fn change_flag(&self) -> ChangeFlag {
        match self {
            Self::Spec => SPEC_FILTER.or(META_FILTER),
            Self::Status => STATUS_FILTER,
            Self::All => FULL_FILTER,
        }
    }

    /// version of the part of the object this filter looks at
    fn version_of<S: Spec>(&self, obj: &MetadataStoreObject<S>) -> ResourceVersion {
        match self {
            Self::Spec => obj.meta.spec_version,
            Self::Status => obj.meta.status_version,
            Self::All => obj.meta.resource_version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent<S>
where
    S: Spec,
{
    pub event_type: WatchEventType,
    pub object: MetadataStoreObject<S>,
    pub resource_version: ResourceVersion,
}

impl<S> WatchEvent<S>
where
    S: Spec,
{
    fn new(event_type: WatchEventType, object: MetadataStoreObject<S>) -> Self {
        let resource_version = object.meta.resource_version;
        Self {
            event_type,
            object,
            resource_version,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.object.key()
    }
}

pub struct Watcher<S>
where
    S: Spec,
{
    store: Arc<LocalStore<S>>,
    filter: WatchFilter,
    listener: ChangeListener,
    /// objects delivered so far, used to diff on resync
    known: HashMap<ObjectKey, MetadataStoreObject<S>>,
    pending: VecDeque<WatchEvent<S>>,
}

impl<S> fmt::Debug for Watcher<S>
where
    S: Spec,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} watcher {:?} {:?}",
            S::LABEL,
            self.filter,
            self.listener
        )
    }
}

impl<S> Watcher<S>
where
    S: Spec,
{
    pub(crate) fn new(
        store: Arc<LocalStore<S>>,
        filter: WatchFilter,
        since: Option<ResourceVersion>,
    ) -> Self {
        let current = store.event_publisher().current_change();
        let last_epoch = match since.map(|version| version.epoch()) {
            // not issued by this store, start over from a full listing
            Some(epoch) if epoch > current => {
                debug!(
                    kind = S::LABEL,
                    since = epoch,
                    current,
                    "version ahead of store, relisting"
                );
                INIT_EPOCH
            }
            Some(epoch) => epoch,
            None => INIT_EPOCH,
        };
        let listener = store.event_publisher().change_listener_since(last_epoch);
        Self {
            store,
            filter,
            listener,
            known: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn filter(&self) -> WatchFilter {
        self.filter
    }

    /// last epoch seen, watch can be resumed from it
    pub fn last_version(&self) -> ResourceVersion {
        ResourceVersion::new(self.listener.last_change())
    }

    /// next event, waits until there is one
    pub async fn next(&mut self) -> WatchEvent<S> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }

            if self.listener.has_change() {
                self.sync().await;
            } else {
                self.listener.listen().await;
            }
        }
    }

    /// all events accumulated, waits until there is at least one
    pub async fn next_batch(&mut self) -> Vec<WatchEvent<S>> {
        let first = self.next().await;
        let mut batch = vec![first];
        batch.extend(self.pending.drain(..));
        batch
    }

    /// pull changes since last epoch into pending events
    async fn sync(&mut self) {
        let since = self.listener.last_change();
        let read_guard = self.store.read().await;
        let changes = read_guard.changes_since_with_filter(since, &self.filter.change_flag());
        let epoch = changes.epoch;

        match changes.into_changes() {
            EpochDeltaChanges::SyncAll(all) => {
                drop(read_guard);
                debug!(kind = S::LABEL, since, epoch, count = all.len(), "resync");
                self.resync(all);
            }
            EpochDeltaChanges::Changes((updates, deletes)) => {
                trace!(
                    kind = S::LABEL,
                    since,
                    epoch,
                    updates = updates.len(),
                    deletes = deletes.len(),
                    "delta"
                );
                for deleted in deletes {
                    self.known.remove(&deleted.key());
                    self.pending
                        .push_back(WatchEvent::new(WatchEventType::Deleted, deleted));
                }

                for updated in updates {
                    let key = updated.key();
                    let created_epoch: Epoch = read_guard
                        .get(&key)
                        .map(|value| value.created_epoch())
                        .unwrap_or(epoch);
                    let event_type = if created_epoch > since {
                        WatchEventType::Added
                    } else {
                        WatchEventType::Modified
                    };
                    self.known.insert(key, updated.clone());
                    self.pending.push_back(WatchEvent::new(event_type, updated));
                }
                drop(read_guard);
            }
        }

        self.listener.set_last_change(epoch);
    }

    /// diff full listing against objects already delivered
    fn resync(&mut self, all: Vec<MetadataStoreObject<S>>) {
        let mut current: HashMap<ObjectKey, MetadataStoreObject<S>> =
            all.into_iter().map(|obj| (obj.key(), obj)).collect();

        let vanished: Vec<ObjectKey> = self
            .known
            .keys()
            .filter(|key| !current.contains_key(*key))
            .cloned()
            .collect();
        for key in vanished {
            if let Some(last) = self.known.remove(&key) {
                self.pending
                    .push_back(WatchEvent::new(WatchEventType::Deleted, last));
            }
        }

        for (key, obj) in current.drain() {
            let event_type = match self.known.get(&key) {
                None => WatchEventType::Added,
                Some(known) if known.meta.uid != obj.meta.uid => {
                    // same name, new incarnation
                    self.pending.push_back(WatchEvent::new(
                        WatchEventType::Deleted,
                        known.clone(),
                    ));
                    WatchEventType::Added
                }
                Some(known) if self.filter.version_of(known) != self.filter.version_of(&obj) => {
                    WatchEventType::Modified
                }
                Some(_) => continue,
            };
            self.known.insert(key, obj.clone());
            self.pending.push_back(WatchEvent::new(event_type, obj));
        }
    }
}
