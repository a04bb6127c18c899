use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Deref;

use tracing::{debug, trace};

use tilt_types::defaults::DELETED_HISTORY_LIMIT;

use super::{Epoch, EpochChanges, EpochDeltaChanges};

pub const FULL_FILTER: ChangeFlag = ChangeFlag::new(true, true, true);
pub const SPEC_FILTER: ChangeFlag = ChangeFlag::new(true, false, false);
pub const STATUS_FILTER: ChangeFlag = ChangeFlag::new(false, true, false);
pub const META_FILTER: ChangeFlag = ChangeFlag::new(false, false, true);

/// Parts of an object touched by a write, or watched by a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeFlag {
    pub spec: bool,
    pub status: bool,
    pub meta: bool,
}

impl ChangeFlag {
    pub const fn new(spec: bool, status: bool, meta: bool) -> Self {
        Self { spec, status, meta }
    }

    pub const fn all() -> Self {
        FULL_FILTER
    }

    pub fn or(self, other: Self) -> Self {
        Self::new(
            self.spec || other.spec,
            self.status || other.status,
            self.meta || other.meta,
        )
    }

    pub fn is_empty(&self) -> bool {
        !(self.spec || self.status || self.meta)
    }
}

/// Value with the epoch of its creation and of the last write to each of its parts
#[derive(Debug, Default, Clone)]
pub struct DualEpochCounter<T> {
    created_epoch: Epoch,
    spec_epoch: Epoch,
    status_epoch: Epoch,
    meta_epoch: Epoch,
    inner: T,
}

impl<T> DualEpochCounter<T> {
    fn created(inner: T, epoch: Epoch) -> Self {
        Self {
            created_epoch: epoch,
            spec_epoch: epoch,
            status_epoch: epoch,
            meta_epoch: epoch,
            inner,
        }
    }

    fn stamp(&mut self, changes: &ChangeFlag, epoch: Epoch) {
        for (touched, slot) in [
            (changes.spec, &mut self.spec_epoch),
            (changes.status, &mut self.status_epoch),
            (changes.meta, &mut self.meta_epoch),
        ] {
            if touched {
                *slot = epoch;
            }
        }
    }

    /// any watched part was written after `epoch`
    fn changed_after(&self, epoch: Epoch, filter: &ChangeFlag) -> bool {
        (filter.spec && self.spec_epoch > epoch)
            || (filter.status && self.status_epoch > epoch)
            || (filter.meta && self.meta_epoch > epoch)
    }

    #[inline]
    pub fn created_epoch(&self) -> Epoch {
        self.created_epoch
    }

    pub fn spec_epoch(&self) -> Epoch {
        self.spec_epoch
    }

    pub fn status_epoch(&self) -> Epoch {
        self.status_epoch
    }

    pub fn meta_epoch(&self) -> Epoch {
        self.meta_epoch
    }

    #[inline]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn inner_owned(self) -> T {
        self.inner
    }
}

impl<T> Deref for DualEpochCounter<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Map versioned by a single store epoch.
///
/// Writers bump the epoch with [`increment_epoch`](Self::increment_epoch) first,
/// then every insert, stamp or remove records that epoch. Readers ask for changes
/// since the epoch they last saw. Removed values are kept as history so readers
/// learn about deletes; once the history exceeds its limit it is dropped and the
/// fence moves up, readers behind the fence get a full listing instead.
#[derive(Debug)]
pub struct DualEpochMap<K, V> {
    epoch: Epoch,
    fence: Epoch,
    values: HashMap<K, DualEpochCounter<V>>,
    deleted: Vec<DualEpochCounter<V>>,
    history_limit: usize,
}

impl<K, V> Default for DualEpochMap<K, V> {
    fn default() -> Self {
        Self {
            epoch: 0,
            fence: 0,
            values: HashMap::new(),
            deleted: vec![],
            history_limit: DELETED_HISTORY_LIMIT,
        }
    }
}

impl<K, V> Deref for DualEpochMap<K, V> {
    type Target = HashMap<K, DualEpochCounter<V>>;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl<K, V> DualEpochMap<K, V> {
    pub fn increment_epoch(&mut self) {
        self.epoch += 1;
    }

    /// undo increment of a write which did not happen
    pub fn decrement_epoch(&mut self) {
        self.epoch -= 1;
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn fence(&self) -> Epoch {
        self.fence
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    fn move_fence(&mut self) {
        debug!(
            limit = self.history_limit,
            epoch = self.epoch,
            "deleted history full, fencing"
        );
        self.deleted.clear();
        self.fence = self.epoch;
    }
}

impl<K, V> DualEpochMap<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            history_limit,
            ..Default::default()
        }
    }

    /// new value created at current epoch, replaces any previous value
    pub fn insert(&mut self, key: K, value: V) -> Option<DualEpochCounter<V>> {
        trace!(epoch = self.epoch, "insert");
        self.values
            .insert(key, DualEpochCounter::created(value, self.epoch))
    }

    /// mark parts of value as written at current epoch, value is returned for the write
    pub fn stamp<Q>(&mut self, key: &Q, changes: &ChangeFlag) -> Option<&mut DualEpochCounter<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let epoch = self.epoch;
        let value = self.values.get_mut(key)?;
        value.stamp(changes, epoch);
        Some(value)
    }

    /// remove value and keep it in deleted history
    pub fn remove<Q>(&mut self, key: &Q) -> Option<DualEpochCounter<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        let mut removed = self.values.remove(key)?;
        removed.stamp(&FULL_FILTER, self.epoch);
        self.deleted.push(removed.clone());
        if self.deleted.len() > self.history_limit {
            self.move_fence();
        }
        Some(removed)
    }
}

impl<K, V> DualEpochMap<K, V>
where
    V: Clone,
{
    pub fn clone_values(&self) -> Vec<V> {
        self.values.values().map(|v| v.inner.clone()).collect()
    }

    /// every change since epoch
    pub fn changes_since(&self, epoch: Epoch) -> EpochChanges<V> {
        self.changes_since_with_filter(epoch, &FULL_FILTER)
    }

    /// Changes of the watched parts since `epoch`, stamped with current epoch.
    /// A reader behind the fence gets every current value instead of a delta.
    pub fn changes_since_with_filter(&self, epoch: Epoch, filter: &ChangeFlag) -> EpochChanges<V> {
        if epoch < self.fence {
            return EpochChanges::new(self.epoch, EpochDeltaChanges::SyncAll(self.clone_values()));
        }
        if epoch >= self.epoch {
            return EpochChanges::new(self.epoch, EpochDeltaChanges::empty());
        }

        let updates = self
            .values
            .values()
            .filter(|v| v.changed_after(epoch, filter))
            .map(|v| v.inner.clone())
            .collect();

        // skip values which came and went after epoch
        let deletes = self
            .deleted
            .iter()
            .filter(|v| v.created_epoch <= epoch && v.changed_after(epoch, filter))
            .map(|v| v.inner.clone())
            .collect();

        EpochChanges::new(self.epoch, EpochDeltaChanges::Changes((updates, deletes)))
    }
}
