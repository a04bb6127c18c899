mod dual_epoch_map;

pub use dual_epoch_map::*;

pub use tilt_types::Epoch;

/// epoch of unobserved store, anything in the store is newer
pub const INIT_EPOCH: Epoch = -1;

/// changes since epoch
#[derive(Debug)]
pub enum EpochDeltaChanges<V> {
    /// history was fenced, all current values
    SyncAll(Vec<V>),
    /// (updates, deletes)
    Changes((Vec<V>, Vec<V>)),
}

impl<V> EpochDeltaChanges<V> {
    pub fn empty() -> Self {
        Self::Changes((vec![], vec![]))
    }
}

#[derive(Debug)]
pub struct EpochChanges<V> {
    // current epoch
    pub epoch: Epoch,
    changes: EpochDeltaChanges<V>,
}

impl<V> EpochChanges<V> {
    pub fn new(epoch: Epoch, changes: EpochDeltaChanges<V>) -> Self {
        Self { epoch, changes }
    }

    pub fn current_epoch(&self) -> &Epoch {
        &self.epoch
    }

    pub fn is_empty(&self) -> bool {
        match &self.changes {
            EpochDeltaChanges::SyncAll(all) => all.is_empty(),
            EpochDeltaChanges::Changes((updates, deletes)) => {
                updates.is_empty() && deletes.is_empty()
            }
        }
    }

    pub fn into_changes(self) -> EpochDeltaChanges<V> {
        self.changes
    }
}
