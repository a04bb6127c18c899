use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use event_listener::{Event, EventListener};
use tracing::trace;

use tilt_types::Epoch;

/// Latest store epoch, broadcast to every interested listener.
/// Epochs only move forward.
#[derive(Debug, Default)]
pub struct EventPublisher {
    event: Event,
    change: AtomicI64,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn notify(&self) {
        self.event.notify(usize::MAX);
    }

    #[inline]
    pub fn current_change(&self) -> Epoch {
        self.change.load(Ordering::SeqCst)
    }

    /// publish epoch, older epochs are ignored but still wake listeners
    pub fn store_change(&self, epoch: Epoch) {
        let previous = self.change.fetch_max(epoch, Ordering::SeqCst);
        trace!(previous, epoch, "store change");
        self.notify();
    }

    /// listener starting at current epoch
    pub fn change_listener(self: &Arc<Self>) -> ChangeListener {
        self.change_listener_since(self.current_change())
    }

    /// listener which reports every epoch after `last_change`
    pub fn change_listener_since(self: &Arc<Self>, last_change: Epoch) -> ChangeListener {
        ChangeListener {
            publisher: self.clone(),
            last_change,
        }
    }

    pub fn listen(&self) -> EventListener {
        self.event.listen()
    }
}

/// Cursor over a publisher. It has a change while the published epoch is ahead
/// of the last epoch the owner acknowledged.
pub struct ChangeListener {
    publisher: Arc<EventPublisher>,
    last_change: Epoch,
}

impl fmt::Debug for ChangeListener {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ChangeListener")
            .field("last", &self.last_change)
            .field("current", &self.publisher.current_change())
            .finish()
    }
}

impl ChangeListener {
    #[inline]
    pub fn has_change(&self) -> bool {
        self.current_change() > self.last_change
    }

    /// acknowledge everything published so far
    #[inline]
    pub fn load_last(&mut self) {
        self.last_change = self.current_change();
    }

    #[inline]
    pub fn set_last_change(&mut self, epoch: Epoch) {
        self.last_change = epoch;
    }

    #[inline]
    pub fn last_change(&self) -> Epoch {
        self.last_change
    }

    pub fn current_change(&self) -> Epoch {
        self.publisher.current_change()
    }

    /// resolves once there is an unacknowledged change
    pub async fn listen(&self) {
        while !self.has_change() {
            // register before re-checking so a publish in between is not lost
            let listener = self.publisher.listen();
            if self.has_change() {
                break;
            }
            listener.await;
        }
        trace!(last = self.last_change, current = self.current_change(), "changed");
    }
}
