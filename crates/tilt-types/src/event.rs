use std::sync::atomic::{Ordering, AtomicBool};
use std::sync::Arc;

use tracing::trace;
use event_listener::Event;

const DEFAULT_EVENT_ORDERING: Ordering = Ordering::SeqCst;

/// One-shot event which stays set once notified.
/// Used for shutdown, cancellation and bind signals.
/// Listeners that arrive after `notify` return immediately.
#[derive(Debug, Default)]
pub struct StickyEvent {
    flag: AtomicBool,
    event: Event,
}

impl StickyEvent {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // is flag set
    pub fn is_set(&self) -> bool {
        self.flag.load(DEFAULT_EVENT_ORDERING)
    }

    /// wait until flag is set
    pub async fn listen(&self) {
        if self.is_set() {
            trace!("before, flag is set");
            return;
        }

        let listener = self.event.listen();

        if self.is_set() {
            trace!("after flag is set");
            return;
        }

        listener.await
    }

    /// set the flag and wake up all listeners.
    /// returns true only for the first caller
    pub fn notify(&self) -> bool {
        let first = !self.flag.swap(true, DEFAULT_EVENT_ORDERING);
        self.event.notify(usize::MAX);
        first
    }
}
