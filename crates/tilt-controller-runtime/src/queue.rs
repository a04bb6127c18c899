//!
//! # Work queue
//!
//! Keys waiting for reconcile. A key is never handed to two workers at once and
//! is queued at most once; keys added while being processed are queued again on `done`.
//!
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use adaptive_backoff::prelude::{Backoff, ExponentialBackoff};
use async_lock::Mutex;
use event_listener::Event;
use tracing::{debug, trace};

use fluvio_future::task::spawn;
use fluvio_future::timer::sleep;

use tilt_stream_model::core::ObjectKey;
use tilt_types::event::StickyEvent;

use crate::config::ManagerConfig;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    /// keys handed to workers, with their cancel signal
    processing: HashMap<ObjectKey, Arc<StickyEvent>>,
    failures: HashMap<ObjectKey, ExponentialBackoff>,
    /// keys with a delayed retry already scheduled
    retrying: HashSet<ObjectKey>,
    shutdown: bool,
}

pub struct WorkQueue {
    label: &'static str,
    state: Mutex<QueueState>,
    event: Event,
    config: ManagerConfig,
}

impl WorkQueue {
    pub fn shared(label: &'static str, config: ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            label,
            state: Mutex::new(QueueState::default()),
            event: Event::new(),
            config,
        })
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_shutdown(&self) -> bool {
        self.state.lock().await.shutdown
    }

    pub async fn add(&self, key: ObjectKey) {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return;
        }
        if !state.dirty.insert(key.clone()) {
            trace!(kind = self.label, %key, "already queued");
            return;
        }
        if state.processing.contains_key(&key) {
            // picked up again on done
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.event.notify(1);
    }

    /// add key after delay
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            let queue = self.clone();
            spawn(async move { queue.add(key).await });
            return;
        }
        let queue = self.clone();
        spawn(async move {
            sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// add key after its next backoff interval, returns the delay.
    /// at most one retry per key is scheduled at a time
    pub async fn add_rate_limited(self: &Arc<Self>, key: ObjectKey) -> Duration {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return Duration::ZERO;
        }
        let delay = match state.failures.get_mut(&key) {
            Some(backoff) => backoff.wait(),
            None => match self.config.create_backoff() {
                Ok(mut backoff) => {
                    let delay = backoff.wait();
                    state.failures.insert(key.clone(), backoff);
                    delay
                }
                Err(err) => {
                    debug!(kind = self.label, %err, "invalid backoff, using minimum");
                    self.config.backoff_min
                }
            },
        };
        let schedule = state.retrying.insert(key.clone());
        drop(state);

        if !schedule {
            trace!(kind = self.label, %key, "retry already scheduled");
            return delay;
        }

        debug!(kind = self.label, %key, ?delay, "retry after");
        let queue = self.clone();
        spawn(async move {
            sleep(delay).await;
            queue.retry(key).await;
        });
        delay
    }

    async fn retry(&self, key: ObjectKey) {
        self.state.lock().await.retrying.remove(&key);
        self.add(key).await;
    }

    /// reset backoff of key
    pub async fn forget(&self, key: &ObjectKey) {
        self.state.lock().await.failures.remove(key);
    }

    /// key is backing off after failures
    pub async fn has_failures(&self, key: &ObjectKey) -> bool {
        self.state.lock().await.failures.contains_key(key)
    }

    /// key has a delayed retry pending
    pub async fn is_retrying(&self, key: &ObjectKey) -> bool {
        self.state.lock().await.retrying.contains(key)
    }

    /// next key to process with its cancel signal, None once shut down
    pub async fn next(&self) -> Option<(ObjectKey, Arc<StickyEvent>)> {
        loop {
            let mut state = self.state.lock().await;
            if state.shutdown {
                return None;
            }
            if let Some(key) = state.queue.pop_front() {
                state.dirty.remove(&key);
                let cancel = StickyEvent::shared();
                state.processing.insert(key.clone(), cancel.clone());
                return Some((key, cancel));
            }

            let listener = self.event.listen();
            drop(state);
            listener.await;
        }
    }

    /// mark key as finished, requeue if it was added while processing
    pub async fn done(&self, key: &ObjectKey) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutdown {
            state.queue.push_back(key.clone());
            drop(state);
            self.event.notify(1);
        }
    }

    /// signal in-flight reconcile of key to stop
    pub async fn cancel(&self, key: &ObjectKey) -> bool {
        let state = self.state.lock().await;
        match state.processing.get(key) {
            Some(cancel) => {
                debug!(kind = self.label, %key, "cancel in-flight reconcile");
                cancel.notify();
                true
            }
            None => false,
        }
    }

    /// stop handing out keys and cancel everything in flight
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.shutdown = true;
        state.queue.clear();
        state.dirty.clear();
        state.retrying.clear();
        for cancel in state.processing.values() {
            cancel.notify();
        }
        drop(state);
        debug!(kind = self.label, "queue shutdown");
        self.event.notify(usize::MAX);
    }
}

#[cfg(test)]
mod test {

    use std::time::Duration;

    use fluvio_future::task::spawn_task;
    use fluvio_future::timer::sleep;

    use tilt_stream_model::core::ObjectKey;

    use crate::config::ManagerConfig;

    use super::WorkQueue;

    fn config() -> ManagerConfig {
        ManagerConfig::builder()
            .backoff_min(Duration::from_millis(5))
            .backoff_max(Duration::from_millis(40))
            .build()
            .expect("config")
    }

    #[fluvio_future::test]
    async fn test_queue_dedup() {
        let queue = WorkQueue::shared("Test", config());
        queue.add(ObjectKey::new("a")).await;
        queue.add(ObjectKey::new("a")).await;
        queue.add(ObjectKey::new("b")).await;
        assert_eq!(queue.len().await, 2);

        let (key, _) = queue.next().await.expect("key");
        assert_eq!(key, ObjectKey::new("a"));
    }

    #[fluvio_future::test]
    async fn test_queue_key_not_processed_twice() {
        let queue = WorkQueue::shared("Test", config());
        let key = ObjectKey::new("a");
        queue.add(key.clone()).await;

        let (first, _) = queue.next().await.expect("key");
        // added again while processing
        queue.add(key.clone()).await;
        assert!(queue.is_empty().await);

        queue.done(&first).await;
        assert_eq!(queue.len().await, 1);
        let (second, _) = queue.next().await.expect("key");
        assert_eq!(second, key);
        queue.done(&second).await;
        assert!(queue.is_empty().await);
    }

    #[fluvio_future::test]
    async fn test_queue_cancel_and_shutdown() {
        let queue = WorkQueue::shared("Test", config());
        queue.add(ObjectKey::new("a")).await;
        let (key, cancel) = queue.next().await.expect("key");
        assert!(!cancel.is_set());

        assert!(queue.cancel(&key).await);
        assert!(cancel.is_set());
        assert!(!queue.cancel(&ObjectKey::new("none")).await);

        let waiter = queue.clone();
        let handle = spawn_task(async move { waiter.next().await });
        sleep(Duration::from_millis(5)).await;

        queue.shutdown().await;
        assert!(handle.await.is_none());
        queue.add(ObjectKey::new("b")).await;
        assert!(queue.is_empty().await);
    }

    #[fluvio_future::test]
    async fn test_queue_rate_limited() {
        let queue = WorkQueue::shared("Test", config());
        let key = ObjectKey::new("a");

        let first = queue.add_rate_limited(key.clone()).await;
        let second = queue.add_rate_limited(key.clone()).await;
        assert!(second >= first);
        assert!(second <= Duration::from_millis(40));
        assert!(queue.has_failures(&key).await);
        assert!(queue.is_retrying(&key).await);

        queue.forget(&key).await;
        assert!(!queue.has_failures(&key).await);

        // delayed add eventually lands
        sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.len().await, 1);
        assert!(!queue.is_retrying(&key).await);
    }

    #[fluvio_future::test]
    async fn test_queue_single_retry_per_key() {
        let queue = WorkQueue::shared("Test", config());
        let key = ObjectKey::new("a");

        for _ in 0..20 {
            queue.add_rate_limited(key.clone()).await;
        }
        assert_eq!(queue.state.lock().await.retrying.len(), 1);

        sleep(Duration::from_millis(100)).await;
        let (retried, _) = queue.next().await.expect("key");
        assert_eq!(retried, key);
        queue.done(&retried).await;
        // only one delayed add was scheduled
        sleep(Duration::from_millis(50)).await;
        assert!(queue.is_empty().await);
    }
}
