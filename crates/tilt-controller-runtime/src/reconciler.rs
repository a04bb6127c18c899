use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tilt_stream_model::core::{ObjectKey, Spec};
use tilt_stream_model::store::WatchFilter;
use tilt_types::event::StickyEvent;

use crate::queue::WorkQueue;

/// Drives objects of one kind toward their spec.
///
/// `reconcile` is called with the identity only; implementations read the current
/// object through their client. It may run many times for the same state and must
/// produce the same status without repeating side effects.
/// Returning an error is not fatal: the key is retried with backoff and the error
/// is recorded in the object status when the kind has room for it.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Spec: Spec;

    async fn reconcile(
        &self,
        key: &ObjectKey,
        ctx: &ReconcileContext,
    ) -> anyhow::Result<ReconcileResult>;

    /// changes that wake this reconciler, status writes are excluded by default
    fn watch_filter(&self) -> WatchFilter {
        WatchFilter::Spec
    }

    /// called once before the first reconcile with a handle for external signals
    fn setup(&self, _trigger: Trigger) {}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileResult {
    /// retry with backoff
    pub requeue: bool,
    /// retry after fixed delay, takes precedence over `requeue`
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: Some(delay),
        }
    }
}

/// per invocation context
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    cancel: Arc<StickyEvent>,
}

impl ReconcileContext {
    pub fn new(cancel: Arc<StickyEvent>) -> Self {
        Self { cancel }
    }

    /// object was deleted or manager is stopping
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_set()
    }

    /// resolves once cancelled
    pub async fn cancelled(&self) {
        self.cancel.listen().await
    }
}

/// enqueue objects of a kind from outside its watch
#[derive(Clone)]
pub struct Trigger {
    queue: Arc<WorkQueue>,
}

impl Trigger {
    pub(crate) fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }

    pub async fn enqueue(&self, key: ObjectKey) {
        self.queue.add(key).await
    }

    pub fn enqueue_after(&self, key: ObjectKey, delay: Duration) {
        self.queue.add_after(key, delay)
    }
}

#[cfg(test)]
mod test {

    use std::time::Duration;

    use tilt_stream_model::core::ObjectKey;
    use tilt_types::event::StickyEvent;

    use crate::config::ManagerConfig;
    use crate::queue::WorkQueue;

    use super::{ReconcileContext, ReconcileResult, Trigger};

    #[test]
    fn test_results() {
        assert_eq!(ReconcileResult::done(), ReconcileResult::default());
        assert!(ReconcileResult::requeue().requeue);
        assert_eq!(
            ReconcileResult::requeue_after(Duration::from_secs(1)).requeue_after,
            Some(Duration::from_secs(1))
        );
    }

    #[fluvio_future::test]
    async fn test_context_cancel() {
        let cancel = StickyEvent::shared();
        let ctx = ReconcileContext::new(cancel.clone());
        assert!(!ctx.is_cancelled());
        cancel.notify();
        assert!(ctx.is_cancelled());
        ctx.cancelled().await;
    }

    #[fluvio_future::test]
    async fn test_trigger() {
        let queue = WorkQueue::shared("Test", ManagerConfig::default());
        let trigger = Trigger::new(queue.clone());
        trigger.enqueue(ObjectKey::new("a")).await;
        assert_eq!(queue.len().await, 1);
    }
}
