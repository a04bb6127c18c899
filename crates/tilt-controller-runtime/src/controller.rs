//!
//! # Kind controller
//!
//! One dispatch loop per kind: a watch task feeding the work queue and a pool of
//! workers invoking the reconciler. Identities are reconciled one at a time,
//! different identities in parallel.
//!
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_channel::{Receiver, Sender, bounded};
use futures_util::FutureExt;
use tracing::{debug, error, info, instrument, trace, warn};

use fluvio_future::task::spawn;

use tilt_stream_model::core::{ObjectKey, ResourceVersion, Spec, Status};
use tilt_stream_model::store::WatchEventType;
use tilt_types::event::StickyEvent;

use crate::client::Client;
use crate::config::ManagerConfig;
use crate::error::{ManagerError, ReconcileError};
use crate::queue::WorkQueue;
use crate::reconciler::{ReconcileContext, ReconcileResult, Reconciler, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControllerState {
    Stopped = 0,
    Starting = 1,
    Watching = 2,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Starting => write!(f, "Starting"),
            Self::Watching => write!(f, "Watching"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ControllerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> ControllerState {
        match self.0.load(Ordering::SeqCst) {
            1 => ControllerState::Starting,
            2 => ControllerState::Watching,
            _ => ControllerState::Stopped,
        }
    }

    pub(crate) fn set(&self, state: ControllerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// what a started controller leaves to the manager
pub(crate) struct RunningController {
    pub(crate) kind: &'static str,
    pub(crate) state: Arc<StateCell>,
    pub(crate) queue: Arc<WorkQueue>,
    /// closed once every task of the controller has exited
    pub(crate) done: Receiver<()>,
}

pub(crate) struct StartContext<C> {
    pub(crate) client: C,
    pub(crate) config: ManagerConfig,
    pub(crate) shutdown: Arc<StickyEvent>,
    pub(crate) fatal: Sender<ManagerError>,
}

/// type erased (kind, reconciler) pair
pub(crate) trait RegisteredController<C>: Send + Sync {
    fn kind(&self) -> &'static str;

    fn start(&self, ctx: StartContext<C>) -> RunningController;
}

pub(crate) struct Registration<R, C> {
    reconciler: Arc<R>,
    client: PhantomData<fn() -> C>,
}

impl<R, C> Registration<R, C> {
    pub(crate) fn new(reconciler: R) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            client: PhantomData,
        }
    }
}

impl<R, C> RegisteredController<C> for Registration<R, C>
where
    R: Reconciler,
    C: Client + Clone,
{
    fn kind(&self) -> &'static str {
        R::Spec::LABEL
    }

    fn start(&self, ctx: StartContext<C>) -> RunningController {
        KindController::start(self.reconciler.clone(), ctx)
    }
}

struct KindController<R, C> {
    reconciler: Arc<R>,
    client: C,
    queue: Arc<WorkQueue>,
    state: Arc<StateCell>,
    shutdown: Arc<StickyEvent>,
}

impl<R, C> KindController<R, C>
where
    R: Reconciler,
    C: Client + Clone,
{
    fn start(reconciler: Arc<R>, ctx: StartContext<C>) -> RunningController {
        let kind = R::Spec::LABEL;
        let workers = ctx.config.max_concurrent_reconciles.max(1);
        let state = Arc::new(StateCell::new(ControllerState::Starting));
        let queue = WorkQueue::shared(kind, ctx.config);
        let (done_sender, done) = bounded::<()>(1);

        reconciler.setup(Trigger::new(queue.clone()));

        let controller = Arc::new(Self {
            reconciler,
            client: ctx.client,
            queue: queue.clone(),
            state: state.clone(),
            shutdown: ctx.shutdown,
        });

        debug!(kind, workers, "starting controller");
        spawn(controller.clone().watch_loop(ctx.fatal, done_sender.clone()));
        for worker in 0..workers {
            spawn(controller.clone().worker_loop(worker, done_sender.clone()));
        }

        RunningController {
            kind,
            state,
            queue,
            done,
        }
    }

    #[instrument(skip_all, fields(kind = R::Spec::LABEL))]
    async fn watch_loop(self: Arc<Self>, fatal: Sender<ManagerError>, _done: Sender<()>) {
        use tokio::select;

        let filter = self.reconciler.watch_filter();

        // waits for the client to be bound
        let watch = select! {
            watch = self.client.watch::<R::Spec>(filter, None) => watch,
            _ = self.shutdown.listen() => {
                debug!("shutdown before watch established");
                return;
            }
        };

        let mut watcher = match watch {
            Ok(watcher) => watcher,
            Err(err) => {
                error!(%err, "unable to establish watch");
                self.state.set(ControllerState::Stopped);
                self.queue.shutdown().await;
                let _ = fatal.try_send(ManagerError::Fatal {
                    kind: R::Spec::LABEL,
                    source: err,
                });
                return;
            }
        };

        self.state.set(ControllerState::Watching);
        info!(?filter, "watching");

        // spec version last delivered per key
        let mut spec_versions: HashMap<ObjectKey, ResourceVersion> = HashMap::new();

        loop {
            select! {
                event = watcher.next() => {
                    let key = event.key();
                    trace!(%key, event = %event.event_type, version = %event.resource_version, "watch event");
                    if event.event_type == WatchEventType::Deleted {
                        spec_versions.remove(&key);
                        self.queue.cancel(&key).await;
                        self.queue.add(key).await;
                    } else {
                        let spec_version = event.object.meta.spec_version;
                        let status_only =
                            spec_versions.insert(key.clone(), spec_version) == Some(spec_version);
                        // a failing key is only woken early by spec or metadata writes
                        if status_only && self.queue.is_retrying(&key).await {
                            trace!(%key, "status change while backing off");
                        } else {
                            self.queue.add(key).await;
                        }
                    }
                },
                _ = self.shutdown.listen() => {
                    debug!("watch closed");
                    break;
                }
            }
        }
    }

    #[instrument(skip(self, _done), fields(kind = R::Spec::LABEL))]
    async fn worker_loop(self: Arc<Self>, worker: usize, _done: Sender<()>) {
        while let Some((key, cancel)) = self.queue.next().await {
            self.process(&key, cancel).await;
            self.queue.done(&key).await;
        }
        debug!("worker finished");
    }

    async fn process(&self, key: &ObjectKey, cancel: Arc<StickyEvent>) {
        let ctx = ReconcileContext::new(cancel);
        trace!(%key, "reconcile");

        let outcome = AssertUnwindSafe(self.reconciler.reconcile(key, &ctx))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) if ctx.is_cancelled() => {
                debug!(%key, %err, "reconcile cancelled");
                Err(ReconcileError::Cancelled)
            }
            Ok(Err(err)) => Err(ReconcileError::Failed(err)),
            Err(panic) => Err(ReconcileError::Panicked(panic_message(panic))),
        };

        match result {
            Ok(ReconcileResult {
                requeue,
                requeue_after,
            }) => {
                self.queue.forget(key).await;
                self.record_error(key, None).await;
                if let Some(delay) = requeue_after {
                    self.queue.add_after(key.clone(), delay);
                } else if requeue {
                    self.queue.add_rate_limited(key.clone()).await;
                }
            }
            Err(ReconcileError::Cancelled) => {}
            Err(err) => {
                warn!(%key, %err, "reconcile failed");
                // schedule retry before the status write reaches the watch
                self.queue.add_rate_limited(key.clone()).await;
                self.record_error(key, Some(err.to_string())).await;
            }
        }
    }

    /// surface last reconcile error in status, retried once on conflict
    async fn record_error(&self, key: &ObjectKey, error: Option<String>) {
        for attempt in 0..2 {
            let obj = match self.client.get::<R::Spec>(key).await {
                Ok(obj) => obj,
                Err(err) => {
                    if !err.is_not_found() {
                        warn!(%key, %err, "unable to read object for status");
                    }
                    return;
                }
            };

            if obj.status.reconcile_error() == error.as_deref() {
                return;
            }

            let mut status = obj.status.clone();
            status.set_reconcile_error(error.clone());

            match self
                .client
                .update_status::<R::Spec>(key, status, obj.resource_version())
                .await
            {
                Ok(_) => return,
                Err(err) if err.is_conflict() && attempt == 0 => {
                    debug!(%key, "status conflict, retrying");
                }
                Err(err) => {
                    warn!(%key, %err, "unable to record reconcile error");
                    return;
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod test {

    use super::{ControllerState, StateCell, panic_message};

    #[test]
    fn test_state_cell() {
        let cell = StateCell::new(ControllerState::Stopped);
        assert_eq!(cell.get(), ControllerState::Stopped);
        cell.set(ControllerState::Starting);
        assert_eq!(cell.get(), ControllerState::Starting);
        cell.set(ControllerState::Watching);
        assert_eq!(cell.get().to_string(), "Watching");
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(format!("owned {}", 1))), "owned 1");
        assert_eq!(panic_message(Box::new(5u8)), "unknown panic");
    }
}
