//!
//! # Deferred client
//!
//! Client handed to reconcilers before the real client exists.
//! Calls made before bind wait (without polling) and are released in arrival order once
//! the real client is bound. Waiting past the bind deadline fails with `BindTimeout`.
//!
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender, bounded};
use async_lock::Mutex;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use fluvio_future::timer::sleep;

use tilt_stream_model::core::{ObjectKey, ResourceVersion, Spec};
use tilt_stream_model::store::{LabelSelector, MetadataStoreObject, WatchFilter, Watcher};

use crate::client::Client;
use crate::error::ClientError;

pub struct DeferredClient<C> {
    client: OnceCell<Arc<C>>,
    waiters: Mutex<VecDeque<Sender<Arc<C>>>>,
    bind_timeout: Duration,
    deadline: Instant,
}

impl<C> fmt::Debug for DeferredClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredClient")
            .field("bound", &self.client.get().is_some())
            .field("bind_timeout", &self.bind_timeout)
            .finish()
    }
}

impl<C> DeferredClient<C>
where
    C: Client,
{
    /// bind deadline starts now
    pub fn new(bind_timeout: Duration) -> Self {
        Self {
            client: OnceCell::new(),
            waiters: Mutex::new(VecDeque::new()),
            bind_timeout,
            deadline: Instant::now() + bind_timeout,
        }
    }

    pub fn shared(bind_timeout: Duration) -> Arc<Self> {
        Arc::new(Self::new(bind_timeout))
    }

    pub fn is_bound(&self) -> bool {
        self.client.get().is_some()
    }

    /// number of calls waiting for bind
    pub async fn waiting(&self) -> usize {
        self.waiters.lock().await.len()
    }

    /// set the real client and release waiting calls, first come first served.
    /// only the first bind is accepted
    pub async fn bind(&self, client: C) -> Result<(), ClientError> {
        let client = Arc::new(client);
        let mut waiters = self.waiters.lock().await;

        if self.client.set(client.clone()).is_err() {
            warn!("client is already bound");
            return Err(ClientError::AlreadyBound);
        }

        let waiting = waiters.len();
        while let Some(waiter) = waiters.pop_front() {
            // waiter may have given up
            let _ = waiter.try_send(client.clone());
        }
        drop(waiters);

        info!(waiting, "client bound");
        Ok(())
    }

    /// real client, waits for bind until deadline
    pub async fn client(&self) -> Result<Arc<C>, ClientError> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }

        let receiver = {
            let mut waiters = self.waiters.lock().await;
            // bind may have happened while waiting for lock
            if let Some(client) = self.client.get() {
                return Ok(client.clone());
            }
            // drop callers which timed out
            waiters.retain(|waiter| !waiter.is_closed());
            let (sender, receiver): (Sender<Arc<C>>, Receiver<Arc<C>>) = bounded(1);
            waiters.push_back(sender);
            debug!(position = waiters.len(), "waiting for bind");
            receiver
        };

        let remaining = self.deadline.saturating_duration_since(Instant::now());

        use tokio::select;

        select! {
            client = receiver.recv() => client.map_err(|_| ClientError::Unbound),
            _ = sleep(remaining) => {
                warn!(timeout = ?self.bind_timeout, "bind timeout");
                Err(ClientError::BindTimeout(self.bind_timeout))
            }
        }
    }

    /// wait until bound
    pub async fn wait_for_bind(&self) -> Result<(), ClientError> {
        self.client().await.map(|_| ())
    }
}

#[async_trait]
impl<C> Client for DeferredClient<C>
where
    C: Client,
{
    async fn get<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError> {
        self.client().await?.get::<S>(key).await
    }

    async fn list<S: Spec>(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<MetadataStoreObject<S>>, ClientError> {
        self.client().await?.list::<S>(selector).await
    }

    async fn create<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
    ) -> Result<MetadataStoreObject<S>, ClientError> {
        self.client().await?.create(obj).await
    }

    async fn update<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError> {
        self.client().await?.update(obj, expected).await
    }

    async fn update_status<S: Spec>(
        &self,
        key: &ObjectKey,
        status: S::Status,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError> {
        self.client()
            .await?
            .update_status::<S>(key, status, expected)
            .await
    }

    async fn delete<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError> {
        self.client().await?.delete::<S>(key).await
    }

    async fn watch<S: Spec>(
        &self,
        filter: WatchFilter,
        since: Option<ResourceVersion>,
    ) -> Result<Watcher<S>, ClientError> {
        self.client().await?.watch::<S>(filter, since).await
    }
}
