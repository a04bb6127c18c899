//!
//! # Controller manager
//!
//! Owns one controller per registered kind and their lifecycle.
//! A failing or hung controller never blocks the others. `stop` returns
//! within the configured grace period even if a reconcile never finishes.
//!
use std::sync::Arc;
use std::time::Instant;

use async_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, instrument, warn};

use fluvio_future::timer::sleep;

use tilt_types::KindLabel;
use tilt_types::event::StickyEvent;

use crate::client::Client;
use crate::config::ManagerConfig;
use crate::controller::{
    ControllerState, RegisteredController, Registration, RunningController, StartContext,
};
use crate::error::ManagerError;
use crate::reconciler::Reconciler;

pub struct ControllerManager<C> {
    client: C,
    config: ManagerConfig,
    registrations: Vec<Box<dyn RegisteredController<C>>>,
    running: Vec<RunningController>,
    shutdown: Arc<StickyEvent>,
    fatal_sender: Sender<ManagerError>,
    fatal_receiver: Receiver<ManagerError>,
    started: bool,
}

impl<C> ControllerManager<C>
where
    C: Client + Clone,
{
    pub fn new(client: C, config: ManagerConfig) -> Self {
        let (fatal_sender, fatal_receiver) = unbounded();
        Self {
            client,
            config,
            registrations: vec![],
            running: vec![],
            shutdown: StickyEvent::shared(),
            fatal_sender,
            fatal_receiver,
            started: false,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// signal set once stop begins
    pub fn shutdown_signal(&self) -> Arc<StickyEvent> {
        self.shutdown.clone()
    }

    /// register reconciler for its kind, at most one per kind
    pub fn register<R>(&mut self, reconciler: R) -> Result<(), ManagerError>
    where
        R: Reconciler,
    {
        let registration = Registration::<R, C>::new(reconciler);
        let kind = registration.kind();
        if self.started {
            return Err(ManagerError::AlreadyStarted);
        }
        if self.registrations.iter().any(|r| r.kind() == kind) {
            return Err(ManagerError::DuplicateKind(kind));
        }
        debug!(kind, "registered reconciler");
        self.registrations.push(Box::new(registration));
        Ok(())
    }

    /// registered kinds in registration order
    pub fn kinds(&self) -> Vec<KindLabel> {
        self.registrations.iter().map(|r| r.kind()).collect()
    }

    /// None if kind is not registered
    pub fn state(&self, kind: &str) -> Option<ControllerState> {
        if let Some(running) = self.running.iter().find(|r| r.kind == kind) {
            return Some(running.state.get());
        }
        self.registrations
            .iter()
            .any(|r| r.kind() == kind)
            .then_some(ControllerState::Stopped)
    }

    /// start controllers of every enabled kind.
    /// controllers wait for the client to be bound before watching
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), ManagerError> {
        if self.started {
            return Err(ManagerError::AlreadyStarted);
        }
        self.config.create_backoff()?;
        self.started = true;

        for registration in &self.registrations {
            let kind = registration.kind();
            if !self.config.is_enabled(kind) {
                info!(kind, "controller disabled");
                continue;
            }
            let running = registration.start(StartContext {
                client: self.client.clone(),
                config: self.config.clone(),
                shutdown: self.shutdown.clone(),
                fatal: self.fatal_sender.clone(),
            });
            self.running.push(running);
        }

        info!(controllers = self.running.len(), "controller manager started");
        Ok(())
    }

    /// wait until a controller fails fatally or stop is requested
    pub async fn wait(&self) -> Result<(), ManagerError> {
        use tokio::select;

        select! {
            fatal = self.fatal_receiver.recv() => match fatal {
                Ok(err) => Err(err),
                Err(_) => Ok(()),
            },
            _ = self.shutdown.listen() => Ok(()),
        }
    }

    /// stop every controller. in-flight reconciles are cancelled and given the grace
    /// period to finish, controllers still running after that are abandoned
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), ManagerError> {
        use tokio::select;

        if !self.shutdown.notify() {
            debug!("already stopped");
            return Ok(());
        }

        let grace = self.config.shutdown_grace_period;
        let deadline = Instant::now() + grace;
        info!(?grace, "stopping controllers");

        for running in &self.running {
            running.queue.shutdown().await;
        }

        let mut abandoned = vec![];
        for running in &self.running {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let finished = select! {
                // closed when the last task drops its sender
                _ = running.done.recv() => true,
                _ = sleep(remaining) => running.done.is_closed(),
            };
            running.state.set(ControllerState::Stopped);
            if finished {
                debug!(kind = running.kind, "controller stopped");
            } else {
                warn!(kind = running.kind, "controller did not stop within grace period");
                abandoned.push(running.kind);
            }
        }

        if abandoned.is_empty() {
            info!("controller manager stopped");
            Ok(())
        } else {
            Err(ManagerError::GracePeriodExceeded { kinds: abandoned })
        }
    }
}
