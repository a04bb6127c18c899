use std::time::Duration;

use tilt_stream_model::store::StoreError;
use tilt_types::KindLabel;

use crate::config::ConfigError;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("client was not bound within {0:?}")]
    BindTimeout(Duration),
    #[error("client is already bound")]
    AlreadyBound,
    #[error("deferred client dropped before bind")]
    Unbound,
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}

/// outcome of failed reconcile, never surfaced to the writer of the spec
#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("{0:#}")]
    Failed(anyhow::Error),
    #[error("reconcile panicked: {0}")]
    Panicked(String),
    #[error("reconcile cancelled")]
    Cancelled,
}

#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    #[error("controller manager already started")]
    AlreadyStarted,
    #[error("controller for {0} is already registered")]
    DuplicateKind(KindLabel),
    #[error("invalid manager config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("controllers did not stop within grace period: {kinds:?}")]
    GracePeriodExceeded { kinds: Vec<KindLabel> },
    #[error("{kind} controller failed to start: {source}")]
    Fatal {
        kind: KindLabel,
        source: ClientError,
    },
}
