use std::time::Duration;

// Deferred client
pub const BIND_TIMEOUT: Duration = Duration::from_secs(30);

// Controller manager
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);
pub const MAX_CONCURRENT_RECONCILES: usize = 4;

// per item retry after reconcile failure
pub const RECONCILE_BACKOFF_MIN: Duration = Duration::from_millis(5);
pub const RECONCILE_BACKOFF_MAX: Duration = Duration::from_secs(1000);
pub const RECONCILE_BACKOFF_FACTOR: f64 = 2.0;

/// number of deleted objects kept for watchers before history is fenced
pub const DELETED_HISTORY_LIMIT: usize = 1024;

pub const API_GROUP: &str = "tilt.dev";
pub const API_VERSION: &str = "v1alpha1";
