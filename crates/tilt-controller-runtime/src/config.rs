use std::fs::read_to_string;
use std::io::Error as IoError;
use std::path::Path;
use std::time::Duration;

use adaptive_backoff::prelude::{BackoffBuilder, ExponentialBackoff, ExponentialBackoffBuilder};
use derive_builder::Builder;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::debug;

use tilt_types::defaults::{
    BIND_TIMEOUT, MAX_CONCURRENT_RECONCILES, RECONCILE_BACKOFF_FACTOR, RECONCILE_BACKOFF_MAX,
    RECONCILE_BACKOFF_MIN, SHUTDOWN_GRACE_PERIOD,
};

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("IoError: {0}")]
    Io(IoError),
    #[error("TomlError: {0}")]
    Toml(toml::de::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backoff_min {min:?} is larger than backoff_max {max:?}")]
    BackoffRange { min: Duration, max: Duration },
    #[error("backoff_factor must be at least 1, got {0}")]
    BackoffFactor(f64),
    #[error("unable to build backoff: {0:#}")]
    Backoff(anyhow::Error),
}

/// Controller manager settings.
/// Create this struct with [`ManagerConfigBuilder`] or load it from toml.
///
/// ```toml
/// bind_timeout = "30s"
/// shutdown_grace_period = "10s"
/// max_concurrent_reconciles = 4
/// controllers = ["UIButton"]
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
#[serde(default)]
pub struct ManagerConfig {
    /// how long deferred client calls wait for the real client
    #[builder(default = "BIND_TIMEOUT")]
    #[serde(with = "humantime_serde")]
    pub bind_timeout: Duration,
    /// time given to in-flight reconciles on stop
    #[builder(default = "SHUTDOWN_GRACE_PERIOD")]
    #[serde(with = "humantime_serde")]
    pub shutdown_grace_period: Duration,
    /// workers per kind
    #[builder(default = "MAX_CONCURRENT_RECONCILES")]
    pub max_concurrent_reconciles: usize,
    #[builder(default = "RECONCILE_BACKOFF_MIN")]
    #[serde(with = "humantime_serde")]
    pub backoff_min: Duration,
    #[builder(default = "RECONCILE_BACKOFF_MAX")]
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
    #[builder(default = "RECONCILE_BACKOFF_FACTOR")]
    pub backoff_factor: f64,
    /// kinds allowed to start, empty starts every registered kind
    #[builder(default, setter(into))]
    pub controllers: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            bind_timeout: BIND_TIMEOUT,
            shutdown_grace_period: SHUTDOWN_GRACE_PERIOD,
            max_concurrent_reconciles: MAX_CONCURRENT_RECONCILES,
            backoff_min: RECONCILE_BACKOFF_MIN,
            backoff_max: RECONCILE_BACKOFF_MAX,
            backoff_factor: RECONCILE_BACKOFF_FACTOR,
            controllers: vec![],
        }
    }
}

impl ManagerConfig {
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::default()
    }

    pub fn load_from<T: AsRef<Path>>(path: T) -> Result<Self, LoadConfigError> {
        let path_ref = path.as_ref();
        debug!(?path_ref, "loading from");

        let file_str = read_to_string(path_ref).map_err(LoadConfigError::Io)?;
        Self::load_str(&file_str)
    }

    pub fn load_str(config: &str) -> Result<Self, LoadConfigError> {
        let config = toml::from_str(config).map_err(LoadConfigError::Toml)?;
        Ok(config)
    }

    /// check if controller for kind is allowed to start
    pub fn is_enabled(&self, kind: &str) -> bool {
        self.controllers.is_empty()
            || self
                .controllers
                .iter()
                .any(|name| name.eq_ignore_ascii_case(kind))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_min > self.backoff_max {
            return Err(ConfigError::BackoffRange {
                min: self.backoff_min,
                max: self.backoff_max,
            });
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        Ok(())
    }

    /// fresh backoff for retrying one failing object
    pub fn create_backoff(&self) -> Result<ExponentialBackoff, ConfigError> {
        self.validate()?;
        ExponentialBackoffBuilder::default()
            .factor(self.backoff_factor)
            .min(self.backoff_min)
            .max(self.backoff_max)
            .build()
            .map_err(ConfigError::Backoff)
    }
}

#[cfg(test)]
mod test {

    use std::time::Duration;

    use super::{ConfigError, LoadConfigError, ManagerConfig};

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::builder().build().expect("build");
        assert_eq!(config, ManagerConfig::default());
        assert_eq!(config.bind_timeout, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_reconciles, 4);
        assert!(config.is_enabled("UIButton"));
        assert!(config.create_backoff().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ManagerConfig::builder()
            .bind_timeout(Duration::from_millis(50))
            .controllers(vec!["uibutton".to_owned()])
            .build()
            .expect("build");
        assert_eq!(config.bind_timeout, Duration::from_millis(50));
        assert_eq!(config.shutdown_grace_period, Duration::from_secs(10));
        assert!(config.is_enabled("UIButton"));
        assert!(!config.is_enabled("Cmd"));
    }

    #[test]
    fn test_load_toml() {
        let config = ManagerConfig::load_str(
            r#"
            bind_timeout = "2s"
            shutdown_grace_period = "500ms"
            backoff_max = "1m"
            controllers = ["UIButton"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.bind_timeout, Duration::from_secs(2));
        assert_eq!(config.shutdown_grace_period, Duration::from_millis(500));
        assert_eq!(config.backoff_max, Duration::from_secs(60));
        // unset fields keep defaults
        assert_eq!(config.max_concurrent_reconciles, 4);
        assert_eq!(config.controllers, vec!["UIButton".to_owned()]);

        assert!(matches!(
            ManagerConfig::load_str("bind_timeout = 3"),
            Err(LoadConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_backoff() {
        let config = ManagerConfig::builder()
            .backoff_min(Duration::from_secs(2))
            .backoff_max(Duration::from_secs(1))
            .build()
            .expect("build");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BackoffRange { .. })
        ));
        assert!(config.create_backoff().is_err());

        let config = ManagerConfig::builder()
            .backoff_factor(0.5)
            .build()
            .expect("build");
        let err = config.validate().expect_err("factor");
        assert!(matches!(err, ConfigError::BackoffFactor(_)));
        assert_eq!(err.to_string(), "backoff_factor must be at least 1, got 0.5");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ManagerConfig::load_from("/nonexistent/tilt/manager.toml"),
            Err(LoadConfigError::Io(_))
        ));
    }
}
