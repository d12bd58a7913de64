//! Service configuration
//!
//! Layered with `figment`, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. TOML file passed with `--config`
//! 3. Environment variables prefixed `ALS_OPS_`, `__` separating sections
//!    (`ALS_OPS_SERVER__PORT=9000`, `ALS_OPS_TRAINING__ALLOW_CONCURRENT_RUNS=true`)
//!
//! ```toml
//! [server]
//! port = 8000
//!
//! [training]
//! command = ["python", "train_model.py"]
//! artifact_dir = "models"
//!
//! [training.defaults]
//! rank = 10
//! regParam = 0.01
//! alpha = 1.0
//! maxIter = 10
//!
//! [schedule]
//! cron_expression = "0 0 * * *"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::registry::HyperParameters;
use crate::schedule::{TrainingSchedule, DEFAULT_CRON_EXPRESSION};
use crate::{Error, Result};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "ALS_OPS_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// Training runs and the worker
    pub training: TrainingConfig,
    /// Seed for the schedule row
    pub schedule: ScheduleConfig,
    /// Run list paging
    pub pagination: PaginationConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// `Access-Control-Max-Age` for preflight responses
    pub cors_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_max_age_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Training settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Program and fixed arguments of the training job. Without it, runs stay
    /// queued for an external worker.
    pub command: Option<Vec<String>>,
    /// Directory the command runs in
    pub working_dir: Option<PathBuf>,
    /// Prefix of registered artifact paths
    pub artifact_dir: String,
    /// Allow triggering while another run is queued or running
    pub allow_concurrent_runs: bool,
    /// Kill the training command after this many seconds
    pub timeout_secs: u64,
    /// Hyper-parameters used when neither request nor schedule sets one
    pub defaults: HyperParameters,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            command: None,
            working_dir: None,
            artifact_dir: "models".into(),
            allow_concurrent_runs: false,
            timeout_secs: 3600,
            defaults: HyperParameters::default(),
        }
    }
}

impl TrainingConfig {
    /// Command timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Initial schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Five-field cron expression
    pub cron_expression: String,
    /// Start paused
    pub is_paused: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron_expression: DEFAULT_CRON_EXPRESSION.into(),
            is_paused: false,
        }
    }
}

/// Run list paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size when the request has none
    pub default_limit: u32,
    /// Largest page size accepted
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 100,
        }
    }
}

impl Config {
    /// Load defaults, then `path` if given, then the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing or malformed, a value
    /// has the wrong type, or [`validate`](Self::validate) fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Extract and validate from an assembled figment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on extraction or validation failure.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        self.seed_schedule()?;
        self.training
            .defaults
            .validate()
            .map_err(|e| Error::Config(format!("training.defaults: {e}")))?;
        if let Some(command) = &self.training.command {
            if command.is_empty() {
                return Err(Error::Config("training.command must not be empty".into()));
            }
        }
        if self.training.timeout_secs == 0 {
            return Err(Error::Config("training.timeout_secs must be positive".into()));
        }
        let PaginationConfig {
            default_limit,
            max_limit,
        } = self.pagination;
        if max_limit == 0 || default_limit == 0 || default_limit > max_limit {
            return Err(Error::Config(format!(
                "pagination limits must satisfy 1 <= default_limit ({default_limit}) <= max_limit ({max_limit})"
            )));
        }
        Ok(())
    }

    /// Schedule row the store starts with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid cron expression.
    pub fn seed_schedule(&self) -> Result<TrainingSchedule> {
        TrainingSchedule::new(&self.schedule.cron_expression, self.schedule.is_paused)
            .map_err(|e| Error::Config(format!("schedule.cron_expression: {e}")))
    }
}
