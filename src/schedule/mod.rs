//! Training schedule
//!
//! A single schedule row drives periodic retraining. It holds a five-field
//! cron expression, a pause flag, and optional hyper-parameters that scheduled
//! runs inherit.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use als_ops::schedule::{ScheduleController, ScheduleUpdate};
//! use als_ops::store::MemoryStore;
//!
//! # async fn example() -> als_ops::Result<()> {
//! let controller = ScheduleController::new(Arc::new(MemoryStore::default()));
//!
//! let update = ScheduleUpdate {
//!     cron_expression: Some("0 */6 * * *".into()),
//!     rank: Some(20),
//!     ..ScheduleUpdate::default()
//! };
//! let schedule = controller.update(update).await?;
//! assert_eq!(schedule.description(), "Every 6 hours");
//!
//! controller.pause().await?;
//! assert!(controller.get().await?.is_paused());
//! # Ok(())
//! # }
//! ```

mod cron;

pub use cron::CronExpression;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::registry::{validate_max_iter, validate_non_negative, validate_rank, HyperParameters};
use crate::store::TrainingStore;
use crate::Result;

/// Cron expression the schedule starts with when nothing is configured.
pub const DEFAULT_CRON_EXPRESSION: &str = "0 0 * * *";

/// The singleton training schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSchedule {
    cron_expression: String,
    is_paused: bool,
    rank: Option<u32>,
    #[serde(rename = "regParam")]
    reg_param: Option<f64>,
    alpha: Option<f64>,
    #[serde(rename = "maxIter")]
    max_iter: Option<u32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for TrainingSchedule {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            cron_expression: DEFAULT_CRON_EXPRESSION.to_string(),
            is_paused: false,
            rank: None,
            reg_param: None,
            alpha: None,
            max_iter: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TrainingSchedule {
    /// Create a schedule with the given expression.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if the expression is not a valid
    /// five-field cron string.
    pub fn new(cron_expression: &str, is_paused: bool) -> Result<Self> {
        let cron = CronExpression::parse(cron_expression)?;
        Ok(Self {
            cron_expression: cron.as_str().to_string(),
            is_paused,
            ..Self::default()
        })
    }

    /// Get the cron expression.
    #[must_use]
    pub fn cron_expression(&self) -> &str {
        &self.cron_expression
    }

    /// Whether scheduled training is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// Get the rank scheduled runs train with.
    #[must_use]
    pub const fn rank(&self) -> Option<u32> {
        self.rank
    }

    /// Get the regularization parameter scheduled runs train with.
    #[must_use]
    pub const fn reg_param(&self) -> Option<f64> {
        self.reg_param
    }

    /// Get the alpha scheduled runs train with.
    #[must_use]
    pub const fn alpha(&self) -> Option<f64> {
        self.alpha
    }

    /// Get the iteration cap scheduled runs train with.
    #[must_use]
    pub const fn max_iter(&self) -> Option<u32> {
        self.max_iter
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the last-modified timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Fill the schedule's hyper-parameters into `defaults`.
    #[must_use]
    pub fn hyper_parameters_over(&self, defaults: HyperParameters) -> HyperParameters {
        HyperParameters {
            rank: self.rank.unwrap_or(defaults.rank),
            reg_param: self.reg_param.unwrap_or(defaults.reg_param),
            alpha: self.alpha.unwrap_or(defaults.alpha),
            max_iter: self.max_iter.unwrap_or(defaults.max_iter),
        }
    }

    /// Human-readable description of the cron expression.
    #[must_use]
    pub fn description(&self) -> String {
        CronExpression::parse(&self.cron_expression)
            .map_or_else(|_| format!("Cron: {}", self.cron_expression), |c| c.describe())
    }

    /// Next fire time after `after`, or `None` when paused.
    #[must_use]
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_paused {
            return None;
        }
        CronExpression::parse(&self.cron_expression)
            .ok()?
            .next_after(after)
    }

    /// Validate `update` in full, then merge it.
    ///
    /// Nothing is written unless every field is valid.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for a bad cron expression or an
    /// out-of-range hyper-parameter.
    pub fn apply(&mut self, update: &ScheduleUpdate, now: DateTime<Utc>) -> Result<()> {
        let cron = update
            .cron_expression
            .as_deref()
            .filter(|cron| !cron.trim().is_empty())
            .map(CronExpression::parse)
            .transpose()?;
        validate_rank(update.rank)?;
        validate_max_iter(update.max_iter)?;
        validate_non_negative("regParam", update.reg_param)?;
        validate_non_negative("alpha", update.alpha)?;

        if let Some(cron) = cron {
            self.cron_expression = cron.as_str().to_string();
        }
        if let Some(paused) = update.is_paused {
            self.is_paused = paused;
        }
        if update.rank.is_some() {
            self.rank = update.rank;
        }
        if update.reg_param.is_some() {
            self.reg_param = update.reg_param;
        }
        if update.alpha.is_some() {
            self.alpha = update.alpha;
        }
        if update.max_iter.is_some() {
            self.max_iter = update.max_iter;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Set the pause flag. Returns whether anything changed.
    pub fn set_paused(&mut self, paused: bool, now: DateTime<Utc>) -> bool {
        if self.is_paused == paused {
            return false;
        }
        self.is_paused = paused;
        self.updated_at = now;
        true
    }
}

/// Partial schedule update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    /// New five-field cron expression. Blank counts as absent.
    #[serde(default)]
    pub cron_expression: Option<String>,
    /// New pause flag
    #[serde(default)]
    pub is_paused: Option<bool>,
    /// Rank for scheduled runs
    #[serde(default)]
    pub rank: Option<u32>,
    /// Regularization for scheduled runs
    #[serde(default, rename = "regParam")]
    pub reg_param: Option<f64>,
    /// Alpha for scheduled runs
    #[serde(default)]
    pub alpha: Option<f64>,
    /// Iteration cap for scheduled runs
    #[serde(default, rename = "maxIter")]
    pub max_iter: Option<u32>,
}

/// Schedule as returned to clients, with derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleView {
    /// The stored schedule
    #[serde(flatten)]
    pub schedule: TrainingSchedule,
    /// Human-readable cron description
    pub description: String,
    /// Next fire time, absent when paused
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduleView {
    /// Derive the view at `now`.
    #[must_use]
    pub fn at(schedule: TrainingSchedule, now: DateTime<Utc>) -> Self {
        Self {
            description: schedule.description(),
            next_run: schedule.next_run(now),
            schedule,
        }
    }
}

/// Reads and mutates the singleton schedule through a [`TrainingStore`].
#[derive(Debug)]
pub struct ScheduleController<S> {
    store: Arc<S>,
}

impl<S> Clone for ScheduleController<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TrainingStore> ScheduleController<S> {
    /// Create a controller over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Current schedule.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn get(&self) -> Result<TrainingSchedule> {
        self.store.schedule().await
    }

    /// Apply a partial update, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] and leaves the schedule unchanged
    /// if any field is invalid.
    pub async fn update(&self, update: ScheduleUpdate) -> Result<TrainingSchedule> {
        let schedule = self
            .store
            .modify_schedule(|schedule| schedule.apply(&update, Utc::now()))
            .await?;
        info!(
            cron = schedule.cron_expression(),
            paused = schedule.is_paused(),
            "Training schedule updated"
        );
        Ok(schedule)
    }

    /// Pause scheduled training. Pausing a paused schedule is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn pause(&self) -> Result<TrainingSchedule> {
        self.set_paused(true).await
    }

    /// Resume scheduled training. Resuming a running schedule is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn resume(&self) -> Result<TrainingSchedule> {
        self.set_paused(false).await
    }

    async fn set_paused(&self, paused: bool) -> Result<TrainingSchedule> {
        let mut changed = false;
        let schedule = self
            .store
            .modify_schedule(|schedule| {
                changed = schedule.set_paused(paused, Utc::now());
                Ok(())
            })
            .await?;
        if changed {
            info!(paused, "Training schedule pause flag changed");
        }
        Ok(schedule)
    }
}
