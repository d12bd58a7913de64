//! Model Run - one execution of the ALS training job

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Status of a run.
///
/// ```text
/// queued ──> running ──> success
///                   └──> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is created but no worker has picked it up.
    Queued,
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Success,
    /// Run failed with an error.
    Failed,
}

impl RunStatus {
    /// All statuses.
    pub const ALL: [Self; 4] = [Self::Queued, Self::Running, Self::Success, Self::Failed];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Queued or running.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Success or failed. No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Running, Self::Success | Self::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                Error::validation(
                    "Invalid status value. Must be one of: success, failed, running, queued",
                )
            })
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Started from the dashboard.
    Manual,
    /// Started by the external scheduler.
    Scheduled,
}

impl TriggerSource {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            _ => Err(Error::validation(
                "Invalid triggered_by value. Must be one of: manual, scheduled",
            )),
        }
    }
}

/// Queue priority requested with a trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Ahead of normal work.
    High,
    /// Default.
    #[default]
    Normal,
    /// Behind normal work.
    Low,
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(Error::validation(
                "Invalid priority value. Must be one of: high, normal, low",
            )),
        }
    }
}

/// ALS hyper-parameters a run is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HyperParameters {
    /// Number of latent factors
    pub rank: u32,
    /// Regularization parameter
    pub reg_param: f64,
    /// Confidence amplification factor
    pub alpha: f64,
    /// Maximum number of iterations
    pub max_iter: u32,
}

impl Default for HyperParameters {
    fn default() -> Self {
        Self {
            rank: 10,
            reg_param: 0.01,
            alpha: 1.0,
            max_iter: 10,
        }
    }
}

impl HyperParameters {
    /// Check ranges: `rank >= 1`, `maxIter >= 1`, finite non-negative
    /// `regParam` and `alpha`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_rank(Some(self.rank))?;
        validate_max_iter(Some(self.max_iter))?;
        validate_non_negative("regParam", Some(self.reg_param))?;
        validate_non_negative("alpha", Some(self.alpha))
    }

    /// Command-line arguments understood by the training script.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--rank".into(),
            self.rank.to_string(),
            "--regParam".into(),
            self.reg_param.to_string(),
            "--alpha".into(),
            self.alpha.to_string(),
            "--maxIter".into(),
            self.max_iter.to_string(),
        ]
    }
}

impl fmt::Display for HyperParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rank={}, regParam={}, alpha={}, maxIter={}",
            self.rank, self.reg_param, self.alpha, self.max_iter
        )
    }
}

pub(crate) fn validate_rank(rank: Option<u32>) -> Result<()> {
    match rank {
        Some(0) => Err(Error::validation("rank must be at least 1")),
        _ => Ok(()),
    }
}

pub(crate) fn validate_max_iter(max_iter: Option<u32>) -> Result<()> {
    match max_iter {
        Some(0) => Err(Error::validation("maxIter must be at least 1")),
        _ => Ok(()),
    }
}

pub(crate) fn validate_non_negative(field: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(Error::validation(format!(
            "{field} must be a finite, non-negative number"
        ))),
        _ => Ok(()),
    }
}

/// Human-readable span between two instants: `"1d 2h 5m"`, zero parts
/// omitted, `"0m"` for anything under a minute.
///
/// ```rust
/// use als_ops::registry::format_duration;
/// use chrono::{Duration, Utc};
///
/// let start = Utc::now();
/// assert_eq!(format_duration(start, start + Duration::seconds(59)), "0m");
/// assert_eq!(format_duration(start, start + Duration::minutes(125)), "2h 5m");
/// ```
#[must_use]
pub fn format_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let total_seconds = (end - start).num_seconds().max(0);

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m")]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if parts.is_empty() {
        "0m".to_string()
    } else {
        parts.join(" ")
    }
}

/// Model Run represents a single execution of the training job.
///
/// `end_time` and `duration` are written exactly once, by the terminal
/// transition, so `duration.is_none() == end_time.is_none()` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRun {
    id: String,
    run_id: String,
    status: RunStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    duration: Option<String>,
    triggered_by: TriggerSource,
    hyper_parameters: Option<HyperParameters>,
    logs: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ModelRun {
    /// Create a new run record in Queued status.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique human-readable identifier
    /// * `triggered_by` - What started the run
    /// * `hyper_parameters` - Parameters the job will be trained with
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        triggered_by: TriggerSource,
        hyper_parameters: HyperParameters,
    ) -> Self {
        Self::builder(run_id, triggered_by)
            .hyper_parameters(hyper_parameters)
            .build()
    }

    /// Create a builder for constructing a run record with optional fields.
    #[must_use]
    pub fn builder(run_id: impl Into<String>, triggered_by: TriggerSource) -> ModelRunBuilder {
        ModelRunBuilder::new(run_id, triggered_by)
    }

    /// Get the internal ID (UUID).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the human-readable run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the trigger time.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Get the human-readable duration, if the run has completed.
    #[must_use]
    pub fn duration(&self) -> Option<&str> {
        self.duration.as_deref()
    }

    /// Get what started the run.
    #[must_use]
    pub const fn triggered_by(&self) -> TriggerSource {
        self.triggered_by
    }

    /// Get the hyper-parameters, if recorded.
    #[must_use]
    pub const fn hyper_parameters(&self) -> Option<&HyperParameters> {
        self.hyper_parameters.as_ref()
    }

    /// Get the accumulated logs, if any were written.
    #[must_use]
    pub fn logs(&self) -> Option<&str> {
        self.logs.as_deref()
    }

    /// Size of the logs in UTF-8 bytes.
    #[must_use]
    pub fn log_size(&self) -> usize {
        self.logs.as_ref().map_or(0, String::len)
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

    /// Wall-clock minutes between start and end, for completed runs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_minutes(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 60_000.0)
    }

    /// Whether `key` names this run, by internal ID or run ID.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.id == key || self.run_id == key
    }

    /// Move from Queued to Running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the run is queued.
    pub fn start(&mut self) -> Result<()> {
        self.start_at(Utc::now())
    }

    /// [`start`](Self::start) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the run is queued.
    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(RunStatus::Running)?;
        self.updated_at = now;
        Ok(())
    }

    /// Complete the run with a terminal status.
    ///
    /// Sets `end_time` to now and derives `duration` from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the run is running and
    /// `status` is Success or Failed.
    pub fn complete(&mut self, status: RunStatus) -> Result<()> {
        self.complete_at(status, Utc::now())
    }

    /// [`complete`](Self::complete) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the run is running and
    /// `status` is Success or Failed.
    pub fn complete_at(&mut self, status: RunStatus, now: DateTime<Utc>) -> Result<()> {
        self.transition(status)?;
        self.end_time = Some(now);
        self.duration = Some(format_duration(self.start_time, now));
        self.updated_at = now;
        Ok(())
    }

    /// Append text to the logs.
    pub fn append_logs(&mut self, text: &str) {
        self.logs.get_or_insert_with(String::new).push_str(text);
        self.updated_at = Utc::now();
    }

    fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                run_id: self.run_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Builder for `ModelRun`.
#[derive(Debug)]
pub struct ModelRunBuilder {
    id: String,
    run_id: String,
    triggered_by: TriggerSource,
    start_time: DateTime<Utc>,
    hyper_parameters: Option<HyperParameters>,
}

impl ModelRunBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(run_id: impl Into<String>, triggered_by: TriggerSource) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            triggered_by,
            start_time: Utc::now(),
            hyper_parameters: None,
        }
    }

    /// Set the hyper-parameters.
    #[must_use]
    pub const fn hyper_parameters(mut self, hyper_parameters: HyperParameters) -> Self {
        self.hyper_parameters = Some(hyper_parameters);
        self
    }

    /// Set a custom trigger time (useful for deserialization/testing).
    #[must_use]
    pub const fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Build the `ModelRun` in Queued status.
    #[must_use]
    pub fn build(self) -> ModelRun {
        ModelRun {
            id: self.id,
            run_id: self.run_id,
            status: RunStatus::Queued,
            start_time: self.start_time,
            end_time: None,
            duration: None,
            triggered_by: self.triggered_by,
            hyper_parameters: self.hyper_parameters,
            logs: None,
            created_at: self.start_time,
            updated_at: self.start_time,
        }
    }
}
