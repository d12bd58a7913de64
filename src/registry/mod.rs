//! Model run registry
//!
//! Tracks every execution of the training job from trigger to completion,
//! plus the model versions successful runs produce.
//!
//! ## Lifecycle
//!
//! ```text
//! trigger() ──> queued ──start()──> running ──complete()──> success
//!                                                      └──> failed
//! ```
//!
//! A successful run registers a [`ModelVersion`] through the
//! [`VersionCatalog`]; at most one version is active at a time.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use als_ops::registry::{RunRegistry, RunStatus, TriggerRequest, TriggerSource};
//! use als_ops::store::MemoryStore;
//!
//! # async fn example() -> als_ops::Result<()> {
//! let registry = RunRegistry::new(Arc::new(MemoryStore::default()));
//!
//! let run = registry.trigger(TriggerRequest::new(TriggerSource::Manual)).await?;
//! assert_eq!(run.status(), RunStatus::Queued);
//!
//! registry.start(run.run_id()).await?;
//! registry.append_logs(run.run_id(), "epoch 1 done\n").await?;
//! let done = registry.complete(run.run_id(), RunStatus::Success).await?;
//! assert!(done.duration().is_some());
//! # Ok(())
//! # }
//! ```

mod catalog;
mod query;
mod run;
mod stats;
mod version;

pub use catalog::{VersionCatalog, VersionMetrics, VersionSummary};
pub use query::{
    paginate, PageRequest, Pagination, RunFilter, RunPage, SortOrder, DEFAULT_PAGE_LIMIT,
    MAX_PAGE_LIMIT,
};
pub use run::{
    format_duration, HyperParameters, ModelRun, ModelRunBuilder, Priority, RunStatus,
    TriggerSource,
};
pub use stats::TrainingStatistics;
pub use version::{version_tag_at, ModelVersion};

pub(crate) use run::{validate_max_iter, validate_non_negative, validate_rank};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::TrainingStore;
use crate::{Error, Result};

/// Attempts at a collision-free run ID before giving up.
const RUN_ID_ATTEMPTS: u32 = 100;

/// Request to queue a new training run.
///
/// Absent hyper-parameters fall back to the schedule's values (scheduled
/// triggers only), then to the registry defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerRequest {
    /// Queue priority
    pub priority: Priority,
    /// What started the run
    pub triggered_by: TriggerSource,
    /// Number of latent factors
    pub rank: Option<u32>,
    /// Regularization parameter
    pub reg_param: Option<f64>,
    /// Confidence amplification factor
    pub alpha: Option<f64>,
    /// Maximum number of iterations
    pub max_iter: Option<u32>,
}

impl TriggerRequest {
    /// Request with normal priority and no explicit hyper-parameters.
    #[must_use]
    pub const fn new(triggered_by: TriggerSource) -> Self {
        Self {
            priority: Priority::Normal,
            triggered_by,
            rank: None,
            reg_param: None,
            alpha: None,
            max_iter: None,
        }
    }
}

/// Accumulated output of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogs {
    /// Human-readable run ID
    pub run_id: String,
    /// Log text, empty when nothing was written yet
    pub logs: String,
    /// Size of `logs` in UTF-8 bytes
    pub log_size: usize,
}

/// Registry of training runs over a [`TrainingStore`].
#[derive(Debug)]
pub struct RunRegistry<S> {
    store: Arc<S>,
    defaults: HyperParameters,
    allow_concurrent_runs: bool,
    default_page_limit: u32,
    max_page_limit: u32,
}

impl<S> Clone for RunRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            defaults: self.defaults,
            allow_concurrent_runs: self.allow_concurrent_runs,
            default_page_limit: self.default_page_limit,
            max_page_limit: self.max_page_limit,
        }
    }
}

impl<S: TrainingStore> RunRegistry<S> {
    /// Create a registry with default hyper-parameters, one active run at a
    /// time, and pages of 50 (at most 100).
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            defaults: HyperParameters::default(),
            allow_concurrent_runs: false,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
        }
    }

    /// Set the hyper-parameters used when neither the request nor the
    /// schedule provides one.
    #[must_use]
    pub const fn with_defaults(mut self, defaults: HyperParameters) -> Self {
        self.defaults = defaults;
        self
    }

    /// Allow triggering while another run is queued or running.
    #[must_use]
    pub const fn with_concurrent_runs(mut self, allow: bool) -> Self {
        self.allow_concurrent_runs = allow;
        self
    }

    /// Set the default and maximum page sizes.
    #[must_use]
    pub const fn with_page_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.default_page_limit = default_limit;
        self.max_page_limit = max_limit;
        self
    }

    /// Hyper-parameters used when nothing else applies.
    #[must_use]
    pub const fn defaults(&self) -> HyperParameters {
        self.defaults
    }

    /// Build a page request, filling in the default limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when `page` is 0 or `limit` is outside
    /// `1..=max_limit`.
    pub fn page_request(&self, page: Option<u32>, limit: Option<u32>) -> Result<PageRequest> {
        PageRequest::new(
            page.unwrap_or(1),
            limit.unwrap_or(self.default_page_limit),
            self.max_page_limit,
        )
    }

    /// One page of runs matching `filter`, ordered by start time.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn list(
        &self,
        filter: RunFilter,
        order: SortOrder,
        request: PageRequest,
    ) -> Result<RunPage> {
        let runs = self.store.list_runs().await?;
        Ok(paginate(runs, filter, order, request))
    }

    /// Run by internal ID or run ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no run matches.
    pub async fn get(&self, key: &str) -> Result<ModelRun> {
        self.store
            .get_run(key)
            .await?
            .ok_or_else(|| Error::run_not_found(key))
    }

    /// Queue a new run.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for out-of-range hyper-parameters
    /// - [`Error::Conflict`] if a run is queued or running and concurrent
    ///   runs are not allowed
    /// - [`Error::Internal`] if no unique run ID could be generated
    pub async fn trigger(&self, request: TriggerRequest) -> Result<ModelRun> {
        let hyper_parameters = self.resolve_hyper_parameters(&request).await?;
        hyper_parameters.validate()?;

        if !self.allow_concurrent_runs {
            let runs = self.store.list_runs().await?;
            if let Some(active) = runs.iter().find(|run| run.status().is_active()) {
                warn!(
                    active_run = active.run_id(),
                    status = %active.status(),
                    "Trigger rejected while another run is active"
                );
                return Err(Error::Conflict(format!(
                    "Training run {} is already {}",
                    active.run_id(),
                    active.status()
                )));
            }
        }

        let now = Utc::now();
        let run_id = self.unique_run_id(request.triggered_by, now).await?;
        let run = ModelRun::builder(run_id, request.triggered_by)
            .hyper_parameters(hyper_parameters)
            .start_time(now)
            .build();
        self.store.insert_run(run.clone()).await?;

        info!(
            run_id = run.run_id(),
            triggered_by = %request.triggered_by,
            priority = ?request.priority,
            %hyper_parameters,
            "Training run queued"
        );
        Ok(run)
    }

    /// Move a queued run to running.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::InvalidTransition`].
    pub async fn start(&self, key: &str) -> Result<ModelRun> {
        let run = self.store.modify_run(key, ModelRun::start).await?;
        info!(run_id = run.run_id(), "Training run started");
        Ok(run)
    }

    /// Complete a running run with `status`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::InvalidTransition`].
    pub async fn complete(&self, key: &str, status: RunStatus) -> Result<ModelRun> {
        let run = self
            .store
            .modify_run(key, |run| run.complete(status))
            .await?;
        match status {
            RunStatus::Success => info!(
                run_id = run.run_id(),
                duration = run.duration().unwrap_or_default(),
                "Training run succeeded"
            ),
            _ => warn!(
                run_id = run.run_id(),
                duration = run.duration().unwrap_or_default(),
                "Training run failed"
            ),
        }
        Ok(run)
    }

    /// Append text to a run's logs.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no run matches.
    pub async fn append_logs(&self, key: &str, text: &str) -> Result<()> {
        self.store
            .modify_run(key, |run| {
                run.append_logs(text);
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Logs of a run.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no run matches.
    pub async fn logs(&self, key: &str) -> Result<RunLogs> {
        let run = self.get(key).await?;
        Ok(RunLogs {
            run_id: run.run_id().to_string(),
            log_size: run.log_size(),
            logs: run.logs().unwrap_or_default().to_string(),
        })
    }

    /// Dashboard statistics over all runs.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn statistics(&self) -> Result<TrainingStatistics> {
        let runs = self.store.list_runs().await?;
        let schedule = self.store.schedule().await?;
        let next = schedule.next_run(Utc::now());
        Ok(TrainingStatistics::compute(&runs).with_next_scheduled_run(next))
    }

    async fn resolve_hyper_parameters(&self, request: &TriggerRequest) -> Result<HyperParameters> {
        let base = match request.triggered_by {
            TriggerSource::Scheduled => self
                .store
                .schedule()
                .await?
                .hyper_parameters_over(self.defaults),
            TriggerSource::Manual => self.defaults,
        };
        Ok(HyperParameters {
            rank: request.rank.unwrap_or(base.rank),
            reg_param: request.reg_param.unwrap_or(base.reg_param),
            alpha: request.alpha.unwrap_or(base.alpha),
            max_iter: request.max_iter.unwrap_or(base.max_iter),
        })
    }

    async fn unique_run_id(&self, source: TriggerSource, now: DateTime<Utc>) -> Result<String> {
        let base = format!("{source}__{}", now.format("%Y-%m-%dT%H:%M:%S"));
        if !self.store.run_id_exists(&base).await? {
            return Ok(base);
        }
        for suffix in 1..=RUN_ID_ATTEMPTS {
            let candidate = format!("{base}_{suffix}");
            if !self.store.run_id_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(Error::Internal(format!(
            "Could not generate a unique run id after {RUN_ID_ATTEMPTS} attempts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ScheduleController, ScheduleUpdate};
    use crate::store::MemoryStore;

    fn registry() -> RunRegistry<MemoryStore> {
        RunRegistry::new(Arc::new(MemoryStore::default()))
    }

    #[tokio::test]
    async fn test_trigger_uses_defaults() {
        let registry = registry();
        let run = registry
            .trigger(TriggerRequest::new(TriggerSource::Manual))
            .await
            .unwrap();
        assert_eq!(run.status(), RunStatus::Queued);
        assert!(run.run_id().starts_with("manual__"));
        assert_eq!(run.hyper_parameters(), Some(&HyperParameters::default()));
    }

    #[tokio::test]
    async fn test_trigger_conflicts_while_active() {
        let registry = registry();
        let first = registry
            .trigger(TriggerRequest::new(TriggerSource::Manual))
            .await
            .unwrap();
        let err = registry
            .trigger(TriggerRequest::new(TriggerSource::Manual))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        registry.start(first.run_id()).await.unwrap();
        registry.complete(first.run_id(), RunStatus::Failed).await.unwrap();
        assert!(registry
            .trigger(TriggerRequest::new(TriggerSource::Manual))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_runs_get_distinct_ids() {
        let registry = registry().with_concurrent_runs(true);
        let a = registry.trigger(TriggerRequest::new(TriggerSource::Manual)).await.unwrap();
        let b = registry.trigger(TriggerRequest::new(TriggerSource::Manual)).await.unwrap();
        assert_ne!(a.run_id(), b.run_id());
    }

    #[tokio::test]
    async fn test_trigger_rejects_bad_hyper_parameters() {
        let registry = registry();
        let request = TriggerRequest {
            rank: Some(0),
            ..TriggerRequest::new(TriggerSource::Manual)
        };
        assert!(matches!(
            registry.trigger(request).await,
            Err(Error::Validation(_))
        ));
        let page = registry
            .list(RunFilter::default(), SortOrder::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 0);
    }

    #[tokio::test]
    async fn test_scheduled_trigger_inherits_schedule() {
        let store = Arc::new(MemoryStore::default());
        let registry = RunRegistry::new(Arc::clone(&store)).with_concurrent_runs(true);
        ScheduleController::new(Arc::clone(&store))
            .update(ScheduleUpdate {
                rank: Some(50),
                alpha: Some(40.0),
                ..ScheduleUpdate::default()
            })
            .await
            .unwrap();

        let scheduled = registry
            .trigger(TriggerRequest {
                max_iter: Some(20),
                ..TriggerRequest::new(TriggerSource::Scheduled)
            })
            .await
            .unwrap();
        let hp = scheduled.hyper_parameters().unwrap();
        assert_eq!(hp.rank, 50);
        assert!((hp.alpha - 40.0).abs() < f64::EPSILON);
        assert_eq!(hp.max_iter, 20);
        assert!((hp.reg_param - 0.01).abs() < f64::EPSILON);

        let manual = registry
            .trigger(TriggerRequest::new(TriggerSource::Manual))
            .await
            .unwrap();
        assert_eq!(manual.hyper_parameters().unwrap().rank, 10);
    }

    #[tokio::test]
    async fn test_queued_cannot_jump_to_success() {
        let registry = registry();
        let run = registry.trigger(TriggerRequest::new(TriggerSource::Manual)).await.unwrap();
        let err = registry
            .complete(run.run_id(), RunStatus::Success)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(registry.get(run.id()).await.unwrap().status(), RunStatus::Queued);
    }

    #[tokio::test]
    async fn test_logs() {
        let registry = registry();
        let run = registry.trigger(TriggerRequest::new(TriggerSource::Manual)).await.unwrap();

        let empty = registry.logs(run.run_id()).await.unwrap();
        assert_eq!(empty.logs, "");
        assert_eq!(empty.log_size, 0);

        registry.append_logs(run.run_id(), "héllo\n").await.unwrap();
        let logs = registry.logs(run.id()).await.unwrap();
        assert_eq!(logs.run_id, run.run_id());
        assert_eq!(logs.log_size, 7);

        assert!(matches!(registry.logs("missing").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_statistics_next_run_follows_pause() {
        let store = Arc::new(MemoryStore::default());
        let registry = RunRegistry::new(Arc::clone(&store));
        assert!(registry.statistics().await.unwrap().next_scheduled_run.is_some());

        ScheduleController::new(store).pause().await.unwrap();
        assert!(registry.statistics().await.unwrap().next_scheduled_run.is_none());
    }

    #[test]
    fn test_page_request_defaults() {
        let registry = registry().with_page_limits(20, 40);
        assert_eq!(registry.page_request(None, None).unwrap().limit(), 20);
        assert!(registry.page_request(None, Some(41)).is_err());
        assert!(registry.page_request(Some(0), None).is_err());
    }
}
