//! Persistence for runs, model versions, metrics and the schedule
//!
//! The [`TrainingStore`] trait is the seam between the service logic and
//! whatever holds the rows. [`MemoryStore`] is the default backend; data is
//! lost on process restart. A database-backed store implements the same
//! trait.
//!
//! # Example
//!
//! ```rust
//! use als_ops::registry::{HyperParameters, ModelRun, TriggerSource};
//! use als_ops::store::{MemoryStore, TrainingStore};
//!
//! # async fn example() -> als_ops::Result<()> {
//! let store = MemoryStore::default();
//!
//! let run = ModelRun::new("manual__2025-11-12T12:30:00", TriggerSource::Manual, HyperParameters::default());
//! store.insert_run(run).await?;
//!
//! let running = store
//!     .modify_run("manual__2025-11-12T12:30:00", |run| run.start())
//!     .await?;
//! assert_eq!(running.status().as_str(), "running");
//!
//! let version = store.insert_version("2025-11-12_12-45-00", "models/als_model_2025-11-12_12-45-00").await?;
//! store.set_active_version(version.id()).await?;
//! assert_eq!(store.active_version().await?.map(|v| v.id()), Some(version.id()));
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryStore;

use std::future::Future;

use crate::metrics::MetricRecord;
use crate::registry::{ModelRun, ModelVersion};
use crate::schedule::TrainingSchedule;
use crate::Result;

/// Storage backend for the training service.
///
/// Run lookups accept either the internal UUID or the human-readable run ID.
pub trait TrainingStore: Send + Sync {
    /// Insert a new run.
    ///
    /// Fails with `Conflict` if a run with the same `run_id` exists.
    fn insert_run(&self, run: ModelRun) -> impl Future<Output = Result<()>> + Send;

    /// Get a run by ID or run ID.
    ///
    /// Returns `None` if no run matches.
    fn get_run(&self, key: &str) -> impl Future<Output = Result<Option<ModelRun>>> + Send;

    /// All runs, in no particular order.
    fn list_runs(&self) -> impl Future<Output = Result<Vec<ModelRun>>> + Send;

    /// Apply `f` to a run atomically and return the result.
    ///
    /// `f` sees a working copy; the stored run is replaced only if `f`
    /// returns `Ok`. Fails with `NotFound` if no run matches `key`.
    fn modify_run<F>(&self, key: &str, f: F) -> impl Future<Output = Result<ModelRun>> + Send
    where
        F: FnOnce(&mut ModelRun) -> Result<()> + Send;

    /// Whether a run with this `run_id` exists.
    fn run_id_exists(&self, run_id: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get_run(run_id).await?.is_some()) }
    }

    /// Register a new, inactive model version and assign its ID.
    fn insert_version(
        &self,
        version_tag: &str,
        artifact_path: &str,
    ) -> impl Future<Output = Result<ModelVersion>> + Send;

    /// Get a model version by ID.
    fn get_version(&self, id: i64) -> impl Future<Output = Result<Option<ModelVersion>>> + Send;

    /// All model versions, newest first.
    fn list_versions(&self) -> impl Future<Output = Result<Vec<ModelVersion>>> + Send;

    /// Make `id` the only active version.
    ///
    /// Fails with `NotFound` if the version does not exist.
    fn set_active_version(&self, id: i64) -> impl Future<Output = Result<ModelVersion>> + Send;

    /// The active version, if any.
    fn active_version(&self) -> impl Future<Output = Result<Option<ModelVersion>>> + Send {
        async move {
            Ok(self
                .list_versions()
                .await?
                .into_iter()
                .find(ModelVersion::is_active))
        }
    }

    /// Append metric records. Records are never updated.
    fn insert_metrics(&self, records: Vec<MetricRecord>) -> impl Future<Output = Result<()>> + Send;

    /// Metric records of one version, newest first.
    fn metrics_for_version(
        &self,
        model_version_id: i64,
    ) -> impl Future<Output = Result<Vec<MetricRecord>>> + Send;

    /// The schedule row.
    fn schedule(&self) -> impl Future<Output = Result<TrainingSchedule>> + Send;

    /// Apply `f` to the schedule atomically and return the result.
    ///
    /// The stored schedule is replaced only if `f` returns `Ok`.
    fn modify_schedule<F>(&self, f: F) -> impl Future<Output = Result<TrainingSchedule>> + Send
    where
        F: FnOnce(&mut TrainingSchedule) -> Result<()> + Send;
}
