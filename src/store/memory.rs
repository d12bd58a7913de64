//! In-memory training store using `DashMap`.
//!
//! This is the default backend - data is lost on process restart.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use super::TrainingStore;
use crate::metrics::MetricRecord;
use crate::registry::{ModelRun, ModelVersion};
use crate::schedule::TrainingSchedule;
use crate::{Error, Result};

/// In-memory store backed by concurrent hashmaps.
///
/// Runs are keyed by internal ID, with a secondary `run_id` index. The
/// schedule lives behind an async `RwLock`.
///
/// # Example
///
/// ```rust
/// use als_ops::schedule::TrainingSchedule;
/// use als_ops::store::{MemoryStore, TrainingStore};
///
/// # async fn example() -> als_ops::Result<()> {
/// let store = MemoryStore::new(TrainingSchedule::new("0 */6 * * *", false)?);
/// assert_eq!(store.schedule().await?.cron_expression(), "0 */6 * * *");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    runs: DashMap<String, ModelRun>,
    run_ids: DashMap<String, String>,
    versions: DashMap<i64, ModelVersion>,
    next_version_id: AtomicI64,
    activation: Mutex<()>,
    metrics: DashMap<i64, Vec<MetricRecord>>,
    schedule: RwLock<TrainingSchedule>,
}

impl MemoryStore {
    /// Create an empty store seeded with `schedule`.
    #[must_use]
    pub fn new(schedule: TrainingSchedule) -> Self {
        Self {
            runs: DashMap::new(),
            run_ids: DashMap::new(),
            versions: DashMap::new(),
            next_version_id: AtomicI64::new(1),
            activation: Mutex::new(()),
            metrics: DashMap::new(),
            schedule: RwLock::new(schedule),
        }
    }

    /// Number of runs held.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Number of model versions held.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Insert a version with a caller-chosen ID (useful for testing).
    ///
    /// Later [`insert_version`](TrainingStore::insert_version) calls never
    /// reuse an ID at or below this one.
    pub fn put_version(&self, version: ModelVersion) {
        self.next_version_id
            .fetch_max(version.id() + 1, Ordering::SeqCst);
        self.versions.insert(version.id(), version);
    }

    fn resolve(&self, key: &str) -> Option<String> {
        if self.runs.contains_key(key) {
            return Some(key.to_string());
        }
        self.run_ids.get(key).map(|id| id.value().clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(TrainingSchedule::default())
    }
}

impl TrainingStore for MemoryStore {
    async fn insert_run(&self, run: ModelRun) -> Result<()> {
        match self.run_ids.entry(run.run_id().to_string()) {
            Entry::Occupied(_) => Err(Error::Conflict(format!(
                "Run {} already exists",
                run.run_id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(run.id().to_string());
                trace!(run_id = run.run_id(), "Inserted run");
                self.runs.insert(run.id().to_string(), run);
                Ok(())
            }
        }
    }

    async fn get_run(&self, key: &str) -> Result<Option<ModelRun>> {
        Ok(self
            .resolve(key)
            .and_then(|id| self.runs.get(&id).map(|run| run.value().clone())))
    }

    async fn list_runs(&self) -> Result<Vec<ModelRun>> {
        Ok(self.runs.iter().map(|run| run.value().clone()).collect())
    }

    async fn modify_run<F>(&self, key: &str, f: F) -> Result<ModelRun>
    where
        F: FnOnce(&mut ModelRun) -> Result<()> + Send,
    {
        let id = self.resolve(key).ok_or_else(|| Error::run_not_found(key))?;
        let mut entry = self
            .runs
            .get_mut(&id)
            .ok_or_else(|| Error::run_not_found(key))?;

        let mut working = entry.value().clone();
        f(&mut working)?;
        *entry.value_mut() = working.clone();
        Ok(working)
    }

    async fn insert_version(&self, version_tag: &str, artifact_path: &str) -> Result<ModelVersion> {
        let id = self.next_version_id.fetch_add(1, Ordering::SeqCst);
        let version = ModelVersion::new(id, version_tag, artifact_path);
        debug!(id, version_tag, "Registered model version");
        self.versions.insert(id, version.clone());
        Ok(version)
    }

    async fn get_version(&self, id: i64) -> Result<Option<ModelVersion>> {
        Ok(self.versions.get(&id).map(|v| v.value().clone()))
    }

    async fn list_versions(&self) -> Result<Vec<ModelVersion>> {
        let mut versions: Vec<ModelVersion> =
            self.versions.iter().map(|v| v.value().clone()).collect();
        versions.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(versions)
    }

    async fn set_active_version(&self, id: i64) -> Result<ModelVersion> {
        let _guard = self.activation.lock().await;
        if !self.versions.contains_key(&id) {
            return Err(Error::version_not_found(id));
        }
        for mut version in self.versions.iter_mut() {
            let active = version.id() == id;
            version.set_active(active);
        }
        self.versions
            .get(&id)
            .map(|v| v.value().clone())
            .ok_or_else(|| Error::version_not_found(id))
    }

    async fn insert_metrics(&self, records: Vec<MetricRecord>) -> Result<()> {
        for record in records {
            self.metrics
                .entry(record.model_version_id())
                .or_default()
                .push(record);
        }
        Ok(())
    }

    async fn metrics_for_version(&self, model_version_id: i64) -> Result<Vec<MetricRecord>> {
        let mut records = self
            .metrics
            .get(&model_version_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        records.sort_by_key(|r| std::cmp::Reverse(r.timestamp()));
        Ok(records)
    }

    async fn schedule(&self) -> Result<TrainingSchedule> {
        Ok(self.schedule.read().await.clone())
    }

    async fn modify_schedule<F>(&self, f: F) -> Result<TrainingSchedule>
    where
        F: FnOnce(&mut TrainingSchedule) -> Result<()> + Send,
    {
        let mut guard = self.schedule.write().await;
        let mut working = guard.clone();
        f(&mut working)?;
        *guard = working.clone();
        Ok(working)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{HyperParameters, RunStatus, TriggerSource};
    use std::sync::Arc;

    fn run(run_id: &str) -> ModelRun {
        ModelRun::new(run_id, TriggerSource::Manual, HyperParameters::default())
    }

    // ============================================================
    // Runs
    // ============================================================

    #[tokio::test]
    async fn test_insert_and_get_by_either_key() {
        let store = MemoryStore::default();
        let r = run("manual__2025-11-12T12:30:00");
        let id = r.id().to_string();
        store.insert_run(r).await.unwrap();

        let by_id = store.get_run(&id).await.unwrap().unwrap();
        let by_run_id = store.get_run("manual__2025-11-12T12:30:00").await.unwrap().unwrap();
        assert_eq!(by_id, by_run_id);
        assert!(store.get_run("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_run_id_conflicts() {
        let store = MemoryStore::default();
        store.insert_run(run("manual__x")).await.unwrap();
        let err = store.insert_run(run("manual__x")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.run_count(), 1);
        assert!(store.run_id_exists("manual__x").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_modify_leaves_run_untouched() {
        let store = MemoryStore::default();
        store.insert_run(run("manual__x")).await.unwrap();

        let err = store
            .modify_run("manual__x", |r| {
                r.append_logs("partial");
                r.complete(RunStatus::Success)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let stored = store.get_run("manual__x").await.unwrap().unwrap();
        assert_eq!(stored.status(), RunStatus::Queued);
        assert!(stored.logs().is_none());
    }

    #[tokio::test]
    async fn test_modify_missing_run() {
        let store = MemoryStore::default();
        let err = store.modify_run("nope", |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_log_appends() {
        let store = Arc::new(MemoryStore::default());
        store.insert_run(run("manual__x")).await.unwrap();

        let mut handles = vec![];
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .modify_run("manual__x", |r| {
                        r.append_logs("line\n");
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get_run("manual__x").await.unwrap().unwrap();
        assert_eq!(stored.log_size(), 50 * 5);
    }

    // ============================================================
    // Versions and metrics
    // ============================================================

    #[tokio::test]
    async fn test_single_active_version() {
        let store = MemoryStore::default();
        let a = store.insert_version("a", "models/als_model_a").await.unwrap();
        let b = store.insert_version("b", "models/als_model_b").await.unwrap();
        assert_ne!(a.id(), b.id());

        store.set_active_version(a.id()).await.unwrap();
        store.set_active_version(b.id()).await.unwrap();

        let active: Vec<i64> = store
            .list_versions()
            .await
            .unwrap()
            .into_iter()
            .filter(ModelVersion::is_active)
            .map(|v| v.id())
            .collect();
        assert_eq!(active, vec![b.id()]);
        assert_eq!(store.active_version().await.unwrap().unwrap().id(), b.id());
    }

    #[tokio::test]
    async fn test_activate_unknown_version() {
        let store = MemoryStore::default();
        let err = store.set_active_version(42).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(store.active_version().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_version_advances_ids() {
        let store = MemoryStore::default();
        store.put_version(ModelVersion::new(7, "seed", "models/als_model_seed"));
        let next = store.insert_version("n", "p").await.unwrap();
        assert_eq!(next.id(), 8);
        assert_eq!(store.version_count(), 2);
    }

    #[tokio::test]
    async fn test_metrics_newest_first() {
        use chrono::{Duration, Utc};
        let store = MemoryStore::default();
        let now = Utc::now();
        store
            .insert_metrics(vec![
                MetricRecord::builder(1, "Precision@10", 0.1)
                    .timestamp(now - Duration::minutes(5))
                    .build(),
                MetricRecord::builder(1, "Precision@10", 0.2).timestamp(now).build(),
                MetricRecord::builder(2, "Recall@10", 0.3).timestamp(now).build(),
            ])
            .await
            .unwrap();

        let records = store.metrics_for_version(1).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!((records[0].metric_value() - 0.2).abs() < f64::EPSILON);
        assert!(store.metrics_for_version(3).await.unwrap().is_empty());
    }

    // ============================================================
    // Schedule
    // ============================================================

    #[tokio::test]
    async fn test_failed_schedule_modify_is_discarded() {
        let store = MemoryStore::default();
        let before = store.schedule().await.unwrap();
        let result = store
            .modify_schedule(|s| {
                s.set_paused(true, chrono::Utc::now());
                Err(Error::validation("rejected"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.schedule().await.unwrap(), before);
    }
}
