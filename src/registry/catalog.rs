//! Model version catalogue and per-version metrics

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::ModelVersion;
use crate::metrics::{aggregate, MetricRecord, MetricsData};
use crate::store::TrainingStore;
use crate::{Error, Result};

/// Metric records of one version, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMetrics {
    /// Version the records belong to
    pub version: ModelVersion,
    /// Raw records
    pub records: Vec<MetricRecord>,
}

/// Aggregated metrics of one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Version the data belongs to
    pub version: ModelVersion,
    /// Chart-ready arrays and per-K summaries
    pub data: MetricsData,
}

/// Lists model versions, tracks the active one, and serves their metrics.
#[derive(Debug)]
pub struct VersionCatalog<S> {
    store: Arc<S>,
}

impl<S> Clone for VersionCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TrainingStore> VersionCatalog<S> {
    /// Create a catalogue over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// All versions, newest first.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn list(&self) -> Result<Vec<ModelVersion>> {
        self.store.list_versions().await
    }

    /// Version by ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ID.
    pub async fn get(&self, id: i64) -> Result<ModelVersion> {
        self.store
            .get_version(id)
            .await?
            .ok_or_else(|| Error::version_not_found(id))
    }

    /// The version currently served, if any.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn active(&self) -> Result<Option<ModelVersion>> {
        self.store.active_version().await
    }

    /// Make `id` the only active version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown ID.
    pub async fn activate(&self, id: i64) -> Result<ModelVersion> {
        let version = self.store.set_active_version(id).await?;
        info!(id, version_tag = version.version_tag(), "Active model version changed");
        Ok(version)
    }

    /// Register the artifact of a successful run together with its metrics.
    ///
    /// `records` are re-attributed to the new version's ID.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn register(
        &self,
        version_tag: &str,
        artifact_path: &str,
        records: Vec<MetricRecord>,
    ) -> Result<ModelVersion> {
        let version = self.store.insert_version(version_tag, artifact_path).await?;
        let records: Vec<MetricRecord> = records
            .into_iter()
            .map(|r| {
                MetricRecord::builder(version.id(), r.metric_name(), r.metric_value())
                    .timestamp(r.timestamp())
                    .build()
            })
            .collect();
        let metric_count = records.len();
        self.store.insert_metrics(records).await?;
        info!(
            id = version.id(),
            version_tag,
            artifact_path,
            metric_count,
            "Model version registered"
        );
        Ok(version)
    }

    /// Raw metric records of a version, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown version.
    pub async fn metrics(&self, version_id: i64) -> Result<VersionMetrics> {
        let version = self.get(version_id).await?;
        let records = self.store.metrics_for_version(version_id).await?;
        Ok(VersionMetrics { version, records })
    }

    /// Aggregated metrics of a version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown version.
    pub async fn summary(&self, version_id: i64) -> Result<VersionSummary> {
        let VersionMetrics { version, records } = self.metrics(version_id).await?;
        Ok(VersionSummary {
            version,
            data: aggregate(&records),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;
    use crate::store::MemoryStore;

    fn catalog() -> VersionCatalog<MemoryStore> {
        VersionCatalog::new(Arc::new(MemoryStore::default()))
    }

    #[tokio::test]
    async fn test_register_reattributes_metrics() {
        let catalog = catalog();
        let records = vec![
            MetricRecord::new(0, "Precision@10", 0.12),
            MetricRecord::new(0, "Ndcg@10", 0.5),
        ];
        let version = catalog
            .register("2025-11-12_12-30-00", "models/als_model_2025-11-12_12-30-00", records)
            .await
            .unwrap();

        let metrics = catalog.metrics(version.id()).await.unwrap();
        assert_eq!(metrics.records.len(), 2);
        assert!(metrics
            .records
            .iter()
            .all(|r| r.model_version_id() == version.id()));

        let summary = catalog.summary(version.id()).await.unwrap();
        assert!((summary.data.value(MetricKind::Precision, 10).unwrap() - 12.0).abs() < 1e-9);
        assert!((summary.data.value(MetricKind::Ndcg, 10).unwrap() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let catalog = catalog();
        assert!(matches!(catalog.metrics(99).await, Err(Error::NotFound(_))));
        assert!(matches!(catalog.activate(99).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_version_without_metrics_summarizes_to_zero() {
        let catalog = catalog();
        let version = catalog.register("t", "models/als_model_t", vec![]).await.unwrap();
        let summary = catalog.summary(version.id()).await.unwrap();
        assert!(summary.data.is_zero());
    }

    #[tokio::test]
    async fn test_activate() {
        let catalog = catalog();
        assert!(catalog.active().await.unwrap().is_none());
        let a = catalog.register("a", "pa", vec![]).await.unwrap();
        let b = catalog.register("b", "pb", vec![]).await.unwrap();
        catalog.activate(a.id()).await.unwrap();
        catalog.activate(b.id()).await.unwrap();
        let active = catalog.active().await.unwrap().unwrap();
        assert_eq!(active.id(), b.id());
        assert_eq!(catalog.list().await.unwrap().iter().filter(|v| v.is_active()).count(), 1);
    }
}
