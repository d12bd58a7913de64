//! Model version and metric handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::metrics::{MetricRecord, MetricsData};
use crate::registry::ModelVersion;
use crate::store::TrainingStore;
use crate::{Error, Result};

/// `?version_id=` of the metric endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    version_id: Option<String>,
}

impl VersionQuery {
    fn version_id(&self) -> Result<i64> {
        self.version_id
            .as_deref()
            .ok_or_else(|| Error::validation("version_id is required"))?
            .parse()
            .map_err(|_| Error::validation("version_id must be an integer"))
    }
}

/// One metric record as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricItem {
    /// Name such as `Precision@10`
    pub metric_name: String,
    /// Raw value
    pub metric_value: f64,
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
}

impl From<MetricRecord> for MetricItem {
    fn from(record: MetricRecord) -> Self {
        Self {
            metric_name: record.metric_name().to_string(),
            metric_value: record.metric_value(),
            timestamp: record.timestamp(),
        }
    }
}

/// Body of `GET /metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    /// Records, newest first
    pub metrics: Vec<MetricItem>,
    /// Requested version
    pub version_id: i64,
    /// Its tag
    pub version_tag: String,
}

/// Body of `GET /metrics/summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// Requested version
    pub version_id: i64,
    /// Its tag
    pub version_tag: String,
    /// Aggregated metrics
    pub data: MetricsData,
}

/// Body of the active-version endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveVersionResponse {
    /// The active version, if any
    pub active_version: Option<ModelVersion>,
    /// Human-readable outcome
    pub message: String,
}

/// Body of `POST /model-versions/active`.
#[derive(Debug, Deserialize)]
pub struct SetActiveBody {
    model_version_id: i64,
}

pub(super) async fn metrics<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    query: std::result::Result<Query<VersionQuery>, QueryRejection>,
) -> Result<Json<MetricsResponse>> {
    let Query(query) = query?;
    let found = state.catalog.metrics(query.version_id()?).await?;
    Ok(Json(MetricsResponse {
        version_id: found.version.id(),
        version_tag: found.version.version_tag().to_string(),
        metrics: found.records.into_iter().map(MetricItem::from).collect(),
    }))
}

pub(super) async fn summary<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    query: std::result::Result<Query<VersionQuery>, QueryRejection>,
) -> Result<Json<SummaryResponse>> {
    let Query(query) = query?;
    let found = state.catalog.summary(query.version_id()?).await?;
    Ok(Json(SummaryResponse {
        version_id: found.version.id(),
        version_tag: found.version.version_tag().to_string(),
        data: found.data,
    }))
}

pub(super) async fn versions<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<ModelVersion>>> {
    Ok(Json(state.catalog.list().await?))
}

pub(super) async fn active<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ActiveVersionResponse>> {
    let active_version = state.catalog.active().await?;
    let message = active_version.as_ref().map_or_else(
        || "No active model version configured".to_string(),
        |v| format!("Active version: {}", v.version_tag()),
    );
    Ok(Json(ActiveVersionResponse {
        active_version,
        message,
    }))
}

pub(super) async fn set_active<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    body: std::result::Result<Json<SetActiveBody>, JsonRejection>,
) -> Result<Json<ActiveVersionResponse>> {
    let Json(body) = body?;
    let version = state.catalog.activate(body.model_version_id).await?;
    Ok(Json(ActiveVersionResponse {
        message: format!("Successfully set active version to: {}", version.version_tag()),
        active_version: Some(version),
    }))
}
