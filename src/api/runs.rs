//! Run and statistics handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use super::AppState;
use crate::registry::{
    ModelRun, Priority, RunFilter, RunLogs, RunPage, SortOrder, TrainingStatistics,
    TriggerRequest, TriggerSource,
};
use crate::store::TrainingStore;
use crate::{Error, Result};

const SORT_FIELD: &str = "start_time";

/// Query string of `GET /runs`. Values arrive as text and are validated here
/// so a bad value gets the standard envelope.
#[derive(Debug, Default, Deserialize)]
pub struct RunListQuery {
    status: Option<String>,
    triggered_by: Option<String>,
    page: Option<String>,
    limit: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

/// Body of `POST /runs/trigger`.
#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    priority: Option<String>,
    triggered_by: Option<String>,
    rank: Option<u32>,
    #[serde(rename = "regParam")]
    reg_param: Option<f64>,
    alpha: Option<f64>,
    #[serde(rename = "maxIter")]
    max_iter: Option<u32>,
}

impl TryFrom<TriggerBody> for TriggerRequest {
    type Error = Error;

    fn try_from(body: TriggerBody) -> Result<Self> {
        let triggered_by: TriggerSource = body
            .triggered_by
            .as_deref()
            .ok_or_else(|| Error::validation("triggered_by is required"))?
            .parse()?;
        let priority = body
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            priority,
            triggered_by,
            rank: body.rank,
            reg_param: body.reg_param,
            alpha: body.alpha,
            max_iter: body.max_iter,
        })
    }
}

fn parse_number(field: &str, raw: Option<&str>) -> Result<Option<u32>> {
    raw.map(|value| {
        value
            .parse::<u32>()
            .map_err(|_| Error::validation(format!("{field} must be a positive integer")))
    })
    .transpose()
}

pub(super) async fn list<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    query: std::result::Result<Query<RunListQuery>, QueryRejection>,
) -> Result<Json<RunPage>> {
    let Query(query) = query?;

    let filter = RunFilter {
        status: query.status.as_deref().map(str::parse).transpose()?,
        triggered_by: query.triggered_by.as_deref().map(str::parse).transpose()?,
    };
    if let Some(sort) = query.sort.as_deref() {
        if sort != SORT_FIELD {
            return Err(Error::validation(format!(
                "Invalid sort field. Must be: {SORT_FIELD}"
            )));
        }
    }
    let order: SortOrder = query
        .order
        .as_deref()
        .map(str::parse)
        .transpose()?
        .unwrap_or_default();
    let request = state.registry.page_request(
        parse_number("page", query.page.as_deref())?,
        parse_number("limit", query.limit.as_deref())?,
    )?;

    Ok(Json(state.registry.list(filter, order, request).await?))
}

pub(super) async fn get<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(run_id): Path<String>,
) -> Result<Json<ModelRun>> {
    Ok(Json(state.registry.get(&run_id).await?))
}

pub(super) async fn trigger<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    body: std::result::Result<Json<TriggerBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ModelRun>)> {
    let Json(body) = body?;
    let run = state.registry.trigger(TriggerRequest::try_from(body)?).await?;

    if let Some(runner) = &state.runner {
        if let Err(e) = runner.submit(run.run_id()) {
            warn!(run_id = run.run_id(), error = %e, "Run left queued");
        }
    }
    Ok((StatusCode::CREATED, Json(run)))
}

pub(super) async fn logs<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunLogs>> {
    Ok(Json(state.registry.logs(&run_id).await?))
}

pub(super) async fn statistics<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<TrainingStatistics>> {
    Ok(Json(state.registry.statistics().await?))
}
