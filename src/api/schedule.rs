//! Schedule handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

use super::AppState;
use crate::schedule::{ScheduleUpdate, ScheduleView, TrainingSchedule};
use crate::store::TrainingStore;
use crate::Result;

fn view(schedule: TrainingSchedule) -> Json<ScheduleView> {
    Json(ScheduleView::at(schedule, Utc::now()))
}

pub(super) async fn get<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ScheduleView>> {
    Ok(view(state.schedule.get().await?))
}

pub(super) async fn update<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
    body: std::result::Result<Json<ScheduleUpdate>, JsonRejection>,
) -> Result<Json<ScheduleView>> {
    let Json(update) = body?;
    Ok(view(state.schedule.update(update).await?))
}

pub(super) async fn pause<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ScheduleView>> {
    Ok(view(state.schedule.pause().await?))
}

pub(super) async fn resume<S: TrainingStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ScheduleView>> {
    Ok(view(state.schedule.resume().await?))
}
