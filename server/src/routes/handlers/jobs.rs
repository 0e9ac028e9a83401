use axum::{extract::State, Json};
use serde::Serialize;

use crate::{
    error::{AppError, AppJsonResult},
    model::newsletter::{NewsletterCtrl, StoreStats},
    state::jobs::{self, JobKind},
    ServerState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub daily_running: bool,
    pub weekly_running: bool,
    pub store: StoreStats,
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub message: String,
}

pub async fn handler_status(State(state): State<ServerState>) -> AppJsonResult<StatusResponse> {
    let store = NewsletterCtrl::stats(&state.conn).await?;

    Ok(Json(StatusResponse {
        daily_running: state.jobs.is_running(JobKind::Daily),
        weekly_running: state.jobs.is_running(JobKind::Weekly),
        store,
    }))
}

/// Kick off a daily run now. Idempotent: a trigger while the job is RUNNING
/// replies 409 without double-invoking the pipeline.
pub async fn handler_trigger_daily(
    State(state): State<ServerState>,
) -> AppJsonResult<TriggerResponse> {
    if !jobs::spawn_daily(state.clone()) {
        return Err(AppError::Conflict(
            "Daily ingestion is already running".to_string(),
        ));
    }

    Ok(Json(TriggerResponse {
        message: "Daily ingestion started".to_string(),
    }))
}

pub async fn handler_trigger_weekly(
    State(state): State<ServerState>,
) -> AppJsonResult<TriggerResponse> {
    if !jobs::spawn_weekly(state.clone()) {
        return Err(AppError::Conflict(
            "Weekly digest generation is already running".to_string(),
        ));
    }

    Ok(Json(TriggerResponse {
        message: "Weekly digest generation started".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::jobs::JobCoordinator;
    use crate::testing::common::setup_db;

    async fn test_state() -> ServerState {
        ServerState {
            http_client: reqwest::Client::new(),
            conn: setup_db().await,
            jobs: JobCoordinator::new(),
        }
    }

    #[tokio::test]
    async fn test_status_reports_idle_jobs_and_store_stats() {
        let state = test_state().await;

        let Json(status) = handler_status(State(state)).await.unwrap();

        assert!(!status.daily_running);
        assert!(!status.weekly_running);
        assert_eq!(status.store.total, 0);
    }

    #[tokio::test]
    async fn test_trigger_conflicts_while_job_is_running() {
        let state = test_state().await;

        let _guard = state.jobs.try_begin(JobKind::Daily).unwrap();
        let result = handler_trigger_daily(State(state.clone())).await;

        match result {
            Err(AppError::Conflict(_)) => {}
            _ => panic!("expected conflict while daily job is running"),
        }

        // the other job is unaffected by the daily flag
        assert!(!state.jobs.is_running(JobKind::Weekly));
    }
}
