use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ServerState;

use super::handlers::jobs;

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            .route("/", get(|| async { "Newsletter digest server" }))
            .route("/status", get(jobs::handler_status))
            .route("/jobs/daily", post(jobs::handler_trigger_daily))
            .route("/jobs/weekly", post(jobs::handler_trigger_weekly))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
