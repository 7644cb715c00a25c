//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Request,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::queue::{Intake, TaskStore};
use crate::server::middleware::api_key_auth_middleware;
use crate::server::routes::{
    enqueue_handler, index_handler, push_task_handler, task_status_handler,
};

/// Shared state for the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub store: TaskStore,
    pub intake: Arc<Intake>,
    pub config: Arc<Config>,
}

/// Build the API router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler).post(enqueue_handler))
        .route("/tasks/:id", get(task_status_handler))
        .route("/tasks/:id/push", post(push_task_handler))
        .layer(middleware::from_fn_with_state::<
            _,
            AppState,
            (axum::extract::State<AppState>, Request),
        >(state.clone(), api_key_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
