//! Task endpoints: enqueue, status lookup and re-push.

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::queue::{Task, TaskStatus};
use crate::server::app::AppState;
use crate::server::error::ApiError;
use crate::server::middleware::Caller;

#[derive(Debug, Deserialize)]
pub struct EnqueueQuery {
    pub url: Option<String>,
    pub method: Option<String>,
    pub timeout: Option<String>,
}

/// Public view of a task row.
#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: i64,
    pub url: String,
    pub status: TaskStatus,
    pub due: DateTime<Utc>,
    pub retry_count: i32,
    pub timeout: i32,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            url: task.url.clone(),
            status: task.status,
            due: task.due,
            retry_count: task.retry_count,
            timeout: task.timeout,
        }
    }
}

/// `POST /` — validate and enqueue a new task.
pub async fn enqueue_handler(
    State(state): State<AppState>,
    Query(query): Query<EnqueueQuery>,
    caller: Option<Extension<Caller>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let app_id = match (&caller, state.config.authenticate) {
        (Some(Extension(caller)), _) => Some(caller.application.id),
        (None, true) => return Err(ApiError::Forbidden),
        (None, false) => None,
    };

    let task = state
        .intake
        .enqueue(
            app_id,
            query.url.as_deref(),
            query.method.as_deref(),
            query.timeout.as_deref(),
            &headers,
            &body,
        )
        .await?;

    Ok(created_response(task.id))
}

/// `GET /tasks/:id` — task status for authorised callers.
pub async fn task_status_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    caller: Option<Extension<Caller>>,
) -> Result<Json<TaskView>, ApiError> {
    let task = state
        .store
        .lookup_task(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize(&state, caller.as_ref().map(|e| &e.0), &task).await?;

    Ok(Json(TaskView::from(&task)))
}

/// `POST /tasks/:id/push` — emit a fresh notification for an existing task.
pub async fn push_task_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    caller: Option<Extension<Caller>>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .store
        .lookup_task(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize(&state, caller.as_ref().map(|e| &e.0), &task).await?;

    state.intake.push_existing(&task).await;
    Ok(created_response(task.id))
}

/// Task access control: callers holding one of the owning application's
/// active api keys. Anonymous tasks are reachable only when authentication
/// is disabled.
async fn authorize(
    state: &AppState,
    caller: Option<&Caller>,
    task: &Task,
) -> Result<(), ApiError> {
    if !state.config.authenticate {
        return Ok(());
    }

    let Some(app_id) = task.app_id else {
        return Err(ApiError::Forbidden);
    };
    let Some(caller) = caller else {
        return Err(ApiError::Forbidden);
    };

    let keys = state.store.lookup_active_key_values(app_id).await?;
    if keys.iter().any(|key| key == &caller.token) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn created_response(task_id: i64) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        [(header::LOCATION, format!("/tasks/{task_id}"))],
    )
}
