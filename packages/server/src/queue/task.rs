//! Task model: one scheduled outbound web-hook request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery state. `Pending` is the only non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

/// HTTP method used for the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_method", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskMethod {
    Delete,
    Patch,
    Post,
    Put,
}

impl TaskMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMethod::Delete => "DELETE",
            TaskMethod::Patch => "PATCH",
            TaskMethod::Post => "POST",
            TaskMethod::Put => "PUT",
        }
    }

    /// Parse a method name as supplied in the enqueue query string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DELETE" => Some(TaskMethod::Delete),
            "PATCH" => Some(TaskMethod::Patch),
            "POST" => Some(TaskMethod::Post),
            "PUT" => Some(TaskMethod::Put),
            _ => None,
        }
    }
}

impl From<TaskMethod> for reqwest::Method {
    fn from(method: TaskMethod) -> Self {
        match method {
            TaskMethod::Delete => reqwest::Method::DELETE,
            TaskMethod::Patch => reqwest::Method::PATCH,
            TaskMethod::Post => reqwest::Method::POST,
            TaskMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// A persisted task row.
///
/// `headers` is a JSON object of pass-through header names to values; the
/// body has already been decoded from the submitter's charset.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub version: i32,
    pub app_id: Option<i64>,
    pub retry_count: i32,
    pub timeout: i32,
    pub due: DateTime<Utc>,
    pub status: TaskStatus,
    pub url: String,
    pub charset: String,
    pub enctype: String,
    pub headers: serde_json::Value,
    pub body: String,
    pub method: TaskMethod,
}

impl Task {
    /// Notification payload for this task's current attempt.
    pub fn instruction(&self) -> String {
        format!("{}:{}", self.id, self.retry_count)
    }

    /// The stored pass-through headers as name/value pairs.
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        match self.headers.as_object() {
            Some(map) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Fields supplied by intake when creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub app_id: Option<i64>,
    pub url: String,
    pub timeout: i32,
    pub method: TaskMethod,
    pub charset: String,
    pub enctype: String,
    pub headers: serde_json::Value,
    pub body: String,
}
