//! Enqueue path: validate a submission, persist the task, then notify.
//!
//! The task row is committed before the notification is pushed; a channel
//! failure after commit is logged and left for the requeuer to repair, so
//! the store stays authoritative.

use axum::http::HeaderMap;
use thiserror::Error;
use tracing::warn;

use crate::config::IntakeConfig;
use crate::queue::notifier::Notifier;
use crate::queue::store::TaskStore;
use crate::queue::task::{NewTask, Task, TaskMethod};

pub const DEFAULT_CHARSET: &str = "utf8";
pub const DEFAULT_ENCTYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("You must provide a valid web hook URL.")]
    InvalidUrl,
    #[error("You must provide a valid integer timeout.")]
    InvalidTimeout,
    #[error("Request method must be one of: DELETE, PATCH, POST, PUT.")]
    InvalidMethod,
    #[error("Unknown charset: {0}")]
    UnknownCharset(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Validates and stores enqueue submissions.
pub struct Intake {
    store: TaskStore,
    notifier: Notifier,
    config: IntakeConfig,
}

impl Intake {
    pub fn new(store: TaskStore, notifier: Notifier, config: IntakeConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Validate the submission, create the task and push its notification.
    pub async fn enqueue(
        &self,
        app_id: Option<i64>,
        url: Option<&str>,
        method: Option<&str>,
        timeout: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Task, IntakeError> {
        let url = validate_url(url)?;
        let timeout = match timeout {
            Some(raw) => raw.parse::<i32>().map_err(|_| IntakeError::InvalidTimeout)?,
            None => self.config.default_timeout,
        };
        let method = match method {
            Some(raw) => TaskMethod::parse(raw).ok_or(IntakeError::InvalidMethod)?,
            None => TaskMethod::Post,
        };

        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok());
        let enctype = parse_enctype(content_type);
        let charset =
            parse_charset(content_type).unwrap_or_else(|| DEFAULT_CHARSET.to_string());
        let body = decode_body(&charset, body)?;
        let passthrough = extract_passthrough_headers(&self.config.passthrough_prefix, headers);

        let task = self
            .store
            .create_task(NewTask {
                app_id,
                url,
                timeout,
                method,
                charset,
                enctype,
                headers: passthrough,
                body,
            })
            .await?;

        // The row is committed; a channel hiccup here only delays delivery
        // until the requeuer republishes.
        if let Err(e) = self
            .notifier
            .push_tail(&self.config.channel, &task.instruction())
            .await
        {
            warn!(task_id = task.id, error = %e, "failed to push task notification");
        }

        Ok(task)
    }

    /// Re-notify an existing task using its current retry count.
    pub async fn push_existing(&self, task: &Task) {
        if let Err(e) = self
            .notifier
            .push_tail(&self.config.channel, &task.instruction())
            .await
        {
            warn!(task_id = task.id, error = %e, "failed to push task notification");
        }
    }
}

fn validate_url(url: Option<&str>) -> Result<String, IntakeError> {
    let raw = url.filter(|u| !u.is_empty()).ok_or(IntakeError::InvalidUrl)?;
    let parsed = url::Url::parse(raw).map_err(|_| IntakeError::InvalidUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(IntakeError::InvalidUrl);
    }
    Ok(raw.to_string())
}

/// First token of the Content-Type header, before any parameters.
pub fn parse_enctype(content_type: Option<&str>) -> String {
    match content_type {
        Some(value) => value
            .split(';')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ENCTYPE)
            .to_string(),
        None => DEFAULT_ENCTYPE.to_string(),
    }
}

/// The charset parameter of the Content-Type header, as sent.
pub fn parse_charset(content_type: Option<&str>) -> Option<String> {
    let value = content_type?;
    for param in value.split(';').skip(1) {
        let param = param.trim();
        if let Some(charset) = param
            .strip_prefix("charset=")
            .or_else(|| param.strip_prefix("CHARSET="))
        {
            let charset = charset.trim_matches('"');
            if !charset.is_empty() {
                return Some(charset.to_string());
            }
        }
    }
    None
}

fn decode_body(charset: &str, body: &[u8]) -> Result<String, IntakeError> {
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes())
        .ok_or_else(|| IntakeError::UnknownCharset(charset.to_string()))?;
    let (decoded, _, _) = encoding.decode(body);
    Ok(decoded.into_owned())
}

/// Collect headers matching the configured prefix (case-insensitively),
/// stripping the prefix from the stored name.
pub fn extract_passthrough_headers(prefix: &str, headers: &HeaderMap) -> serde_json::Value {
    let prefix = prefix.to_lowercase();
    let mut passthrough = serde_json::Map::new();
    for (name, value) in headers {
        let name = name.as_str();
        if name.len() > prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(&prefix) {
            if let Ok(value) = value.to_str() {
                passthrough.insert(
                    name[prefix.len()..].to_string(),
                    serde_json::Value::String(value.to_string()),
                );
            }
        }
    }
    serde_json::Value::Object(passthrough)
}
