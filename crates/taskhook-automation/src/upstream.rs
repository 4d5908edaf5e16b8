//! Upstream task detail lookups.
//!
//! The processor enriches webhook tasks with the platform's current view of
//! the task. Lookups are best-effort: the processor falls back to the fields
//! embedded in the webhook on any error here.

use std::{collections::BTreeMap, fmt, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use taskhook_core::metadata::scalar_to_string;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

/// Task fields the processor routes and gates on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDetail {
    /// Task title, used as the routing task name.
    pub title: Option<String>,
    /// Category display name.
    pub category_name: Option<String>,
    /// Category id, compared against the tenant's automated-tasks category.
    pub category_id: Option<String>,
}

impl TaskDetail {
    /// Reads a task document of the shape
    /// `{"title": .., "category": {"name": .., "id": ..}}`.
    ///
    /// A `data` wrapper object is unwrapped first. Returns `None` for
    /// anything that is not an object.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let object = match object.get("data") {
            Some(Value::Object(inner)) => inner,
            _ => object,
        };

        let category = object.get("category").and_then(Value::as_object);
        let field = |key: &str| category.and_then(|c| c.get(key)).and_then(scalar_to_string);

        Some(Self {
            title: object.get("title").and_then(scalar_to_string),
            category_name: field("name"),
            category_id: field("id"),
        })
    }

    /// Whether the document carried none of the routed fields.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.category_name.is_none() && self.category_id.is_none()
    }
}

/// Upstream API failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Request could not be sent or completed.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Response body was not a task document.
    #[error("upstream response unreadable: {0}")]
    Decode(String),

    /// Client could not be configured.
    #[error("upstream client misconfigured: {0}")]
    Configuration(String),
}

/// Upstream Task API.
#[async_trait]
pub trait TaskDetailApi: Send + Sync + fmt::Debug {
    /// Fetches task `task_id` using the tenant's request `headers`.
    ///
    /// Returns `Ok(None)` when the platform has no such task.
    async fn get_task(
        &self,
        task_id: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Option<TaskDetail>, UpstreamError>;
}

/// Task API client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskDetailClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskDetailClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("taskhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Configuration(e.to_string()))?;

        Ok(Self { client, base_url: base_url.into() })
    }

    fn task_url(&self, task_id: &str) -> String {
        format!("{}/tasks/{}", self.base_url.trim_end_matches('/'), task_id)
    }
}

#[async_trait]
impl TaskDetailApi for HttpTaskDetailClient {
    async fn get_task(
        &self,
        task_id: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Option<TaskDetail>, UpstreamError> {
        let url = self.task_url(task_id);
        let span = info_span!("get_task", task_id = %task_id);

        async move {
            let mut request = self.client.get(&url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response =
                request.send().await.map_err(|e| UpstreamError::Transport(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                debug!("Task not found upstream");
                return Ok(None);
            }
            if !status.is_success() {
                return Err(UpstreamError::Status { status: status.as_u16() });
            }

            let body =
                response.bytes().await.map_err(|e| UpstreamError::Transport(e.to_string()))?;
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(None);
            }

            let value: Value =
                serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
            if value.is_null() {
                return Ok(None);
            }

            TaskDetail::from_json(&value)
                .map(Some)
                .ok_or_else(|| UpstreamError::Decode("task document is not an object".into()))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_nested_category() {
        let detail = TaskDetail::from_json(&json!({
            "title": "Move Out",
            "category": {"name": "Automations", "id": 77}
        }))
        .unwrap();

        assert_eq!(detail.title.as_deref(), Some("Move Out"));
        assert_eq!(detail.category_name.as_deref(), Some("Automations"));
        assert_eq!(detail.category_id.as_deref(), Some("77"));
    }

    #[test]
    fn unwraps_data_envelope() {
        let detail = TaskDetail::from_json(&json!({"data": {"title": "Initiation"}})).unwrap();
        assert_eq!(detail.title.as_deref(), Some("Initiation"));
        assert_eq!(detail.category_id, None);
    }

    #[test]
    fn non_object_is_none() {
        assert_eq!(TaskDetail::from_json(&json!([1, 2])), None);
        assert!(TaskDetail::from_json(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn task_url_trims_base() {
        let client =
            HttpTaskDetailClient::new("http://api.local/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.task_url("101"), "http://api.local/v1/tasks/101");
    }
}
