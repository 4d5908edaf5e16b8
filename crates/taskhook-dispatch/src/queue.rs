//! At-least-once task queue collaborator and its HTTP client.
//!
//! The queue owns redelivery: once a task is created it is retried against
//! the callback until the callback answers 2xx. [`CloudTasksQueue`] speaks the
//! Cloud Tasks v2 REST shape (`POST {base}/{queue_path}/tasks`).

use std::{collections::BTreeMap, fmt, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{DispatchError, Result};

/// Default REST endpoint of the hosted task queue.
pub const DEFAULT_API_BASE_URL: &str = "https://cloudtasks.googleapis.com/v2";

/// Handle of a created task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Fully qualified task name assigned by the queue.
    pub name: String,
}

/// HTTP request the queue delivers for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTarget {
    /// Callback URL, always requested with POST.
    pub url: String,
    /// Headers sent with each delivery.
    pub headers: BTreeMap<String, String>,
}

impl HttpTarget {
    /// Target posting JSON to `url`.
    pub fn json(url: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self { url: url.into(), headers }
    }
}

/// Project / location / queue triple naming a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLocation {
    /// Owning project.
    pub project: String,
    /// Region the queue lives in.
    pub location: String,
    /// Queue name.
    pub queue: String,
}

impl QueueLocation {
    /// `projects/{project}/locations/{location}/queues/{queue}`.
    pub fn path(&self) -> String {
        format!("projects/{}/locations/{}/queues/{}", self.project, self.location, self.queue)
    }
}

impl fmt::Display for QueueLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// External at-least-once task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync + fmt::Debug {
    /// Creates a task that POSTs `body` to `target`.
    async fn create_task(
        &self,
        queue_path: &str,
        target: &HttpTarget,
        body: Bytes,
    ) -> Result<TaskHandle>;
}

/// Settings for [`CloudTasksQueue`].
#[derive(Debug, Clone)]
pub struct CloudTasksConfig {
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// Bearer token attached to queue API calls.
    pub auth_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for CloudTasksConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    task: TaskBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskBody<'a> {
    http_request: HttpRequestBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequestBody<'a> {
    url: &'a str,
    http_method: &'static str,
    headers: &'a BTreeMap<String, String>,
    body: String,
}

/// REST client for a Cloud Tasks style queue.
#[derive(Debug, Clone)]
pub struct CloudTasksQueue {
    client: reqwest::Client,
    config: CloudTasksConfig,
}

impl CloudTasksQueue {
    /// Creates a queue client.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: CloudTasksConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("taskhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DispatchError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    fn tasks_url(&self, queue_path: &str) -> String {
        format!(
            "{}/{}/tasks",
            self.config.base_url.trim_end_matches('/'),
            queue_path.trim_matches('/')
        )
    }
}

#[async_trait]
impl TaskQueue for CloudTasksQueue {
    async fn create_task(
        &self,
        queue_path: &str,
        target: &HttpTarget,
        body: Bytes,
    ) -> Result<TaskHandle> {
        let url = self.tasks_url(queue_path);
        let span = info_span!("create_task", queue = %queue_path, target = %target.url);

        async move {
            let request = CreateTaskRequest {
                task: TaskBody {
                    http_request: HttpRequestBody {
                        url: &target.url,
                        http_method: "POST",
                        headers: &target.headers,
                        body: STANDARD.encode(&body),
                    },
                },
            };

            let mut http_request = self.client.post(&url).json(&request);
            if let Some(token) = &self.config.auth_token {
                http_request = http_request.bearer_auth(token);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Task queue request failed");
                    return Err(DispatchError::unavailable(e.to_string()));
                },
            };

            let status = response.status();
            if status.is_success() {
                let handle = response.json::<TaskHandle>().await.map_err(|e| {
                    DispatchError::serialization(format!("unreadable create-task response: {e}"))
                })?;
                debug!(task = %handle.name, "Task created");
                return Ok(handle);
            }

            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Task queue refused task");

            if status.is_server_error() {
                Err(DispatchError::unavailable(format!("HTTP {}: {body}", status.as_u16())))
            } else {
                Err(DispatchError::Rejected { status: status.as_u16(), body })
            }
        }
        .instrument(span)
        .await
    }
}
