//! Recording doubles for the task queue, Task API and automation handlers.

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use taskhook_automation::{
    AutomationHandler, AutomationRequest, HandlerError, TaskDetail, TaskDetailApi, UpstreamError,
};
use taskhook_dispatch::{DispatchError, DispatchPayload, HttpTarget, TaskHandle, TaskQueue};
use tokio::sync::RwLock;

/// A task captured by [`RecordingTaskQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedTask {
    /// Queue path the task was created in.
    pub queue_path: String,
    /// Delivery target.
    pub target: HttpTarget,
    /// Request body the queue would deliver.
    pub body: Bytes,
}

impl CreatedTask {
    /// Decodes the body as a dispatch payload.
    ///
    /// # Panics
    ///
    /// Panics if the body is not a valid payload.
    #[allow(clippy::expect_used)]
    pub fn payload(&self) -> DispatchPayload {
        DispatchPayload::from_json_slice(&self.body).expect("recorded task body is a payload")
    }
}

/// Task queue that records created tasks instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingTaskQueue {
    tasks: RwLock<Vec<CreatedTask>>,
    failure: RwLock<Option<DispatchError>>,
}

impl RecordingTaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent submission fail with `error`, or succeed again
    /// with `None`.
    pub async fn fail_with(&self, error: Option<DispatchError>) {
        *self.failure.write().await = error;
    }

    /// Tasks created so far, in submission order.
    pub async fn tasks(&self) -> Vec<CreatedTask> {
        self.tasks.read().await.clone()
    }

    /// Number of tasks created so far.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether no task was created.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskQueue for RecordingTaskQueue {
    async fn create_task(
        &self,
        queue_path: &str,
        target: &HttpTarget,
        body: Bytes,
    ) -> Result<TaskHandle, DispatchError> {
        if let Some(error) = self.failure.read().await.clone() {
            return Err(error);
        }

        let mut tasks = self.tasks.write().await;
        tasks.push(CreatedTask {
            queue_path: queue_path.to_string(),
            target: target.clone(),
            body,
        });
        Ok(TaskHandle { name: format!("{queue_path}/tasks/{}", tasks.len()) })
    }
}

/// Task API serving canned answers per task id.
///
/// Unknown ids answer `Ok(None)`.
#[derive(Debug, Default)]
pub struct StaticTaskDetailApi {
    answers: RwLock<HashMap<String, Result<Option<TaskDetail>, UpstreamError>>>,
    calls: AtomicUsize,
}

impl StaticTaskDetailApi {
    /// Creates an API that knows no tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `detail` for `task_id`.
    pub async fn insert(&self, task_id: &str, detail: TaskDetail) {
        self.answers.write().await.insert(task_id.to_string(), Ok(Some(detail)));
    }

    /// Fails lookups of `task_id` with `error`.
    pub async fn fail(&self, task_id: &str, error: UpstreamError) {
        self.answers.write().await.insert(task_id.to_string(), Err(error));
    }

    /// Number of lookups served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskDetailApi for StaticTaskDetailApi {
    async fn get_task(
        &self,
        task_id: &str,
        _headers: &BTreeMap<String, String>,
    ) -> Result<Option<TaskDetail>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.read().await.get(task_id).cloned().unwrap_or(Ok(None))
    }
}

/// Handler that records every invocation.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    invocations: RwLock<Vec<AutomationRequest>>,
    failure: RwLock<Option<HandlerError>>,
}

impl RecordingHandler {
    /// Creates a handler that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent invocation fail with `error` after recording
    /// it, or succeed again with `None`.
    pub async fn fail_with(&self, error: Option<HandlerError>) {
        *self.failure.write().await = error;
    }

    /// Requests received so far.
    pub async fn invocations(&self) -> Vec<AutomationRequest> {
        self.invocations.read().await.clone()
    }

    /// Number of invocations so far.
    pub async fn count(&self) -> usize {
        self.invocations.read().await.len()
    }
}

#[async_trait]
impl AutomationHandler for RecordingHandler {
    async fn handle(&self, request: &AutomationRequest) -> Result<(), HandlerError> {
        self.invocations.write().await.push(request.clone());
        match self.failure.read().await.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
