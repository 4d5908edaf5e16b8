//! Callback-side processing of durably dispatched webhooks.
//!
//! Each delivery runs the same state machine:
//!
//! 1. **Shape guard** - the webhook must be a JSON object.
//! 2. **Extraction** - event type and the embedded task are read into a
//!    [`WebhookEvent`].
//! 3. **Enrichment** - if the task has an id, the upstream task is fetched
//!    once; any failure falls back to the embedded fields.
//! 4. **Routing** - (event kind, normalized task name) is looked up in the
//!    static routing table.
//! 5. **Category gate** - for every automation except initiation, the task's
//!    category id must equal the tenant's automated-tasks category id.
//! 6. **Initiation guard** - initiation runs at most once per tenant.
//! 7. **Dispatch** - the registered handler is invoked.
//!
//! Guard stops are outcomes, not errors: they return
//! [`ProcessOutcome::Skipped`] after logging. Only ledger and handler failures
//! surface as errors, so the queue redelivers.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};
use taskhook_core::{
    metadata::{self, AUTOMATED_TASKS_CATEGORY_KEYS},
    InitiationLedger, Result, TaskhookError, TenantId,
};
use taskhook_dispatch::DispatchPayload;
use tracing::{debug, info, instrument, warn};

use crate::{
    handler::{AutomationRequest, HandlerRegistry},
    routing::{self, Automation, RoutingKey},
    upstream::{TaskDetail, TaskDetailApi},
};

/// Webhook keys holding the event type.
pub const EVENT_TYPE_KEYS: &[&str] = &["eventType", "event_type", "EventType", "event"];

/// Webhook keys holding the embedded task object.
pub const TASK_KEYS: &[&str] = &["task", "Task"];

/// Task keys holding the task id.
pub const TASK_ID_KEYS: &[&str] = &["taskId", "task_id", "TaskId", "id", "Id"];

/// Task keys holding the task name.
pub const TASK_NAME_KEYS: &[&str] = &["taskName", "task_name", "TaskName", "name", "title"];

/// Task keys holding the category name.
pub const TASK_CATEGORY_NAME_KEYS: &[&str] =
    &["taskCategoryName", "task_category_name", "categoryName", "category_name"];

/// Task keys holding the category id.
pub const TASK_CATEGORY_ID_KEYS: &[&str] =
    &["taskCategoryId", "task_category_id", "categoryId", "category_id"];

/// Task fields routing and gating work from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFields {
    /// Upstream task id.
    pub id: Option<String>,
    /// Task name or title.
    pub name: Option<String>,
    /// Category display name.
    pub category_name: Option<String>,
    /// Category id.
    pub category_id: Option<String>,
}

impl TaskFields {
    /// Reads the embedded task object. A nested `category` object is used
    /// when the flat category keys are absent.
    pub fn from_task_object(task: &Map<String, Value>) -> Self {
        let category = task.get("category").and_then(Value::as_object);
        let nested = |key: &str| {
            category.and_then(|c| c.get(key)).and_then(metadata::scalar_to_string)
        };

        Self {
            id: metadata::first_scalar(task, TASK_ID_KEYS),
            name: metadata::first_scalar(task, TASK_NAME_KEYS),
            category_name: metadata::first_scalar(task, TASK_CATEGORY_NAME_KEYS)
                .or_else(|| nested("name")),
            category_id: metadata::first_scalar(task, TASK_CATEGORY_ID_KEYS)
                .or_else(|| nested("id")),
        }
    }

    /// Overlays upstream detail, keeping embedded values the detail lacks.
    #[must_use]
    pub fn enriched_with(self, detail: TaskDetail) -> Self {
        Self {
            id: self.id,
            name: detail.title.or(self.name),
            category_name: detail.category_name.or(self.category_name),
            category_id: detail.category_id.or(self.category_id),
        }
    }
}

/// Typed view of a webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookEvent {
    /// Raw event type, e.g. `TaskCreated`.
    pub event_type: Option<String>,
    /// Embedded task fields.
    pub task: TaskFields,
}

impl WebhookEvent {
    /// Extracts the event type and embedded task from `body`.
    pub fn from_body(body: &Map<String, Value>) -> Self {
        let task = TASK_KEYS
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_object))
            .map(TaskFields::from_task_object)
            .unwrap_or_default();

        Self { event_type: metadata::first_scalar(body, EVENT_TYPE_KEYS), task }
    }
}

/// Why a delivery stopped without invoking a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The webhook body is not a JSON object.
    NotAMapping,
    /// No event type or task name, or no routing-table entry.
    Unrouted,
    /// The tenant has no automated-tasks category configured.
    TenantCategoryMissing,
    /// The task carries no category id.
    TaskCategoryMissing,
    /// The task's category is not the tenant's automated-tasks category.
    CategoryMismatch,
    /// The tenant already completed initiation.
    AlreadyInitiated,
    /// No handler is registered for the routed automation.
    NoHandler,
}

impl SkipReason {
    /// Stable name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAMapping => "not_a_mapping",
            Self::Unrouted => "unrouted",
            Self::TenantCategoryMissing => "tenant_category_missing",
            Self::TaskCategoryMissing => "task_category_missing",
            Self::CategoryMismatch => "category_mismatch",
            Self::AlreadyInitiated => "already_initiated",
            Self::NoHandler => "no_handler",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The handler for this automation ran successfully.
    Processed(Automation),
    /// A guard stopped processing.
    Skipped(SkipReason),
}

/// Routes dispatched webhooks to automation handlers.
#[derive(Debug, Clone)]
pub struct AutomationProcessor {
    handlers: HandlerRegistry,
    tasks: Arc<dyn TaskDetailApi>,
    ledger: Arc<dyn InitiationLedger>,
}

impl AutomationProcessor {
    /// Creates a processor.
    pub fn new(
        handlers: HandlerRegistry,
        tasks: Arc<dyn TaskDetailApi>,
        ledger: Arc<dyn InitiationLedger>,
    ) -> Self {
        Self { handlers, tasks, ledger }
    }

    /// Runs one delivery of `payload` through the state machine.
    ///
    /// Safe to call repeatedly for the same payload: initiation is guarded by
    /// the ledger, and other automations are expected to tolerate redelivery.
    ///
    /// # Errors
    ///
    /// - `Unavailable` if the initiation ledger cannot be read
    /// - the mapped handler error if the handler fails
    #[instrument(
        name = "process_webhook",
        skip_all,
        fields(tenant_id = %payload.account_id, routing_key = tracing::field::Empty)
    )]
    pub async fn process(&self, payload: &DispatchPayload) -> Result<ProcessOutcome> {
        let Some(webhook) = payload.webhook_object() else {
            info!("Webhook payload is not a mapping; nothing to do");
            return Ok(ProcessOutcome::Skipped(SkipReason::NotAMapping));
        };

        let event = WebhookEvent::from_body(webhook);
        let task = self.enrich(event.task, payload).await;

        let key = match (event.event_type.as_deref(), task.name.as_deref()) {
            (Some(event_type), Some(name)) => RoutingKey::parse(event_type, name),
            _ => None,
        };
        let routed = key.and_then(|key| routing::route(&key).map(|automation| (key, automation)));
        let Some((key, automation)) = routed else {
            debug!(event_type = ?event.event_type, task_name = ?task.name, "No automation route");
            return Ok(ProcessOutcome::Skipped(SkipReason::Unrouted));
        };
        tracing::Span::current().record("routing_key", tracing::field::display(&key));

        let tenant_id = TenantId::from(payload.account_id.as_str());

        if automation.is_initiation() {
            let initiated = self.ledger.is_initiated(tenant_id.as_str()).await.map_err(|err| {
                warn!(error = %err, "Initiation ledger unavailable");
                TaskhookError::unavailable(format!("initiation ledger: {err}"))
            })?;
            if initiated {
                info!("Tenant already initiated; skipping");
                return Ok(ProcessOutcome::Skipped(SkipReason::AlreadyInitiated));
            }
        } else if let Some(reason) = category_gate(payload, &task) {
            return Ok(ProcessOutcome::Skipped(reason));
        }

        let Some(handler) = self.handlers.get(automation) else {
            warn!(automation = %automation, "No handler registered for automation");
            return Ok(ProcessOutcome::Skipped(SkipReason::NoHandler));
        };

        let request = AutomationRequest {
            tenant_id: tenant_id.clone(),
            api_headers: payload.api_headers.clone(),
            gl_mapping: payload.gl_mapping.clone(),
            webhook: webhook.clone(),
        };

        handler.handle(&request).await.map_err(|err| {
            warn!(automation = %automation, error = %err, "Automation handler failed");
            TaskhookError::from(err)
        })?;

        if automation.is_initiation() {
            if let Err(err) = self.ledger.mark_initiated(tenant_id.as_str()).await {
                warn!(error = %err, "Failed to record completed initiation");
            }
        }

        info!(automation = %automation, "Automation processed");
        Ok(ProcessOutcome::Processed(automation))
    }

    async fn enrich(&self, task: TaskFields, payload: &DispatchPayload) -> TaskFields {
        let Some(task_id) = task.id.clone() else {
            return task;
        };

        match self.tasks.get_task(&task_id, &payload.api_headers).await {
            Ok(Some(detail)) if !detail.is_empty() => task.enriched_with(detail),
            Ok(_) => {
                debug!(task_id = %task_id, "No upstream task detail; using webhook fields");
                task
            },
            Err(err) => {
                debug!(
                    task_id = %task_id,
                    error = %err,
                    "Task detail fetch failed; using webhook fields"
                );
                task
            },
        }
    }
}

/// Applies the category gate, returning the reason to skip if it fails.
fn category_gate(payload: &DispatchPayload, task: &TaskFields) -> Option<SkipReason> {
    let expected = metadata::first_scalar(&payload.account_context, AUTOMATED_TASKS_CATEGORY_KEYS);
    let Some(expected) = expected else {
        warn!("Tenant has no automated tasks category configured");
        return Some(SkipReason::TenantCategoryMissing);
    };

    let Some(actual) = task.category_id.as_deref() else {
        info!(task_category = ?task.category_name, "Task has no category id");
        return Some(SkipReason::TaskCategoryMissing);
    };

    if actual != expected {
        warn!(
            expected_category = %expected,
            task_category = %actual,
            "Task category is not the automated tasks category"
        );
        return Some(SkipReason::CategoryMismatch);
    }

    None
}
