//! Category-gated routing of task webhooks to automation handlers.
//!
//! This crate is the processing side of durable dispatch: it receives
//! [`taskhook_dispatch::DispatchPayload`]s from the task queue callback,
//! enriches the embedded task from the upstream Task API, and invokes the
//! automation the static routing table names for it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod handler;
pub mod processor;
pub mod routing;
pub mod upstream;

pub use handler::{
    AutomationHandler, AutomationRequest, HandlerError, HandlerRegistry, LoggingHandler,
};
pub use processor::{AutomationProcessor, ProcessOutcome, SkipReason, TaskFields, WebhookEvent};
pub use routing::{route, Automation, EventKind, RoutingKey};
pub use upstream::{HttpTaskDetailClient, TaskDetail, TaskDetailApi, UpstreamError};
