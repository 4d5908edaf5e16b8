//! taskhook HTTP API.
//!
//! Serves webhook ingress, the durable-queue callback, and health probes.
//! Ingress never waits on verification: envelopes go through the bounded
//! [`IngressBuffer`] to a background [`IngressConsumer`] that verifies and
//! enqueues them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{sync::Arc, time::Duration};

use taskhook_automation::AutomationProcessor;

pub mod buffer;
pub mod config;
pub mod handlers;
pub mod pipeline;
pub mod server;

pub use buffer::{BufferStats, IngressBuffer, IngressConfig, IngressConsumer, Submission};
pub use config::Config;
pub use pipeline::IngressPipeline;
pub use server::{create_router, shutdown_signal, start_server};

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Producer side of the ingress buffer.
    pub ingress: IngressBuffer,
    /// Processor behind the durable-queue callback.
    pub processor: Arc<AutomationProcessor>,
    /// Provider slug the routes are mounted under.
    pub provider: Arc<str>,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
    /// Largest ingress body captured before the webhook is dropped.
    pub max_body_bytes: usize,
}

impl AppState {
    /// Creates state for `provider` with a 30 second request timeout and a
    /// 10 MiB ingress body limit.
    pub fn new(ingress: IngressBuffer, processor: AutomationProcessor, provider: &str) -> Self {
        Self {
            ingress,
            processor: Arc::new(processor),
            provider: Arc::from(provider),
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Overrides the ingress body limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}
