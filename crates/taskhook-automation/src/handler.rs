//! Automation handler contract and registry.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use taskhook_core::{TaskhookError, TenantId};
use thiserror::Error;
use tracing::info;

use crate::routing::Automation;

/// Everything a handler receives for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationRequest {
    /// Tenant the webhook belongs to.
    pub tenant_id: TenantId,
    /// Headers for calling the upstream API as this tenant.
    pub api_headers: BTreeMap<String, String>,
    /// Tenant-specific ledger mapping.
    pub gl_mapping: Value,
    /// Original webhook body.
    pub webhook: Map<String, Value>,
}

/// Failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// A dependency was temporarily unreachable; redelivery may succeed.
    #[error("transient handler failure: {0}")]
    Transient(String),

    /// The workflow cannot complete for this input.
    #[error("handler failed: {0}")]
    Failed(String),
}

impl From<HandlerError> for TaskhookError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Transient(message) => Self::unavailable(message),
            HandlerError::Failed(message) => Self::internal(message),
        }
    }
}

/// One automated workflow.
#[async_trait]
pub trait AutomationHandler: Send + Sync + fmt::Debug {
    /// Runs the workflow for `request`.
    async fn handle(&self, request: &AutomationRequest) -> Result<(), HandlerError>;
}

/// Maps each [`Automation`] to the handler implementing it.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Automation, Arc<dyn AutomationHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with `handler` registered for every automation.
    pub fn uniform(handler: Arc<dyn AutomationHandler>) -> Self {
        let mut registry = Self::new();
        for automation in Automation::ALL {
            registry.register(automation, Arc::clone(&handler));
        }
        registry
    }

    /// Registers `handler` for `automation`, replacing any previous one.
    pub fn register(&mut self, automation: Automation, handler: Arc<dyn AutomationHandler>) {
        self.handlers.insert(automation, handler);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, automation: Automation, handler: Arc<dyn AutomationHandler>) -> Self {
        self.register(automation, handler);
        self
    }

    /// Handler registered for `automation`.
    pub fn get(&self, automation: Automation) -> Option<&Arc<dyn AutomationHandler>> {
        self.handlers.get(&automation)
    }

    /// Number of registered automations.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no automation has a handler.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Handler that only records the invocation in the log.
///
/// Registered by the service binary for every automation until a concrete
/// workflow is plugged in.
#[derive(Debug, Clone)]
pub struct LoggingHandler {
    automation: Automation,
}

impl LoggingHandler {
    /// Creates a handler logging invocations of `automation`.
    pub fn new(automation: Automation) -> Self {
        Self { automation }
    }

    /// Registry with a logging handler for every automation.
    pub fn registry() -> HandlerRegistry {
        Automation::ALL.into_iter().fold(HandlerRegistry::new(), |registry, automation| {
            registry.with(automation, Arc::new(Self::new(automation)))
        })
    }
}

#[async_trait]
impl AutomationHandler for LoggingHandler {
    async fn handle(&self, request: &AutomationRequest) -> Result<(), HandlerError> {
        info!(
            automation = %self.automation,
            tenant_id = %request.tenant_id,
            webhook_keys = request.webhook.len(),
            "Automation invoked"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_registry_covers_every_automation() {
        let registry = LoggingHandler::registry();

        assert_eq!(registry.len(), Automation::ALL.len());
        for automation in Automation::ALL {
            assert!(registry.get(automation).is_some());
        }
    }

    #[test]
    fn register_replaces() {
        let registry = HandlerRegistry::new()
            .with(Automation::MoveOut, Arc::new(LoggingHandler::new(Automation::MoveOut)))
            .with(Automation::MoveOut, Arc::new(LoggingHandler::new(Automation::UtilityBill)));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(Automation::Initiation).is_none());
    }

    #[test]
    fn handler_errors_map_into_taxonomy() {
        let err: TaskhookError = HandlerError::Transient("api down".into()).into();
        assert_eq!(err.status_code(), 503);

        let err: TaskhookError = HandlerError::Failed("bad mapping".into()).into();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn logging_handler_succeeds() {
        let handler = LoggingHandler::new(Automation::Initiation);
        let request = AutomationRequest {
            tenant_id: TenantId::from("acct-1"),
            api_headers: BTreeMap::new(),
            gl_mapping: Value::Object(Map::new()),
            webhook: Map::new(),
        };

        assert_eq!(handler.handle(&request).await, Ok(()));
    }
}
