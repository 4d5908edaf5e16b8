//! Verify-then-dispatch job run for each buffered envelope.

use taskhook_core::{Result, TaskhookError, WebhookEnvelope, WebhookVerifier};
use taskhook_dispatch::{DurableDispatcher, TaskHandle};
use tracing::{error, info, instrument, warn};

/// Authenticates an envelope and hands it to the durable queue.
///
/// Runs after the ingress response has been sent, so every outcome ends here
/// as a log entry.
#[derive(Debug)]
pub struct IngressPipeline {
    verifier: WebhookVerifier,
    dispatcher: DurableDispatcher,
}

impl IngressPipeline {
    /// Creates a pipeline from its two stages.
    pub fn new(verifier: WebhookVerifier, dispatcher: DurableDispatcher) -> Self {
        Self { verifier, dispatcher }
    }

    /// Verifies and enqueues `envelope`.
    ///
    /// # Errors
    ///
    /// Returns the verification error, or the dispatch error mapped into the
    /// taxonomy. Both are also logged here.
    #[instrument(name = "ingress_job", skip_all, fields(body_bytes = envelope.raw_body().len()))]
    pub async fn handle(&self, envelope: WebhookEnvelope) -> Result<TaskHandle> {
        let verified = match self.verifier.verify(envelope).await {
            Ok(verified) => verified,
            Err(err) => {
                log_rejection(&err);
                return Err(err);
            },
        };

        match self.dispatcher.enqueue(&verified).await {
            Ok(handle) => {
                info!(
                    tenant_id = %verified.tenant_id(),
                    scheme = %verified.scheme(),
                    task = %handle.name,
                    "Webhook accepted for durable processing"
                );
                Ok(handle)
            },
            Err(err) => {
                error!(
                    tenant_id = %verified.tenant_id(),
                    error = %err,
                    retryable = err.is_retryable(),
                    "Verified webhook could not be enqueued"
                );
                Err(err.into())
            },
        }
    }
}

fn log_rejection(err: &TaskhookError) {
    if err.is_retryable() || err.status_code() >= 500 {
        error!(
            code = err.code(),
            status = err.status_code(),
            error = %err,
            "Webhook verification failed"
        );
    } else {
        warn!(code = err.code(), status = err.status_code(), error = %err, "Webhook rejected");
    }
}
