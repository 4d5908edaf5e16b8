//! Durable-queue callback into the automation processor.
//!
//! The queue redelivers on any non-2xx answer, so the status code is the
//! retry contract: 204 when the delivery is finished (processed or skipped),
//! 400 for payloads no redelivery can fix, and 5xx for failures that may
//! succeed later.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use taskhook_automation::ProcessOutcome;
use taskhook_core::TaskhookError;
use taskhook_dispatch::DispatchPayload;
use tracing::{error, info, instrument, warn};

use crate::{handlers::error_response, AppState};

/// Processes one durable-queue delivery.
#[instrument(name = "process_callback", skip(state, body), fields(body_bytes = body.len()))]
pub async fn process_callback(State(state): State<AppState>, body: Bytes) -> Response {
    let payload = match DispatchPayload::from_json_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "Rejecting malformed callback payload");
            return error_response(&TaskhookError::client(err.to_string()));
        },
    };

    if payload.webhook_object().is_none() {
        warn!(tenant_id = %payload.account_id, "Rejecting callback whose webhook is not a mapping");
        return error_response(&TaskhookError::client("webhook must be a JSON object"));
    }

    match state.processor.process(&payload).await {
        Ok(ProcessOutcome::Processed(automation)) => {
            info!(tenant_id = %payload.account_id, %automation, "Callback processed");
            StatusCode::NO_CONTENT.into_response()
        },
        Ok(ProcessOutcome::Skipped(reason)) => {
            info!(tenant_id = %payload.account_id, %reason, "Callback skipped");
            StatusCode::NO_CONTENT.into_response()
        },
        Err(err) => {
            error!(
                tenant_id = %payload.account_id,
                code = err.code(),
                retryable = err.is_retryable(),
                error = %err,
                "Callback processing failed, leaving delivery to the queue's retry policy"
            );
            error_response(&err)
        },
    }
}
