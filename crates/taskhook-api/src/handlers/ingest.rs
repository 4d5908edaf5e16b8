//! Provider webhook intake.
//!
//! Captures the request and offers it to the ingress buffer. The response is
//! 200 with an empty body whatever happens next, so senders never see
//! verification results or backpressure. A body that cannot be read within
//! the configured limit counts as a drop.

use axum::{
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
};
use bytes::Bytes;
use taskhook_core::WebhookEnvelope;
use tracing::{debug, instrument, warn};

use crate::{buffer::Submission, AppState};

/// Accepts a provider webhook.
#[instrument(name = "ingest_webhook", skip_all, fields(body_bytes = tracing::field::Empty))]
pub async fn ingest_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> StatusCode {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let dropped = state.ingress.record_drop();
            warn!(
                limit_bytes = state.max_body_bytes,
                reason = %rejection.body_text(),
                dropped_total = dropped,
                "Webhook body unreadable, dropping webhook"
            );
            return StatusCode::OK;
        },
    };
    tracing::Span::current().record("body_bytes", body.len());

    let envelope = WebhookEnvelope::capture(extract_headers(&headers), body);

    match state.ingress.submit(envelope) {
        Submission::Queued => debug!("Webhook buffered for verification"),
        Submission::Dropped => warn!("Webhook dropped at ingress"),
    }

    StatusCode::OK
}

/// Header pairs with textual values. Values that are not visible ASCII are
/// skipped.
fn extract_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
