//! Health check handlers for service monitoring.
//!
//! Liveness only proves the process answers HTTP. Readiness and health also
//! require the ingress consumer to be draining the buffer, since webhooks
//! accepted without one would only pile up until dropped.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{buffer::BufferStats, AppState};

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Service version information
    pub version: String,
    /// Ingress buffer counters
    pub ingress: BufferStats,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Consumer running with room in the buffer
    Healthy,
    /// Consumer running but the buffer is full
    Degraded,
    /// No consumer is draining the buffer
    Unhealthy,
}

impl HealthStatus {
    fn from_stats(stats: &BufferStats) -> Self {
        if !stats.consumer_running {
            Self::Unhealthy
        } else if stats.queued >= stats.capacity {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

/// Health check endpoint handler.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let ingress = state.ingress.stats();
    let status = HealthStatus::from_stats(&ingress);

    let status_code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(?status, queued = ingress.queued, dropped = ingress.dropped, "Health check completed");

    let response =
        HealthResponse { status, version: env!("CARGO_PKG_VERSION").to_string(), ingress };
    (status_code, Json(response)).into_response()
}

/// Liveness probe.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.ingress.is_consuming() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(queued: usize, consumer_running: bool) -> BufferStats {
        BufferStats { queued, capacity: 8, accepted: 0, dropped: 0, consumer_running }
    }

    #[test]
    fn status_reflects_consumer_and_fill_level() {
        assert_eq!(HealthStatus::from_stats(&stats(0, true)), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_stats(&stats(8, true)), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_stats(&stats(0, false)), HealthStatus::Unhealthy);
    }
}
