//! Router, middleware stack and server lifecycle.
//!
//! Each request is tagged with a request id, traced, and bounded by the
//! configured request timeout before it reaches a handler.
//!
//! # Graceful Shutdown
//!
//! [`start_server`] stops accepting connections once its cancellation token
//! fires and waits for in-flight requests. [`shutdown_signal`] turns
//! SIGINT/SIGTERM into that cancellation.

use std::net::SocketAddr;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::{handlers, AppState};

const REQUEST_ID: &str = "x-request-id";

/// Builds the router for `state.provider`.
///
/// Ingress is served at `/webhooks/{provider}` and the durable-queue callback
/// at `/tasks/{provider}-webhook`.
///
/// # Example
///
/// ```no_run
/// use taskhook_api::{server::create_router, AppState};
///
/// fn build(state: AppState) {
///     let app = create_router(state);
///     let _ = app;
/// }
/// ```
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check));

    let webhook_routes = Router::new()
        .route(
            &format!("/webhooks/{}", state.provider),
            post(handlers::ingest_webhook).layer(DefaultBodyLimit::max(state.max_body_bytes)),
        )
        // Dispatch payloads carry the body twice, once base64-encoded.
        .route(
            &format!("/tasks/{}-webhook", state.provider),
            post(handlers::process_callback)
                .layer(DefaultBodyLimit::max(state.max_body_bytes.saturating_mul(3))),
        );

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Tags every request and response with an `X-Request-Id`.
///
/// An id supplied by the caller is kept; otherwise a fresh UUID is
/// generated.
async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID)
        .filter(|value| !value.is_empty())
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    let Some(request_id) = request_id else {
        return next.run(req).await;
    };

    req.headers_mut().insert(REQUEST_ID, request_id.clone());
    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID, request_id);
    response
}

/// Starts the HTTP server and serves until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound or the server
/// fails while serving.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Could not listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!(signal = "SIGINT", "Shutting down"),
        () = terminate => info!(signal = "SIGTERM", "Shutting down"),
    }
}
