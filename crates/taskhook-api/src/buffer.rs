//! Bounded in-process ingress buffer and its consumer.
//!
//! The HTTP handler only ever calls [`IngressBuffer::submit`], which never
//! waits: a full buffer drops the envelope and logs it. The
//! [`IngressConsumer`] drains the buffer on a background task and runs up to
//! `workers` verify-and-dispatch jobs at a time.
//!
//! The buffer is per process and invisible to other instances. Delivery is
//! only guaranteed once the durable queue has accepted a webhook; envelopes
//! still buffered when the process dies are lost.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Serialize;
use taskhook_core::WebhookEnvelope;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        Semaphore,
    },
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pipeline::IngressPipeline;

/// Sizing of the ingress buffer and its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressConfig {
    /// Maximum number of envelopes waiting for verification.
    pub capacity: usize,
    /// Maximum number of concurrent verify-and-dispatch jobs.
    pub workers: usize,
    /// How long shutdown waits for queued and in-flight envelopes.
    pub shutdown_timeout: Duration,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self { capacity: 1024, workers: 2, shutdown_timeout: Duration::from_secs(30) }
    }
}

/// Result of offering an envelope to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The envelope is waiting for the consumer.
    Queued,
    /// The buffer was full or closed and the envelope was discarded.
    Dropped,
}

/// Point-in-time counters of the ingress buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// Envelopes currently waiting.
    pub queued: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Envelopes accepted since startup.
    pub accepted: u64,
    /// Envelopes dropped since startup.
    pub dropped: u64,
    /// Whether a consumer is draining the buffer.
    pub consumer_running: bool,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
    consumer_running: AtomicBool,
}

/// Producer side of the ingress buffer, shared with the HTTP handlers.
#[derive(Debug, Clone)]
pub struct IngressBuffer {
    sender: mpsc::Sender<WebhookEnvelope>,
    counters: Arc<Counters>,
}

/// Consumer side of the ingress buffer, handed to [`IngressConsumer`].
#[derive(Debug)]
pub struct IngressQueue {
    receiver: mpsc::Receiver<WebhookEnvelope>,
    counters: Arc<Counters>,
}

impl IngressBuffer {
    /// Creates a buffer holding at most `capacity` envelopes.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> (Self, IngressQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());

        (Self { sender, counters: counters.clone() }, IngressQueue { receiver, counters })
    }

    /// Offers `envelope` without waiting.
    pub fn submit(&self, envelope: WebhookEnvelope) -> Submission {
        match self.sender.try_send(envelope) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                Submission::Queued
            },
            Err(TrySendError::Full(envelope)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    capacity = self.sender.max_capacity(),
                    body_bytes = envelope.raw_body().len(),
                    dropped_total = dropped,
                    "Ingress buffer full, dropping webhook"
                );
                Submission::Dropped
            },
            Err(TrySendError::Closed(envelope)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    body_bytes = envelope.raw_body().len(),
                    dropped_total = dropped,
                    "Ingress buffer closed, dropping webhook"
                );
                Submission::Dropped
            },
        }
    }

    /// Counts a webhook discarded before it could be captured, such as an
    /// oversized body. Returns the new drop total.
    pub fn record_drop(&self) -> u64 {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current counters.
    pub fn stats(&self) -> BufferStats {
        let capacity = self.sender.max_capacity();
        BufferStats {
            queued: capacity - self.sender.capacity(),
            capacity,
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            consumer_running: self.counters.consumer_running.load(Ordering::Acquire),
        }
    }

    /// Whether a consumer is currently draining the buffer.
    pub fn is_consuming(&self) -> bool {
        self.counters.consumer_running.load(Ordering::Acquire)
    }
}

/// Drains an [`IngressQueue`] through an [`IngressPipeline`].
pub struct IngressConsumer {
    queue: IngressQueue,
    pipeline: Arc<IngressPipeline>,
    permits: Arc<Semaphore>,
    shutdown_timeout: Duration,
}

impl IngressConsumer {
    /// Creates a consumer running at most `config.workers` jobs at a time.
    pub fn new(
        queue: IngressQueue,
        pipeline: Arc<IngressPipeline>,
        config: &IngressConfig,
    ) -> Self {
        Self {
            queue,
            pipeline,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Spawns [`IngressConsumer::run`] on the runtime.
    ///
    /// The buffer reports a running consumer from this call on, so readiness
    /// does not depend on when the task is first polled.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        self.queue.counters.consumer_running.store(true, Ordering::Release);
        tokio::spawn(self.run(shutdown))
    }

    /// Processes envelopes until `shutdown` is cancelled or every producer
    /// is gone, then drains what is already buffered.
    ///
    /// The drain and the in-flight jobs share one `shutdown_timeout`; jobs
    /// still running after it are aborted.
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.queue.counters.consumer_running.store(true, Ordering::Release);
        info!(
            workers = self.permits.available_permits(),
            capacity = self.queue.receiver.max_capacity(),
            "Ingress consumer started"
        );

        let mut jobs = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Ingress consumer received shutdown signal");
                    break;
                },
                next = self.queue.receiver.recv() => match next {
                    Some(envelope) => self.start_job(&mut jobs, envelope).await,
                    None => {
                        debug!("All ingress producers dropped");
                        break;
                    },
                },
            }

            while let Some(finished) = jobs.try_join_next() {
                log_join_failure(finished);
            }
        }

        self.queue.counters.consumer_running.store(false, Ordering::Release);
        self.queue.receiver.close();

        let pending = self.queue.receiver.len();
        info!(
            pending,
            in_flight = jobs.len(),
            timeout_seconds = self.shutdown_timeout.as_secs(),
            "Draining ingress buffer"
        );

        let timeout = self.shutdown_timeout;
        let drain = async {
            while let Ok(envelope) = self.queue.receiver.try_recv() {
                self.start_job(&mut jobs, envelope).await;
            }
            while let Some(finished) = jobs.join_next().await {
                log_join_failure(finished);
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                abandoned = jobs.len() + self.queue.receiver.len(),
                "Ingress drain timed out, abandoning remaining webhooks"
            );
            jobs.abort_all();
        }

        info!("Ingress consumer stopped");
    }

    /// Waits for a free worker slot, then spawns the job for `envelope`.
    async fn start_job(&self, jobs: &mut JoinSet<()>, envelope: WebhookEnvelope) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            error!("Ingress worker semaphore closed, dropping webhook");
            return;
        };

        let pipeline = self.pipeline.clone();
        jobs.spawn(async move {
            // Outcome is logged by the pipeline.
            let _ = pipeline.handle(envelope).await;
            drop(permit);
        });
    }
}

fn log_join_failure(result: Result<(), tokio::task::JoinError>) {
    if let Err(join_error) = result {
        if join_error.is_panic() {
            error!(error = %join_error, "Ingress job panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn envelope(n: usize) -> WebhookEnvelope {
        let body = Bytes::from(format!("{{\"n\":{n}}}"));
        WebhookEnvelope::capture(Vec::<(String, String)>::new(), body)
    }

    #[test]
    fn overflow_drops_exactly_the_excess() {
        let capacity = 4;
        let (buffer, _queue) = IngressBuffer::new(capacity);

        let outcomes: Vec<_> = (0..=capacity).map(|n| buffer.submit(envelope(n))).collect();

        assert_eq!(outcomes.iter().filter(|o| **o == Submission::Queued).count(), capacity);
        assert_eq!(outcomes[capacity], Submission::Dropped);

        let stats = buffer.stats();
        assert_eq!(stats.queued, capacity);
        assert_eq!(stats.accepted, capacity as u64);
        assert_eq!(stats.dropped, 1);
        assert!(!stats.consumer_running);
    }

    #[test]
    fn uncaptured_drops_are_counted() {
        let (buffer, _queue) = IngressBuffer::new(2);

        assert_eq!(buffer.record_drop(), 1);
        assert_eq!(buffer.record_drop(), 2);

        let stats = buffer.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.accepted, 0);
    }

    #[test]
    fn closed_buffer_drops() {
        let (buffer, queue) = IngressBuffer::new(2);
        drop(queue);

        assert_eq!(buffer.submit(envelope(0)), Submission::Dropped);
        assert_eq!(buffer.stats().dropped, 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let (buffer, _queue) = IngressBuffer::new(0);

        assert_eq!(buffer.submit(envelope(0)), Submission::Queued);
        assert_eq!(buffer.submit(envelope(1)), Submission::Dropped);
        assert_eq!(buffer.stats().capacity, 1);
    }
}
