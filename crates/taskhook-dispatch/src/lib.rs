//! Durable redispatch of verified webhooks.
//!
//! A verified webhook is serialized into a [`DispatchPayload`] and handed to an
//! external at-least-once [`TaskQueue`] that POSTs it to the service's own
//! processing callback. Delivery reliability from that point on belongs to the
//! queue.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod queue;

pub use dispatcher::{DispatcherConfig, DurableDispatcher};
pub use error::{DispatchError, Result};
pub use payload::{DispatchPayload, PayloadError};
pub use queue::{
    CloudTasksConfig, CloudTasksQueue, HttpTarget, QueueLocation, TaskHandle, TaskQueue,
};
