//! Delivery queue — persistent at-least-once outbound delivery.
//!
//! Outbound replies are enqueued into a SQLite table and drained by a
//! single worker. Failures retry with exponential back-off until the
//! attempt budget is spent, after which the message is parked in a
//! dead-letter tier an operator can retry.
//!
//! Delivery is at-least-once: a crash between reserving a message and its
//! terminal transition leaves it Processing; a timed sweep releases such
//! rows back into the retry path.

pub mod message;
pub mod store;
pub mod worker;

pub use message::{DeliveryStatus, EnqueueOptions, QueueStats, QueuedMessage};
pub use store::DeliveryQueue;
pub use worker::DeliveryWorker;
