//! Redis Streams queue plumbing.
//!
//! This crate provides:
//! - Trigger intake via a Redis Streams consumer group
//! - The `Notifier` capability for completion and failure messages
//! - A Redis implementation publishing to the success and error queues

pub mod error;
pub mod notifier;
pub mod trigger;

pub use error::{QueueError, QueueResult};
pub use notifier::{Notifier, NotifierConfig, RedisNotifier};
pub use trigger::{TriggerMessage, TriggerQueue, TriggerQueueConfig};
