//! Notification sink backends.

pub mod memory;

pub use memory::{InMemoryNotificationSink, TracingNotificationSink};
