//! Infrastructure adapters: entity, outcome, capacity and notification
//! backends.

pub mod capacity;
pub mod notify;
pub mod store;

pub use capacity::InMemoryCapacityStore;
pub use notify::{InMemoryNotificationSink, TracingNotificationSink};
pub use store::{InMemoryEntityStore, InMemoryOutcomeStore};
