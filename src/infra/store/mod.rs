//! Entity and outcome store backends.

pub mod memory;

pub use memory::{InMemoryEntityStore, InMemoryOutcomeStore};
