//! Capacity state backends.

pub mod memory;

pub use memory::InMemoryCapacityStore;
