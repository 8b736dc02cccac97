//! Builders that assemble the engine from configuration and backends.

pub mod engine_builder;

pub use engine_builder::{Engine, EngineBuilder};
