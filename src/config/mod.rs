//! Configuration models for the engine, classes and backfill.

pub mod engine;

pub use engine::{
    AuthorizationLevel, BackfillConfig, ClassPolicies, ClassPolicy, ClassifierSettings, EngineConfig,
    OperatingHours,
};
