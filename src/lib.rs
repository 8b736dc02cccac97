//! # Prometheus Tier Scheduler
//!
//! Priority-tier classification and daily capacity orchestration for
//! outreach workloads.
//!
//! Every entity in a population is placed into one of three classes by
//! expected value and engagement. Each day the engine spends a fixed number
//! of contact attempts, strictly highest class first: a lower class is only
//! touched once every higher class has no eligible supply left.
//!
//! ## Key Features
//!
//! - **Deterministic Classification**: explainable factors, confidence and
//!   expected value for each entity
//! - **Admission Control**: ordered, data-driven rule chain (kill switch,
//!   operating hours, authorization, priority order, stop-loss, budget) with
//!   every decision logged
//! - **Capacity Orchestration**: per-day state machine persisted with
//!   optimistic versioning, reservations for in-flight batches
//! - **Per-Class Metrics**: funnels, revenue and efficiency that are never
//!   blended across classes
//! - **Backfill**: parallel (re)classification of the whole population
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_tier_scheduler::builders::EngineBuilder;
//! use prometheus_tier_scheduler::config::EngineConfig;
//! use prometheus_tier_scheduler::core::BackfillMode;
//! use prometheus_tier_scheduler::util::clock;
//!
//! let engine = EngineBuilder::new(EngineConfig::from_env()?).build()?;
//! engine.backfill.run(BackfillMode::Unclassified, clock::now())?;
//!
//! let batch = engine.orchestrator.get_next_batch(25, clock::now())?;
//! for ticket in &batch.tickets {
//!     // contact ticket.entity, then report back
//!     engine.orchestrator.record_attempt(&ticket.attempt(clock::now()))?;
//! }
//! ```
//!
//! For complete scenarios, see `tests/orchestrator_test.rs`.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Classification, admission, capacity accounting and metrics.
pub mod core;
/// Configuration models for the engine, classes and backfill.
pub mod config;
/// Builders to wire the engine from configuration.
pub mod builders;
/// Infrastructure adapters for entity, outcome, capacity and event backends.
pub mod infra;
/// Runtime adapters (cycle runner, outreach dispatch) and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
