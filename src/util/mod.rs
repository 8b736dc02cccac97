//! Shared utilities.

pub mod clock;
pub mod money;
pub mod telemetry;

pub use clock::*;
pub use money::*;
pub use telemetry::*;
