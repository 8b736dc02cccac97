//! Runtime adapters: periodic cycle runner, outreach dispatch and API surface.

pub mod api;
#[cfg(feature = "tokio-runtime")]
pub mod cycle;
pub mod dispatch;

pub use api::{health, next_batch, report_attempt, AttemptAck, AttemptReport, BatchRequest, BatchResponse, Health};
#[cfg(feature = "tokio-runtime")]
pub use cycle::CycleRunner;
pub use dispatch::{dispatch_batch, DispatchSummary, OutreachExecutor, OutreachOutcome};
