//! Periodic reconciliation driven by a tokio interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::error::EngineError;
use crate::core::orchestrator::{CapacityOrchestrator, UtilizationReport};
use crate::util::clock;

/// Tries per tick for transient failures.
const MAX_TRIES: u32 = 3;

/// Runs [`CapacityOrchestrator::run_cycle`] on a fixed interval.
///
/// Transient store failures are retried with exponential backoff; anything
/// still failing is logged and left to the next tick.
pub struct CycleRunner {
    orchestrator: CapacityOrchestrator,
    interval: Duration,
    backoff: Duration,
    now: fn() -> DateTime<Utc>,
}

impl CycleRunner {
    /// Runner using the configured cycle interval.
    pub fn new(orchestrator: CapacityOrchestrator) -> Self {
        let interval = Duration::from_secs(orchestrator.config().cycle_interval_secs);
        Self {
            orchestrator,
            interval,
            backoff: Duration::from_millis(500),
            now: clock::now,
        }
    }

    /// Override the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the first retry delay; later retries double it.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the clock.
    #[must_use]
    pub const fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Tick interval.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle, retrying transient failures.
    pub async fn run_once(&self) -> Result<UtilizationReport, EngineError> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.orchestrator.run_cycle((self.now)()) {
                Ok(report) => return Ok(report),
                Err(e) if e.is_transient() && attempt < MAX_TRIES => {
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis(), "cycle failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Spawn the loop. It stops when `shutdown` turns true or its sender is
    /// dropped, and returns the number of ticks run.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        tracing::info!(interval_secs = self.interval.as_secs(), "cycle runner started");
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0;
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    ticks += 1;
                    match self.run_once().await {
                        Ok(report) => tracing::debug!(
                            state = %report.state,
                            used = report.used,
                            recommendation = %report.recommendation,
                            "tick complete"
                        ),
                        Err(e) => tracing::error!(error = %e, "cycle failed, deferring to next tick"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(ticks, "cycle runner stopped");
        ticks
    }
}
