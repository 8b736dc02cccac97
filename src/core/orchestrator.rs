//! Capacity orchestrator: hands out batches, records attempts and runs the
//! reconciliation cycle.
//!
//! All per-day state lives in the [`CapacityStore`]. Each operation loads
//! the day's record, mutates a local copy and writes it back with a version
//! check, retrying once on conflict. Nothing is cached between calls, so any
//! number of orchestrators may share the same stores.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::core::admission::{AdmissionContext, AdmissionController};
use crate::core::audit::PolicyDecision;
use crate::core::capacity::{AttemptApplied, CapacityState, CapacityStore, Reservation, Transition};
use crate::core::error::EngineError;
use crate::core::intent::{classify_reply, ReplyIntent};
use crate::core::metrics::ClassMetricsAggregator;
use crate::core::notify::{deliver, EngineEvent, NotificationSink};
use crate::core::store::{EntityFilter, EntityStore, OutcomeStore};
use crate::core::types::{ContactAttempt, Entity, EntityId, EntityStatus, OutcomeEvent, OutcomeKind, PriorityClass};
use crate::util::clock;

/// One entity issued to the outreach executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTicket {
    /// Ticket id; reused as the attempt id when the attempt is reported.
    pub ticket_id: Uuid,
    /// Entity to contact.
    pub entity: Entity,
    /// Class it was issued under.
    pub class: PriorityClass,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
}

impl BatchTicket {
    /// The attempt to report once contact has been made.
    pub fn attempt(&self, at: DateTime<Utc>) -> ContactAttempt {
        ContactAttempt {
            attempt_id: self.ticket_id,
            entity_id: self.entity.id,
            class: self.class,
            at,
        }
    }
}

/// Result of [`CapacityOrchestrator::get_next_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Day the batch was issued against.
    pub day: NaiveDate,
    /// Issued tickets, highest class first, rank order within a class.
    pub tickets: Vec<BatchTicket>,
    /// Admission decisions taken while building the batch.
    pub decisions: Vec<PolicyDecision>,
    /// True when a concurrency conflict cut the batch short.
    pub deferred: bool,
    /// Why the batch is short, if it is.
    pub note: Option<String>,
}

impl Batch {
    fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            tickets: Vec::new(),
            decisions: Vec::new(),
            deferred: false,
            note: None,
        }
    }

    /// Number of tickets.
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Whether nothing was issued.
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Issued entity ids in order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.tickets.iter().map(|t| t.entity.id).collect()
    }
}

/// Outcome of [`CapacityOrchestrator::record_attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// How the attempt was applied.
    pub applied: AttemptApplied,
    /// Attempts used today after the write.
    pub used: u32,
    /// `max(0, target - used)` after the write.
    pub remaining: u32,
    /// Active-class change triggered by the attempt.
    pub transition: Option<Transition>,
}

/// Operator guidance produced by the reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "class", rename_all = "snake_case")]
pub enum Recommendation {
    /// Daily target reached.
    CapacityExhausted,
    /// Nothing may be issued until the window opens.
    OutsideOperatingHours,
    /// No class has eligible entities.
    NoEligibleSupply,
    /// Top class has supply; keep working it.
    FocusOnTopClass,
    /// Top class is exhausted; fill remaining capacity from this class.
    FillWithNextClass(PriorityClass),
    /// Projection falls short of the utilization target.
    BehindPace,
    /// Projection meets the utilization target.
    OnTrack,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExhausted => f.write_str("capacity exhausted"),
            Self::OutsideOperatingHours => f.write_str("outside operating hours"),
            Self::NoEligibleSupply => f.write_str("no eligible entities in any class"),
            Self::FocusOnTopClass => f.write_str("focus on top class"),
            Self::FillWithNextClass(class) => write!(f, "fill with next class ({class})"),
            Self::BehindPace => f.write_str("behind pace: increase top-class throughput"),
            Self::OnTrack => f.write_str("on track"),
        }
    }
}

/// Snapshot produced by [`CapacityOrchestrator::run_cycle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    /// Day reported.
    pub day: NaiveDate,
    /// State-machine label, e.g. `A_ACTIVE`.
    pub state: String,
    /// Attempts used.
    pub used: u32,
    /// Outstanding reservations.
    pub reserved: u32,
    /// Daily target.
    pub target: u32,
    /// `max(0, target - used)`.
    pub remaining: u32,
    /// `used / target`, percent.
    pub utilization_pct: f64,
    /// Linear projection of `used` to the end of operating hours.
    pub projected_used: u32,
    /// Projection as a percent of target.
    pub projected_utilization_pct: f64,
    /// Remaining supply per class.
    pub remaining_by_class: BTreeMap<PriorityClass, u32>,
    /// Attempts per class today.
    pub contacted_by_class: BTreeMap<PriorityClass, u32>,
    /// Current halt reason.
    pub halted_reason: Option<String>,
    /// Reservations expired this cycle.
    pub expired_reservations: usize,
    /// Operator guidance.
    pub recommendation: Recommendation,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(whole) * 100.0
    }
}

/// Linear projection of `used` from `elapsed` to `span` hours, capped at
/// the target.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn project(used: u32, target: u32, elapsed: f64, span: f64) -> u32 {
    if elapsed <= 0.0 {
        return used;
    }
    (f64::from(used) * span / elapsed).round().min(f64::from(target)) as u32
}

/// Owns the per-day capacity state machine.
#[derive(Clone)]
pub struct CapacityOrchestrator {
    config: EngineConfig,
    entities: Arc<dyn EntityStore>,
    outcomes: Arc<dyn OutcomeStore>,
    capacity: Arc<dyn CapacityStore>,
    admission: AdmissionController,
    metrics: ClassMetricsAggregator,
    notifier: Arc<dyn NotificationSink>,
}

impl CapacityOrchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        config: EngineConfig,
        entities: Arc<dyn EntityStore>,
        outcomes: Arc<dyn OutcomeStore>,
        capacity: Arc<dyn CapacityStore>,
        admission: AdmissionController,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let metrics = ClassMetricsAggregator::new(Arc::clone(&entities), Arc::clone(&outcomes));
        Self {
            config,
            entities,
            outcomes,
            capacity,
            admission,
            metrics,
            notifier,
        }
    }

    /// Configuration in effect.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Metrics aggregator over the same stores.
    pub const fn metrics(&self) -> &ClassMetricsAggregator {
        &self.metrics
    }

    /// Admission controller.
    pub const fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Local calendar day of `at`.
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        clock::local_day(at, self.config.operating_hours.utc_offset_minutes)
    }

    /// Current state for the day of `now` without writing anything.
    pub fn state(&self, now: DateTime<Utc>) -> Result<CapacityState, EngineError> {
        let day = self.day_of(now);
        Ok(self
            .capacity
            .load(day)?
            .unwrap_or_else(|| CapacityState::new(day, self.config.daily_capacity_target, now)))
    }

    fn load_or_create(&self, day: NaiveDate, now: DateTime<Utc>) -> Result<CapacityState, EngineError> {
        match self.capacity.load(day)? {
            Some(state) => Ok(state),
            None => {
                tracing::info!(%day, daily_target = self.config.daily_capacity_target, "opening capacity day");
                self.capacity
                    .get_or_insert(CapacityState::new(day, self.config.daily_capacity_target, now))
            }
        }
    }

    /// Load, mutate and compare-and-swap the day's state, retrying once
    /// against a fresh read on conflict.
    fn with_state<T>(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
        mut apply: impl FnMut(&mut CapacityState) -> Result<T, EngineError>,
    ) -> Result<(T, CapacityState), EngineError> {
        let mut retried = false;
        loop {
            let mut state = self.load_or_create(day, now)?;
            let out = apply(&mut state)?;
            match self.capacity.compare_and_swap(state) {
                Ok(stored) => return Ok((out, stored)),
                Err(EngineError::ConcurrencyConflict(msg)) if !retried => {
                    tracing::warn!(%day, reason = %msg, "capacity state conflict, retrying");
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Recount eligible supply per class and run the state machine.
    fn refresh(&self, state: &mut CapacityState, now: DateTime<Utc>) -> Result<Option<Transition>, EngineError> {
        let reserved = state.reserved_entities();
        let mut remaining = BTreeMap::new();
        for class in PriorityClass::ALL {
            let filter = EntityFilter::eligible(now, self.config.policy(class)).excluding(reserved.iter().copied());
            let count = self.entities.count_by_class(class, &filter)?;
            remaining.insert(class, u32::try_from(count).unwrap_or(u32::MAX));
        }
        Ok(state.reconcile(&remaining, now))
    }

    fn announce(&self, day: NaiveDate, transition: &Transition) {
        match transition {
            Transition::Advanced { from, to } => {
                tracing::info!(%day, %from, %to, "active class advanced");
                deliver(self.notifier.as_ref(), &EngineEvent::ClassActivated { class: *to });
            }
            Transition::ForcedReturn { from, to, reason } => {
                tracing::warn!(%day, class = %from, %reason, "class halted");
                deliver(
                    self.notifier.as_ref(),
                    &EngineEvent::ClassHalted { class: *from, reason: reason.clone() },
                );
                deliver(self.notifier.as_ref(), &EngineEvent::ClassActivated { class: *to });
            }
        }
    }

    /// Issue up to `count` entities, highest admitted class first.
    ///
    /// A class is scanned only when every higher class has no remaining
    /// eligible supply as of this call's refresh. Issued entities hold a
    /// reservation until the attempt is recorded, released or expired.
    ///
    /// Admission decisions are logged only for the plan that was stored, so
    /// a retried or deferred plan leaves no audit record. If the log write
    /// fails the error is returned and the batch's reservations lapse with
    /// the reservation timeout.
    pub fn get_next_batch(&self, count: u32, now: DateTime<Utc>) -> Result<Batch, EngineError> {
        let day = self.day_of(now);
        match self.with_state(day, now, |state| self.plan(state, count, now)) {
            Ok(((batch, transition), stored)) => {
                self.admission.record(&batch.decisions)?;
                if let Some(t) = &transition {
                    self.announce(day, t);
                }
                tracing::info!(
                    %day,
                    issued = batch.len(),
                    requested = count,
                    used = stored.used,
                    reserved = stored.reserved(),
                    "batch issued"
                );
                Ok(batch)
            }
            Err(EngineError::ConcurrencyConflict(msg)) => {
                tracing::warn!(%day, reason = %msg, "batch deferred to next tick");
                let mut batch = Batch::empty(day);
                batch.deferred = true;
                batch.note = Some(format!("deferred after repeated conflict: {msg}"));
                Ok(batch)
            }
            Err(e) => Err(e),
        }
    }

    fn plan(
        &self,
        state: &mut CapacityState,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<(Batch, Option<Transition>), EngineError> {
        let transition = self.refresh(state, now)?;
        let mut batch = Batch::empty(state.day);
        if state.remaining() == 0 {
            batch.note = Some("capacity exhausted".into());
            return Ok((batch, transition));
        }
        let mut budget = count.min(state.available());
        if budget == 0 {
            let note = if count == 0 { "nothing requested" } else { "remaining capacity is reserved" };
            batch.note = Some(note.to_string());
            return Ok((batch, transition));
        }

        let supply = state.remaining_by_class();
        for class in PriorityClass::ALL {
            if budget == 0 {
                break;
            }
            if let Some(higher) = class.higher().find(|h| supply.get(h).copied().unwrap_or(0) > 0) {
                batch.note.get_or_insert_with(|| {
                    format!("{class} blocked: {higher} has {} remaining", supply.get(&higher).copied().unwrap_or(0))
                });
                break;
            }
            if supply.get(&class).copied().unwrap_or(0) == 0 {
                continue;
            }

            let safety = self
                .metrics
                .safety_signals(class, now, self.config.stop_loss_window_days)
                .map_err(|e| {
                    tracing::warn!(%class, error = %e, "safety metrics unavailable");
                    e.to_string()
                });
            let ctx = AdmissionContext {
                class,
                day: state.day,
                now,
                requested: budget,
                config: &self.config,
                capacity: &*state,
                remaining_by_class: &supply,
                safety,
            };
            let decision = self.admission.decide(&ctx);
            let (approved, max_leads) = (decision.approved, decision.max_leads);
            if !approved {
                batch.note.get_or_insert_with(|| decision.reason.clone());
            }
            batch.decisions.push(decision);
            if !approved || max_leads == 0 {
                continue;
            }

            let filter = EntityFilter::eligible(now, self.config.policy(class))
                .excluding(state.reserved_entities())
                .limit(usize::try_from(max_leads).unwrap_or(usize::MAX));
            for entity in self.entities.fetch_by_class(class, &filter)? {
                let ticket_id = Uuid::new_v4();
                state.reserve(Reservation {
                    ticket_id,
                    entity_id: entity.id,
                    class,
                    issued_at: now,
                })?;
                batch.tickets.push(BatchTicket { ticket_id, entity, class, issued_at: now });
                budget -= 1;
            }
        }

        ensure_priority_order(&batch.tickets, &supply)?;
        Ok((batch, transition))
    }

    /// Record a contact attempt reported by the executor.
    ///
    /// Repeating the same `attempt_id` is a no-op on the counters. Fails
    /// with [`EngineError::CapacityExhausted`] rather than exceed the target.
    pub fn record_attempt(&self, attempt: &ContactAttempt) -> Result<AttemptRecord, EngineError> {
        if self.entities.get(attempt.entity_id)?.is_none() {
            return Err(EngineError::UnknownEntity(attempt.entity_id));
        }
        let day = self.day_of(attempt.at);
        let ((applied, transition), stored) = self.with_state(day, attempt.at, |state| {
            let applied = state.apply_attempt(attempt)?;
            let exhausted_active =
                state.active_class == attempt.class && state.counters(attempt.class).remaining == 0;
            let transition = if exhausted_active && applied != AttemptApplied::Duplicate {
                let supply = state.remaining_by_class();
                state.reconcile(&supply, attempt.at)
            } else {
                None
            };
            Ok((applied, transition))
        })?;

        if applied == AttemptApplied::Duplicate {
            tracing::debug!(entity_id = attempt.entity_id, attempt_id = %attempt.attempt_id, "duplicate attempt ignored");
        } else {
            self.entities.update_attempt(attempt.entity_id, attempt.at)?;
            self.outcomes.append(OutcomeEvent {
                entity_id: attempt.entity_id,
                class: attempt.class,
                kind: OutcomeKind::Contacted,
                at: attempt.at,
            })?;
            tracing::debug!(
                entity_id = attempt.entity_id,
                class = %attempt.class,
                used = stored.used,
                daily_target = stored.daily_target,
                "attempt recorded"
            );
        }
        if let Some(t) = &transition {
            self.announce(day, t);
        }
        if applied != AttemptApplied::Duplicate && stored.remaining() == 0 {
            tracing::info!(%day, used = stored.used, "daily capacity exhausted");
            deliver(self.notifier.as_ref(), &EngineEvent::CapacityExhausted { day });
        }
        Ok(AttemptRecord {
            applied,
            used: stored.used,
            remaining: stored.remaining(),
            transition,
        })
    }

    /// Release an issued ticket that will not be attempted.
    pub fn release(&self, ticket_id: Uuid, now: DateTime<Utc>) -> Result<bool, EngineError> {
        let day = self.day_of(now);
        let (released, _) = self.with_state(day, now, |state| Ok(state.release(ticket_id)))?;
        if let Some(r) = &released {
            tracing::debug!(%day, entity_id = r.entity_id, class = %r.class, "reservation released");
        }
        Ok(released.is_some())
    }

    /// Record a reply: classify its intent, log the outcome and move the
    /// entity out of the outreach pool.
    pub fn record_reply(&self, entity_id: EntityId, body: &str, at: DateTime<Utc>) -> Result<ReplyIntent, EngineError> {
        let entity = self.entities.get(entity_id)?.ok_or(EngineError::UnknownEntity(entity_id))?;
        let class = entity.class().ok_or_else(|| EngineError::Validation {
            entity_id,
            reason: "reply from an unclassified entity".into(),
        })?;
        let intent = classify_reply(body);
        self.outcomes.append(OutcomeEvent {
            entity_id,
            class,
            kind: OutcomeKind::Responded { intent },
            at,
        })?;
        if intent == ReplyIntent::OptOut {
            self.outcomes.append(OutcomeEvent { entity_id, class, kind: OutcomeKind::OptedOut, at })?;
            self.entities.update_status(entity_id, EntityStatus::OptedOut)?;
            tracing::info!(entity_id, %class, "entity opted out");
        } else if entity.engagement.status.is_open() {
            self.entities.update_status(entity_id, EntityStatus::Responded)?;
        }
        Ok(intent)
    }

    /// Record a later funnel outcome (qualified, contracted, closed, ...).
    pub fn record_outcome(&self, event: OutcomeEvent) -> Result<(), EngineError> {
        if self.entities.get(event.entity_id)?.is_none() {
            return Err(EngineError::UnknownEntity(event.entity_id));
        }
        let status = match &event.kind {
            OutcomeKind::Contacted => None,
            OutcomeKind::Responded { .. } => Some(EntityStatus::Responded),
            OutcomeKind::Qualified => Some(EntityStatus::Qualified),
            OutcomeKind::Contracted => Some(EntityStatus::Contracted),
            OutcomeKind::Closed { .. } => Some(EntityStatus::Closed),
            OutcomeKind::OptedOut => Some(EntityStatus::OptedOut),
        };
        let entity_id = event.entity_id;
        self.outcomes.append(event)?;
        if let Some(status) = status {
            self.entities.update_status(entity_id, status)?;
        }
        Ok(())
    }

    /// One reconciliation tick: expire stale reservations, refresh supply,
    /// run the state machine and report utilization. Safe to repeat.
    pub fn run_cycle(&self, now: DateTime<Utc>) -> Result<UtilizationReport, EngineError> {
        let day = self.day_of(now);
        let cutoff = now - Duration::minutes(i64::from(self.config.reservation_timeout_minutes));
        let ((expired, transition), state) = self.with_state(day, now, |state| {
            let expired = state.expire_reservations(cutoff).len();
            let transition = self.refresh(state, now)?;
            Ok((expired, transition))
        })?;
        if expired > 0 {
            tracing::info!(%day, expired, "stale reservations released");
        }
        if let Some(t) = &transition {
            self.announce(day, t);
        }
        let report = self.report(&state, now, expired);
        tracing::info!(
            %day,
            state = %report.state,
            used = report.used,
            daily_target = report.target,
            recommendation = %report.recommendation,
            "cycle complete"
        );
        Ok(report)
    }

    fn report(&self, state: &CapacityState, now: DateTime<Utc>, expired: usize) -> UtilizationReport {
        let hours = &self.config.operating_hours;
        let local = clock::local_hour(now, hours.utc_offset_minutes);
        let span = hours.span_hours();
        let elapsed = (local - f64::from(hours.start_hour)).clamp(0.0, span);
        let projected_used = project(state.used, state.daily_target, elapsed, span);
        let projected_pct = percent(projected_used, state.daily_target);
        let remaining_by_class = state.remaining_by_class();
        let recommendation = if state.remaining() == 0 {
            Recommendation::CapacityExhausted
        } else if !hours.contains(local) {
            Recommendation::OutsideOperatingHours
        } else if remaining_by_class.values().all(|r| *r == 0) {
            Recommendation::NoEligibleSupply
        } else if state.active_class.is_top() {
            if projected_pct < self.config.utilization_target_pct && elapsed > 0.0 {
                Recommendation::BehindPace
            } else {
                Recommendation::FocusOnTopClass
            }
        } else if projected_pct < self.config.utilization_target_pct {
            Recommendation::FillWithNextClass(state.active_class)
        } else {
            Recommendation::OnTrack
        };
        UtilizationReport {
            day: state.day,
            state: state.state_name(),
            used: state.used,
            reserved: state.reserved(),
            target: state.daily_target,
            remaining: state.remaining(),
            utilization_pct: percent(state.used, state.daily_target),
            projected_used,
            projected_utilization_pct: projected_pct,
            contacted_by_class: PriorityClass::ALL
                .into_iter()
                .map(|c| (c, state.counters(c).contacted))
                .collect(),
            remaining_by_class,
            halted_reason: state.halted_reason.clone(),
            expired_reservations: expired,
            recommendation,
        }
    }
}

/// Reject a batch that would issue a class while a higher class still has
/// supply, or an entity whose stored class differs from its ticket.
pub fn ensure_priority_order(
    tickets: &[BatchTicket],
    supply: &BTreeMap<PriorityClass, u32>,
) -> Result<(), EngineError> {
    for ticket in tickets {
        if ticket.entity.class() != Some(ticket.class) {
            return Err(EngineError::PolicyViolation(format!(
                "entity {} issued as {} but is classified {:?}",
                ticket.entity.id,
                ticket.class,
                ticket.entity.class()
            )));
        }
        if let Some(higher) = ticket.class.higher().find(|h| supply.get(h).copied().unwrap_or(0) > 0) {
            return Err(EngineError::PolicyViolation(format!(
                "entity {} of {} issued while {higher} has remaining supply",
                ticket.entity.id, ticket.class
            )));
        }
    }
    Ok(())
}
