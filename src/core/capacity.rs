//! Per-day capacity state and the state machine over active classes.
//!
//! One [`CapacityState`] exists per calendar day. It is loaded by key at the
//! start of each operation and written back with a version check, so any
//! number of scheduler instances can share one [`CapacityStore`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::EngineError;
use crate::core::types::{ContactAttempt, EntityId, PriorityClass};

/// Per-class counters for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounters {
    /// Attempts recorded today.
    pub contacted: u32,
    /// Eligible entities not yet in flight, as of the last refresh.
    pub remaining: u32,
}

/// Capacity held for an issued, not yet reported ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Ticket that holds the reservation.
    pub ticket_id: Uuid,
    /// Entity the ticket targets.
    pub entity_id: EntityId,
    /// Class the entity was issued under.
    pub class: PriorityClass,
    /// When the ticket was issued.
    pub issued_at: DateTime<Utc>,
}

/// Change of active class produced by a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The active class ran out and the next class with supply took over.
    Advanced {
        /// Previous active class.
        from: PriorityClass,
        /// New active class.
        to: PriorityClass,
    },
    /// A higher class regained supply; the lower class is halted.
    ForcedReturn {
        /// Halted class.
        from: PriorityClass,
        /// Class that reappeared.
        to: PriorityClass,
        /// Recorded halt reason.
        reason: String,
    },
}

/// Result of applying a contact attempt to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptApplied {
    /// Counted, consuming a reservation when `reserved`.
    Recorded {
        /// Whether a reservation was converted.
        reserved: bool,
    },
    /// Same attempt id already counted; nothing changed.
    Duplicate,
}

/// Capacity state for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityState {
    /// Calendar day this state covers.
    pub day: NaiveDate,
    /// Attempts allowed today.
    pub daily_target: u32,
    /// Attempts recorded today.
    pub used: u32,
    /// Counters per class.
    pub per_class: BTreeMap<PriorityClass, ClassCounters>,
    /// Class currently being worked.
    pub active_class: PriorityClass,
    /// Why the previously active class was halted, if it was.
    pub halted_reason: Option<String>,
    /// Outstanding reservations by ticket id.
    pub reservations: BTreeMap<Uuid, Reservation>,
    /// Attempt ids already counted today.
    pub recorded_attempts: BTreeSet<Uuid>,
    /// Optimistic-concurrency version, bumped on every successful write.
    pub version: u64,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl CapacityState {
    /// Fresh state for a day; the top class starts active.
    pub fn new(day: NaiveDate, daily_target: u32, now: DateTime<Utc>) -> Self {
        Self {
            day,
            daily_target,
            used: 0,
            per_class: PriorityClass::ALL
                .into_iter()
                .map(|c| (c, ClassCounters::default()))
                .collect(),
            active_class: PriorityClass::TOP,
            halted_reason: None,
            reservations: BTreeMap::new(),
            recorded_attempts: BTreeSet::new(),
            version: 0,
            updated_at: now,
        }
    }

    /// `max(0, target - used)`.
    pub const fn remaining(&self) -> u32 {
        self.daily_target.saturating_sub(self.used)
    }

    /// Outstanding reservations.
    pub fn reserved(&self) -> u32 {
        u32::try_from(self.reservations.len()).unwrap_or(u32::MAX)
    }

    /// Outstanding reservations for one class.
    pub fn reserved_for(&self, class: PriorityClass) -> u32 {
        let n = self.reservations.values().filter(|r| r.class == class).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Capacity that can still be issued: `target - used - reserved`.
    pub fn available(&self) -> u32 {
        self.remaining().saturating_sub(self.reserved())
    }

    /// Counters for a class.
    pub fn counters(&self, class: PriorityClass) -> ClassCounters {
        self.per_class.get(&class).copied().unwrap_or_default()
    }

    /// Remaining supply per class, as of the last refresh.
    pub fn remaining_by_class(&self) -> BTreeMap<PriorityClass, u32> {
        PriorityClass::ALL
            .into_iter()
            .map(|c| (c, self.counters(c).remaining))
            .collect()
    }

    /// Entities holding a reservation.
    pub fn reserved_entities(&self) -> HashSet<EntityId> {
        self.reservations.values().map(|r| r.entity_id).collect()
    }

    /// State-machine label, e.g. `A_ACTIVE`.
    pub fn state_name(&self) -> String {
        format!("{:?}_ACTIVE", self.active_class)
    }

    /// Hold capacity for an issued ticket.
    pub fn reserve(&mut self, reservation: Reservation) -> Result<(), EngineError> {
        if self.available() == 0 {
            return Err(EngineError::CapacityExhausted);
        }
        self.reservations.insert(reservation.ticket_id, reservation);
        Ok(())
    }

    /// Release a reservation; returns it if it existed.
    pub fn release(&mut self, ticket_id: Uuid) -> Option<Reservation> {
        self.reservations.remove(&ticket_id)
    }

    /// Drop reservations issued before `cutoff`.
    pub fn expire_reservations(&mut self, cutoff: DateTime<Utc>) -> Vec<Reservation> {
        let stale: Vec<Uuid> = self
            .reservations
            .values()
            .filter(|r| r.issued_at < cutoff)
            .map(|r| r.ticket_id)
            .collect();
        stale
            .into_iter()
            .filter_map(|id| self.reservations.remove(&id))
            .collect()
    }

    /// Count a contact attempt.
    ///
    /// The attempt consumes the reservation whose ticket id equals the
    /// attempt id, else any reservation for the same entity, else fresh
    /// capacity. `used` never exceeds `daily_target`.
    pub fn apply_attempt(&mut self, attempt: &ContactAttempt) -> Result<AttemptApplied, EngineError> {
        if self.recorded_attempts.contains(&attempt.attempt_id) {
            return Ok(AttemptApplied::Duplicate);
        }
        let ticket = if self.reservations.contains_key(&attempt.attempt_id) {
            Some(attempt.attempt_id)
        } else {
            self.reservations
                .values()
                .find(|r| r.entity_id == attempt.entity_id)
                .map(|r| r.ticket_id)
        };
        let reserved = ticket.is_some();
        if self.used >= self.daily_target || (!reserved && self.available() == 0) {
            return Err(EngineError::CapacityExhausted);
        }
        if let Some(ticket) = ticket {
            self.reservations.remove(&ticket);
        }
        self.used += 1;
        let counters = self.per_class.entry(attempt.class).or_default();
        counters.contacted += 1;
        counters.remaining = counters.remaining.saturating_sub(u32::from(!reserved));
        self.recorded_attempts.insert(attempt.attempt_id);
        self.updated_at = attempt.at;
        Ok(AttemptApplied::Recorded { reserved })
    }

    /// Apply fresh per-class supply counts and run the state machine.
    ///
    /// The active class becomes the highest class with supply (the lowest
    /// class when nothing has supply). Moving up is a forced return that
    /// halts the lower class; moving down is an ordinary advance.
    pub fn reconcile(&mut self, remaining: &BTreeMap<PriorityClass, u32>, now: DateTime<Utc>) -> Option<Transition> {
        for class in PriorityClass::ALL {
            let counters = self.per_class.entry(class).or_default();
            counters.remaining = remaining.get(&class).copied().unwrap_or(0);
        }
        self.updated_at = now;
        let target = PriorityClass::ALL
            .into_iter()
            .find(|c| self.counters(*c).remaining > 0)
            .unwrap_or(PriorityClass::LOWEST);
        let from = self.active_class;
        if target == from {
            return None;
        }
        self.active_class = target;
        if target.outranks(from) {
            let reason = format!(
                "{from} halted: {target} has {} remaining",
                self.counters(target).remaining
            );
            self.halted_reason = Some(reason.clone());
            Some(Transition::ForcedReturn { from, to: target, reason })
        } else {
            self.halted_reason = None;
            Some(Transition::Advanced { from, to: target })
        }
    }
}

/// Keyed store of per-day capacity states.
pub trait CapacityStore: Send + Sync {
    /// State for a day, if one exists.
    fn load(&self, day: NaiveDate) -> Result<Option<CapacityState>, EngineError>;

    /// Insert `state` unless the day already has one; returns the stored
    /// state either way, so a day never has two records.
    fn get_or_insert(&self, state: CapacityState) -> Result<CapacityState, EngineError>;

    /// Write `state` if the stored version still equals `state.version`,
    /// bumping the version. Fails with [`EngineError::ConcurrencyConflict`]
    /// otherwise. Returns the stored state.
    fn compare_and_swap(&self, state: CapacityState) -> Result<CapacityState, EngineError>;
}
