//! Entity and outcome store contracts.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::config::ClassPolicy;
use crate::core::classifier::ClassificationResult;
use crate::core::error::EngineError;
use crate::core::types::{Engagement, Entity, EntityId, EntityStatus, OutcomeEvent, PriorityClass};

/// Selection filter for class queries.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Only open, contactable entities.
    pub open_only: bool,
    /// Exclude entities at or above this attempt count.
    pub max_attempts: Option<u32>,
    /// Exclude entities still inside `cooldown` as of `now`.
    pub cooldown: Option<(DateTime<Utc>, Duration)>,
    /// Entities to leave out (e.g. already reserved).
    pub exclude: HashSet<EntityId>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
}

impl EntityFilter {
    /// Filter matching entities that may be contacted now under `policy`.
    pub fn eligible(now: DateTime<Utc>, policy: &ClassPolicy) -> Self {
        Self {
            open_only: true,
            max_attempts: Some(policy.max_attempts),
            cooldown: Some((now, policy.cooldown())),
            exclude: HashSet::new(),
            limit: None,
        }
    }

    /// Leave out the given ids.
    #[must_use]
    pub fn excluding(mut self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.exclude.extend(ids);
        self
    }

    /// Cap the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an entity passes the filter. Stores must apply exactly these
    /// semantics.
    pub fn matches(&self, entity: &Entity) -> bool {
        if self.exclude.contains(&entity.id) {
            return false;
        }
        let engagement = &entity.engagement;
        if self.open_only && !(engagement.status.is_open() && entity.attributes.is_contactable()) {
            return false;
        }
        if let Some(max) = self.max_attempts {
            if engagement.contact_attempts >= max {
                return false;
            }
        }
        if let (Some((now, cooldown)), Some(last)) = (self.cooldown, engagement.last_attempt_at) {
            if now < last + cooldown {
                return false;
            }
        }
        true
    }
}

/// Backing store for entities.
///
/// Each write is atomic per record. Implementations return
/// [`EngineError::StoreUnavailable`] for transient failures.
pub trait EntityStore: Send + Sync {
    /// Insert or replace an entity.
    fn upsert(&self, entity: Entity) -> Result<(), EngineError>;

    /// Fetch one entity.
    fn get(&self, id: EntityId) -> Result<Option<Entity>, EngineError>;

    /// Entities never evaluated by the classifier, in id order.
    fn fetch_unclassified(&self, limit: usize) -> Result<Vec<Entity>, EngineError>;

    /// Entities of a class matching `filter`, in rank order.
    fn fetch_by_class(&self, class: PriorityClass, filter: &EntityFilter) -> Result<Vec<Entity>, EngineError>;

    /// Number of entities of a class matching `filter` (ignores `limit`).
    fn count_by_class(&self, class: PriorityClass, filter: &EntityFilter) -> Result<usize, EngineError>;

    /// Atomically replace an entity's classification. `None` records that
    /// the entity was evaluated and is not viable.
    fn update_classification(
        &self,
        id: EntityId,
        result: Option<ClassificationResult>,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError>;

    /// Every entity with an id greater than `after` (all when `None`), in
    /// id order, classified or not.
    fn fetch_after(&self, after: Option<EntityId>, limit: usize) -> Result<Vec<Entity>, EngineError>;

    /// Record a contact attempt. Repeating the same `at` is a no-op.
    fn update_attempt(&self, id: EntityId, at: DateTime<Utc>) -> Result<Engagement, EngineError>;

    /// Move an entity to a new lifecycle status.
    fn update_status(&self, id: EntityId, status: EntityStatus) -> Result<(), EngineError>;

    /// Recompute and persist 1-based ranks within a class. Returns the
    /// number of ranked entities.
    fn rank_class(&self, class: PriorityClass) -> Result<usize, EngineError>;
}

/// Append-only store of outcome events.
pub trait OutcomeStore: Send + Sync {
    /// Append one event.
    fn append(&self, event: OutcomeEvent) -> Result<(), EngineError>;

    /// Events with `since <= at < until` (`since = None` means from the beginning).
    fn query(&self, since: Option<DateTime<Utc>>, until: DateTime<Utc>) -> Result<Vec<OutcomeEvent>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::types::EconomicAttributes;
    use crate::util::money::Cents;
    use chrono::TimeZone;

    fn entity() -> Entity {
        Entity::new(
            1,
            EconomicAttributes {
                primary_amount: Cents::from_dollars(20_000),
                secondary_value: Cents::ZERO,
                urgency_deadline: None,
                has_phone: true,
                has_email: false,
                cross_referenced: false,
            },
        )
    }

    #[test]
    fn cooldown_boundary_is_inclusive_of_expiry() {
        let cfg = EngineConfig::default();
        let policy = cfg.policy(PriorityClass::A);
        let contacted = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut e = entity();
        e.engagement.last_attempt_at = Some(contacted);
        e.engagement.contact_attempts = 1;

        let just_before = contacted + policy.cooldown() - Duration::seconds(1);
        assert!(!EntityFilter::eligible(just_before, policy).matches(&e));
        let at_expiry = contacted + policy.cooldown();
        assert!(EntityFilter::eligible(at_expiry, policy).matches(&e));
    }

    #[test]
    fn attempt_ceiling_excludes() {
        let cfg = EngineConfig::default();
        let policy = cfg.policy(PriorityClass::C);
        let mut e = entity();
        e.engagement.contact_attempts = policy.max_attempts;
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(!EntityFilter::eligible(now, policy).matches(&e));
    }

    #[test]
    fn closed_or_uncontactable_entities_are_not_eligible() {
        let cfg = EngineConfig::default();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let filter = EntityFilter::eligible(now, cfg.policy(PriorityClass::A));
        let mut e = entity();
        e.engagement.status = EntityStatus::OptedOut;
        assert!(!filter.matches(&e));
        let mut e = entity();
        e.attributes.has_phone = false;
        assert!(!filter.matches(&e));
        assert!(!filter.clone().excluding([1]).matches(&entity()));
    }
}
