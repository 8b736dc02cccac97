//! In-memory entity and outcome stores.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::core::classifier::{rank_key, ClassificationResult};
use crate::core::error::EngineError;
use crate::core::store::{EntityFilter, EntityStore, OutcomeStore};
use crate::core::types::{Assignment, Engagement, Entity, EntityId, EntityStatus, OutcomeEvent, PriorityClass};

/// Entity store for development, tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<BTreeMap<EntityId, Entity>>,
    unavailable: AtomicBool,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `entities`.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let store = Self::new();
        store.entities.write().extend(entities.into_iter().map(|e| (e.id, e)));
        store
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Simulate an outage: every call fails with
    /// [`EngineError::StoreUnavailable`] until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    fn check(&self) -> Result<(), EngineError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(EngineError::StoreUnavailable("entity store offline".into()));
        }
        Ok(())
    }

    fn in_class<'a>(
        entities: &'a BTreeMap<EntityId, Entity>,
        class: PriorityClass,
        filter: &'a EntityFilter,
    ) -> impl Iterator<Item = &'a Entity> {
        entities
            .values()
            .filter(move |e| e.class() == Some(class) && filter.matches(e))
    }

    fn with_entity<T>(&self, id: EntityId, f: impl FnOnce(&mut Entity) -> T) -> Result<T, EngineError> {
        self.check()?;
        let mut entities = self.entities.write();
        let entity = entities.get_mut(&id).ok_or(EngineError::UnknownEntity(id))?;
        Ok(f(entity))
    }
}

impl EntityStore for InMemoryEntityStore {
    fn upsert(&self, entity: Entity) -> Result<(), EngineError> {
        self.check()?;
        self.entities.write().insert(entity.id, entity);
        Ok(())
    }

    fn get(&self, id: EntityId) -> Result<Option<Entity>, EngineError> {
        self.check()?;
        Ok(self.entities.read().get(&id).cloned())
    }

    fn fetch_unclassified(&self, limit: usize) -> Result<Vec<Entity>, EngineError> {
        self.check()?;
        Ok(self
            .entities
            .read()
            .values()
            .filter(|e| e.evaluated_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    fn fetch_by_class(&self, class: PriorityClass, filter: &EntityFilter) -> Result<Vec<Entity>, EngineError> {
        self.check()?;
        let entities = self.entities.read();
        let mut matched: Vec<Entity> = Self::in_class(&entities, class, filter).cloned().collect();
        matched.sort_by_key(rank_key);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn count_by_class(&self, class: PriorityClass, filter: &EntityFilter) -> Result<usize, EngineError> {
        self.check()?;
        let entities = self.entities.read();
        Ok(Self::in_class(&entities, class, filter).count())
    }

    fn update_classification(
        &self,
        id: EntityId,
        result: Option<ClassificationResult>,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.with_entity(id, |entity| {
            entity.assignment = result.map(|result| Assignment { result, rank: None, classified_at: at });
            entity.evaluated_at = Some(at);
        })
    }

    fn fetch_after(&self, after: Option<EntityId>, limit: usize) -> Result<Vec<Entity>, EngineError> {
        self.check()?;
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        Ok(self
            .entities
            .read()
            .range((lower, Bound::Unbounded))
            .map(|(_, e)| e)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_attempt(&self, id: EntityId, at: DateTime<Utc>) -> Result<Engagement, EngineError> {
        self.with_entity(id, |entity| {
            let engagement = &mut entity.engagement;
            if engagement.last_attempt_at != Some(at) {
                engagement.contact_attempts += 1;
                engagement.last_attempt_at = Some(at);
                if engagement.status == EntityStatus::New {
                    engagement.status = EntityStatus::Contacted;
                }
            }
            engagement.clone()
        })
    }

    fn update_status(&self, id: EntityId, status: EntityStatus) -> Result<(), EngineError> {
        self.with_entity(id, |entity| entity.engagement.status = status)
    }

    fn rank_class(&self, class: PriorityClass) -> Result<usize, EngineError> {
        self.check()?;
        let mut entities = self.entities.write();
        let mut keyed: Vec<_> = entities
            .values()
            .filter(|e| e.class() == Some(class))
            .map(|e| (rank_key(e), e.id))
            .collect();
        keyed.sort();
        for (position, (_, id)) in keyed.iter().enumerate() {
            if let Some(assignment) = entities.get_mut(id).and_then(|e| e.assignment.as_mut()) {
                assignment.rank = Some(u32::try_from(position + 1).unwrap_or(u32::MAX));
            }
        }
        Ok(keyed.len())
    }
}

/// Append-only outcome log held in memory.
#[derive(Default)]
pub struct InMemoryOutcomeStore {
    events: RwLock<Vec<OutcomeEvent>>,
}

impl InMemoryOutcomeStore {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl OutcomeStore for InMemoryOutcomeStore {
    fn append(&self, event: OutcomeEvent) -> Result<(), EngineError> {
        self.events.write().push(event);
        Ok(())
    }

    fn query(&self, since: Option<DateTime<Utc>>, until: DateTime<Utc>) -> Result<Vec<OutcomeEvent>, EngineError> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| since.map_or(true, |s| e.at >= s) && e.at < until)
            .cloned()
            .collect())
    }
}
