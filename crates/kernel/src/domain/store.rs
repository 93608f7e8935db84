use crate::domain::entity::Entity;
use crate::domain::uid::EntityUid;
use std::collections::HashMap;

/// An immutable mapping from entity UID to entity.
///
/// Mutating operations are functional: they return a new store and leave
/// the receiver untouched, so a store shared across threads can be read
/// freely and replaced by pointer swap, mirroring the policy-set
/// discipline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityStore {
    entities: HashMap<EntityUid, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            entities: entities
                .into_iter()
                .map(|e| (e.uid().clone(), e))
                .collect(),
        }
    }

    pub fn get(&self, uid: &EntityUid) -> Option<&Entity> {
        self.entities.get(uid)
    }

    pub fn contains(&self, uid: &EntityUid) -> bool {
        self.entities.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn uids(&self) -> impl Iterator<Item = &EntityUid> {
        self.entities.keys()
    }

    /// Returns a new store with `entity` inserted, replacing any entity
    /// with the same UID.
    #[must_use]
    pub fn upsert(&self, entity: Entity) -> Self {
        let mut entities = self.entities.clone();
        entities.insert(entity.uid().clone(), entity);
        Self { entities }
    }

    /// Returns a new store with every given entity inserted.
    #[must_use]
    pub fn upsert_all(&self, batch: impl IntoIterator<Item = Entity>) -> Self {
        let mut entities = self.entities.clone();
        for entity in batch {
            entities.insert(entity.uid().clone(), entity);
        }
        Self { entities }
    }

    /// Returns a new store without the entity at `uid`.
    #[must_use]
    pub fn remove(&self, uid: &EntityUid) -> Self {
        let mut entities = self.entities.clone();
        entities.remove(uid);
        Self { entities }
    }
}
