use std::collections::BTreeMap;

use crate::model::{Attributes, Entity, EntityId, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Changed,
    Unchanged,
}

/// Live entities per kind, keyed by identifier.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    slices: BTreeMap<EntityKind, BTreeMap<EntityId, Entity>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new entity or merges `attributes` into the existing one.
    pub fn upsert(&mut self, kind: EntityKind, id: EntityId, attributes: Attributes) -> Upsert {
        let slice = self.slices.entry(kind).or_default();
        match slice.get_mut(&id) {
            Some(entity) => {
                let mut changed = false;
                for (name, value) in attributes {
                    if entity.attributes.get(&name) != Some(&value) {
                        entity.attributes.insert(name, value);
                        changed = true;
                    }
                }
                if changed {
                    Upsert::Changed
                } else {
                    Upsert::Unchanged
                }
            }
            None => {
                slice.insert(id.clone(), Entity::new(kind, id, attributes));
                Upsert::Added
            }
        }
    }

    /// Inserts a new entity or swaps in `attributes` wholesale, dropping any
    /// attribute the new map lacks.
    pub fn replace(&mut self, kind: EntityKind, id: EntityId, attributes: Attributes) -> Upsert {
        let slice = self.slices.entry(kind).or_default();
        match slice.get_mut(&id) {
            Some(entity) if entity.attributes == attributes => Upsert::Unchanged,
            Some(entity) => {
                entity.attributes = attributes;
                Upsert::Changed
            }
            None => {
                slice.insert(id.clone(), Entity::new(kind, id, attributes));
                Upsert::Added
            }
        }
    }

    pub fn remove(&mut self, kind: EntityKind, id: &EntityId) -> Option<Entity> {
        self.slices.get_mut(&kind)?.remove(id)
    }

    pub fn get(&self, kind: EntityKind, id: &EntityId) -> Option<&Entity> {
        self.slices.get(&kind)?.get(id)
    }

    pub fn contains(&self, kind: EntityKind, id: &EntityId) -> bool {
        self.get(kind, id).is_some()
    }

    /// All entities of one kind in identifier order.
    pub fn get_slice(&self, kind: EntityKind) -> Vec<&Entity> {
        self.iter(kind).collect()
    }

    pub fn iter(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.slices.get(&kind).into_iter().flat_map(|slice| slice.values())
    }

    pub fn ids(&self, kind: EntityKind) -> Vec<EntityId> {
        self.iter(kind).map(|entity| entity.id.clone()).collect()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.slices.get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, kind: EntityKind) -> bool {
        self.len(kind) == 0
    }

    /// Identifiers of `kind` entities whose `parent_attribute` names `parent`.
    pub fn children(
        &self,
        kind: EntityKind,
        parent_attribute: &str,
        parent: &EntityId,
    ) -> Vec<EntityId> {
        self.iter(kind)
            .filter(|entity| entity.text(parent_attribute) == Some(parent.as_str()))
            .map(|entity| entity.id.clone())
            .collect()
    }
}
