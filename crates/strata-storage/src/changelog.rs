//! Per-builder record of entity-level changes relative to the base snapshot.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use crate::entity::Entity;
use crate::id::{EntityId, EntityTypeId};

/// One entity-level change between two storages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityChange {
    Added(Entity),
    Removed(Entity),
    Replaced { old: Entity, new: Entity },
}

impl EntityChange {
    pub fn id(&self) -> EntityId {
        self.entity().id()
    }

    pub fn type_id(&self) -> EntityTypeId {
        self.entity().type_id()
    }

    /// The entity as it exists after the change (before it, for removals).
    pub fn entity(&self) -> &Entity {
        match self {
            EntityChange::Added(entity) | EntityChange::Removed(entity) => entity,
            EntityChange::Replaced { new, .. } => new,
        }
    }

    /// The entity as it existed before the change, if it did.
    pub fn old_entity(&self) -> Option<&Entity> {
        match self {
            EntityChange::Added(_) => None,
            EntityChange::Removed(entity) => Some(entity),
            EntityChange::Replaced { old, .. } => Some(old),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            EntityChange::Removed(_) => 0,
            EntityChange::Replaced { .. } => 1,
            EntityChange::Added(_) => 2,
        }
    }
}

/// Net change per entity id.
///
/// Successive edits of one entity collapse: add-then-modify is an add,
/// add-then-remove disappears, modify-then-remove is a removal of the base
/// version and modifying back to the base data disappears.
///
/// Base versions of reverted entities are kept so that later edits still
/// report the version found in the base snapshot.
#[derive(Clone, Debug, Default)]
pub(crate) struct ChangeLog {
    entries: IndexMap<EntityId, EntityChange>,
    reverted: HashMap<EntityId, Entity>,
}

impl ChangeLog {
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &EntityChange> {
        self.entries.values()
    }

    pub(crate) fn added(&mut self, entity: Entity) {
        self.entries.insert(entity.id(), EntityChange::Added(entity));
    }

    pub(crate) fn removed(&mut self, entity: Entity) {
        let id = entity.id();
        match self.entries.shift_remove(&id) {
            Some(EntityChange::Added(_)) => {}
            Some(EntityChange::Replaced { old, .. }) => {
                self.entries.insert(id, EntityChange::Removed(old));
            }
            Some(EntityChange::Removed(original)) => {
                self.entries.insert(id, EntityChange::Removed(original));
            }
            None => {
                let base = self.reverted.remove(&id).unwrap_or(entity);
                self.entries.insert(id, EntityChange::Removed(base));
            }
        }
    }

    pub(crate) fn replaced(&mut self, old: Entity, new: Entity) {
        let id = new.id();
        let reverted = matches!(
            self.entries.get(&id),
            Some(EntityChange::Replaced { old: original, .. }) if original.has_equal_data(&new)
        );
        if reverted {
            if let Some(EntityChange::Replaced { old: original, .. }) =
                self.entries.shift_remove(&id)
            {
                self.reverted.insert(id, original);
            }
            return;
        }
        match self.entries.get_mut(&id) {
            Some(EntityChange::Added(added)) => *added = new,
            Some(EntityChange::Replaced { new: latest, .. }) => *latest = new,
            Some(EntityChange::Removed(_)) => {}
            None => {
                let old = self.reverted.get(&id).cloned().unwrap_or(old);
                self.entries.insert(id, EntityChange::Replaced { old, new });
            }
        }
    }

    /// Changes grouped by entity type: removals, then replacements, then
    /// additions, each in the order they were first recorded.
    pub(crate) fn collect(&self) -> BTreeMap<EntityTypeId, Vec<EntityChange>> {
        let mut by_type: BTreeMap<EntityTypeId, Vec<EntityChange>> = BTreeMap::new();
        for change in self.entries.values() {
            by_type.entry(change.type_id()).or_default().push(change.clone());
        }
        for changes in by_type.values_mut() {
            // Stable sort keeps log order within each kind.
            changes.sort_by_key(EntityChange::rank);
        }
        by_type
    }
}
