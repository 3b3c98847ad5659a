//! Secondary indexes over the entity table.
//!
//! Every index is reference counted at the granularity of one bucket, so a
//! builder derived from a snapshot shares all buckets it never writes to.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::entity::Entity;
use crate::id::{EntityId, EntityTypeId, SymbolicEntityId};
use crate::source::EntitySource;

/// Key to set-of-entities index with copy-on-write buckets.
#[derive(Clone, Debug)]
pub(crate) struct MultiIndex<K> {
    buckets: Arc<HashMap<K, Arc<IndexSet<EntityId>>>>,
}

impl<K> Default for MultiIndex<K> {
    fn default() -> Self {
        Self {
            buckets: Arc::new(HashMap::new()),
        }
    }
}

impl<K: Clone + Eq + Hash> MultiIndex<K> {
    pub(crate) fn insert(&mut self, key: K, id: EntityId) {
        let bucket = Arc::make_mut(&mut self.buckets).entry(key).or_default();
        Arc::make_mut(bucket).insert(id);
    }

    pub(crate) fn remove(&mut self, key: &K, id: EntityId) {
        if !self.contains(key, id) {
            return;
        }
        let buckets = Arc::make_mut(&mut self.buckets);
        let now_empty = match buckets.get_mut(key) {
            Some(bucket) => {
                Arc::make_mut(bucket).shift_remove(&id);
                bucket.is_empty()
            }
            None => false,
        };
        if now_empty {
            buckets.remove(key);
        }
    }

    pub(crate) fn contains(&self, key: &K, id: EntityId) -> bool {
        self.buckets
            .get(key)
            .is_some_and(|bucket| bucket.contains(&id))
    }

    pub(crate) fn get(&self, key: &K) -> impl Iterator<Item = EntityId> + '_ {
        self.buckets
            .get(key)
            .into_iter()
            .flat_map(|bucket| bucket.iter().copied())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, EntityId)> + '_ {
        self.buckets
            .iter()
            .flat_map(|(key, bucket)| bucket.iter().map(move |id| (key, *id)))
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.buckets.keys()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Indexes {
    /// Per type, entity ids in insertion order.
    by_type: Vec<Arc<IndexSet<EntityId>>>,
    pub(crate) by_source: MultiIndex<EntitySource>,
    /// Hard reference target to referrers.
    pub(crate) referrers: MultiIndex<EntityId>,
    /// Symbolic reference target to referrers.
    pub(crate) soft_links: MultiIndex<SymbolicEntityId>,
    symbolic: Arc<HashMap<SymbolicEntityId, EntityId>>,
}

impl Indexes {
    pub(crate) fn new(type_count: usize) -> Self {
        Self {
            by_type: vec![Arc::new(IndexSet::new()); type_count],
            by_source: MultiIndex::default(),
            referrers: MultiIndex::default(),
            soft_links: MultiIndex::default(),
            symbolic: Arc::new(HashMap::new()),
        }
    }

    pub(crate) fn of_type(&self, type_id: EntityTypeId) -> Option<&IndexSet<EntityId>> {
        self.by_type.get(type_id.index()).map(|ids| ids.as_ref())
    }

    pub(crate) fn symbolic(&self, id: &SymbolicEntityId) -> Option<EntityId> {
        self.symbolic.get(id).copied()
    }

    pub(crate) fn symbolic_entries(&self) -> impl Iterator<Item = (&SymbolicEntityId, EntityId)> + '_ {
        self.symbolic.iter().map(|(symbolic_id, id)| (symbolic_id, *id))
    }

    /// Adds a new entity at the end of its type's iteration order.
    pub(crate) fn add(&mut self, entity: &Entity) {
        if let Some(ids) = self.by_type.get_mut(entity.type_id().index()) {
            Arc::make_mut(ids).insert(entity.id());
        }
        self.link(entity);
    }

    pub(crate) fn remove(&mut self, entity: &Entity) {
        if let Some(ids) = self.by_type.get_mut(entity.type_id().index()) {
            if ids.contains(&entity.id()) {
                Arc::make_mut(ids).shift_remove(&entity.id());
            }
        }
        self.unlink(entity);
    }

    /// Re-indexes a new version of an entity, keeping its iteration position.
    pub(crate) fn replace(&mut self, old: &Entity, new: &Entity) {
        self.unlink(old);
        self.link(new);
    }

    fn link(&mut self, entity: &Entity) {
        let id = entity.id();
        self.by_source.insert(entity.source().clone(), id);
        for target in entity.fields().referenced_ids() {
            self.referrers.insert(target, id);
        }
        for target in entity.fields().symbolic_refs() {
            self.soft_links.insert(target.clone(), id);
        }
        if let Some(symbolic_id) = entity.symbolic_id() {
            Arc::make_mut(&mut self.symbolic).insert(symbolic_id.clone(), id);
        }
    }

    fn unlink(&mut self, entity: &Entity) {
        let id = entity.id();
        self.by_source.remove(entity.source(), id);
        for target in entity.fields().referenced_ids() {
            self.referrers.remove(&target, id);
        }
        for target in entity.fields().symbolic_refs() {
            self.soft_links.remove(target, id);
        }
        if let Some(symbolic_id) = entity.symbolic_id() {
            if self.symbolic.get(symbolic_id) == Some(&id) {
                Arc::make_mut(&mut self.symbolic).remove(symbolic_id);
            }
        }
    }

    /// Per-type id sets, in type order.
    pub(crate) fn types(&self) -> impl Iterator<Item = (EntityTypeId, &IndexSet<EntityId>)> + '_ {
        self.by_type
            .iter()
            .enumerate()
            .map(|(index, ids)| (EntityTypeId::from_raw(index as u16), ids.as_ref()))
    }
}
