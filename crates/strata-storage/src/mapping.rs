//! Side tables that attach externally-owned values to entities.
//!
//! A mapping is identified by an [`ExternalMappingKey`]: a name plus the value
//! type stored under it. Mappings live inside the storage, follow its
//! copy-on-write lifecycle and lose their entries when the owning entity is
//! removed.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::arena::EntityTable;
use crate::error::{Result, StorageError};
use crate::id::EntityId;

/// Typed name of an external mapping.
pub struct ExternalMappingKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> ExternalMappingKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ExternalMappingKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ExternalMappingKey<T> {}

impl<T> fmt::Debug for ExternalMappingKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExternalMappingKey").field(&self.name).finish()
    }
}

/// Values storable in an external mapping.
pub trait MappingValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> MappingValue for T {}

/// Type-erased mapping table so one storage can hold mappings of any value type.
pub(crate) trait ErasedMapping: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_table(&self) -> Box<dyn ErasedMapping>;
    fn empty_like(&self) -> Box<dyn ErasedMapping>;
    fn remove_entity(&mut self, id: EntityId) -> bool;
    fn contains_entity(&self, id: EntityId) -> bool;
    fn len(&self) -> usize;
    fn entity_ids(&self) -> Vec<EntityId>;

    /// Replays the difference between `base` and `changed` onto `self`.
    ///
    /// Entity ids are translated through `remap`; entries it maps to `None`
    /// are skipped. Returns `false` when the tables hold different value types.
    fn merge_diff(
        &mut self,
        base: Option<&dyn ErasedMapping>,
        changed: &dyn ErasedMapping,
        remap: &dyn Fn(EntityId) -> Option<EntityId>,
    ) -> bool;
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MappingTable<T> {
    by_entity: IndexMap<EntityId, T>,
}

impl<T> Default for MappingTable<T> {
    fn default() -> Self {
        Self {
            by_entity: IndexMap::new(),
        }
    }
}

impl<T: MappingValue> ErasedMapping for MappingTable<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_table(&self) -> Box<dyn ErasedMapping> {
        Box::new(self.clone())
    }

    fn empty_like(&self) -> Box<dyn ErasedMapping> {
        Box::new(MappingTable::<T>::default())
    }

    fn remove_entity(&mut self, id: EntityId) -> bool {
        self.by_entity.shift_remove(&id).is_some()
    }

    fn contains_entity(&self, id: EntityId) -> bool {
        self.by_entity.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.by_entity.len()
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.by_entity.keys().copied().collect()
    }

    fn merge_diff(
        &mut self,
        base: Option<&dyn ErasedMapping>,
        changed: &dyn ErasedMapping,
        remap: &dyn Fn(EntityId) -> Option<EntityId>,
    ) -> bool {
        let Some(changed) = changed.as_any().downcast_ref::<MappingTable<T>>() else {
            return false;
        };
        let base = base.and_then(|base| base.as_any().downcast_ref::<MappingTable<T>>());

        if let Some(base) = base {
            for id in base.by_entity.keys() {
                if changed.by_entity.contains_key(id) {
                    continue;
                }
                if let Some(target) = remap(*id) {
                    self.by_entity.shift_remove(&target);
                }
            }
        }
        for (id, value) in &changed.by_entity {
            if base.and_then(|base| base.by_entity.get(id)) == Some(value) {
                continue;
            }
            if let Some(target) = remap(*id) {
                self.by_entity.insert(target, value.clone());
            }
        }
        true
    }
}

pub(crate) type MappingSlot = Arc<dyn ErasedMapping>;

/// All mappings of one storage, keyed by mapping name.
#[derive(Clone, Default)]
pub(crate) struct Mappings {
    tables: BTreeMap<&'static str, MappingSlot>,
}

impl Mappings {
    pub(crate) fn table<T: MappingValue>(
        &self,
        key: &ExternalMappingKey<T>,
    ) -> Option<&MappingTable<T>> {
        let table = self.tables.get(key.name)?;
        let typed = table.as_any().downcast_ref::<MappingTable<T>>();
        if typed.is_none() {
            tracing::debug!(
                target: "strata.storage",
                mapping = key.name,
                "external mapping requested with a different value type"
            );
        }
        typed
    }

    pub(crate) fn table_mut<T: MappingValue>(
        &mut self,
        key: &ExternalMappingKey<T>,
    ) -> Result<&mut MappingTable<T>> {
        let slot = self
            .tables
            .entry(key.name)
            .or_insert_with(|| Arc::new(MappingTable::<T>::default()));
        if slot.as_any().downcast_ref::<MappingTable<T>>().is_none() {
            return Err(StorageError::MappingTypeMismatch {
                name: key.name.to_owned(),
            });
        }
        make_mut(slot)
            .and_then(|table| table.as_any_mut().downcast_mut::<MappingTable<T>>())
            .ok_or_else(|| StorageError::MappingTypeMismatch {
                name: key.name.to_owned(),
            })
    }

    /// Drops every entry keyed on `id`. Returns the names of touched mappings.
    pub(crate) fn remove_entity(&mut self, id: EntityId) -> Vec<&'static str> {
        let touched: Vec<&'static str> = self
            .tables
            .iter()
            .filter(|(_, table)| table.contains_entity(id))
            .map(|(name, _)| *name)
            .collect();
        for name in &touched {
            if let Some(table) = self.tables.get_mut(name).and_then(make_mut) {
                table.remove_entity(id);
            }
        }
        touched
    }

    /// Names of non-empty tables.
    /// Drops the entries of `ids` from the mapping called `name`.
    pub(crate) fn remove_entries(&mut self, name: &str, ids: &[EntityId]) -> usize {
        let Some(slot) = self.tables.get_mut(name) else {
            return 0;
        };
        if !ids.iter().any(|id| slot.contains_entity(*id)) {
            return 0;
        }
        let Some(table) = make_mut(slot) else {
            return 0;
        };
        ids.iter().filter(|id| table.remove_entity(**id)).count()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables
            .iter()
            .filter(|(_, table)| table.len() > 0)
            .map(|(name, _)| *name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'static str, &dyn ErasedMapping)> + '_ {
        self.tables
            .iter()
            .map(|(name, table)| (*name, table.as_ref()))
    }

    pub(crate) fn get_erased(&self, name: &str) -> Option<&dyn ErasedMapping> {
        self.tables.get(name).map(|table| table.as_ref())
    }

    pub(crate) fn get_or_insert_like(
        &mut self,
        name: &'static str,
        template: &dyn ErasedMapping,
    ) -> Option<&mut (dyn ErasedMapping + 'static)> {
        let slot = self
            .tables
            .entry(name)
            .or_insert_with(|| Arc::from(template.empty_like()));
        make_mut(slot)
    }

    /// `true` when `name` refers to the same physical table in both sets.
    pub(crate) fn shares_table(&self, other: &Mappings, name: &str) -> bool {
        match (self.tables.get(name), other.tables.get(name)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Removes tables left empty by edits.
    pub(crate) fn prune_empty(&mut self) {
        self.tables.retain(|_, table| table.len() > 0);
    }
}

impl fmt::Debug for Mappings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.tables.iter().map(|(name, table)| (name, table.len())))
            .finish()
    }
}

/// Unshares `slot` by copying the table when another storage still holds it.
fn make_mut(slot: &mut MappingSlot) -> Option<&mut (dyn ErasedMapping + 'static)> {
    if Arc::get_mut(slot).is_none() {
        *slot = Arc::from(slot.clone_table());
    }
    Arc::get_mut(slot)
}

/// Read-only view of one mapping.
///
/// Views of mappings that were never written are empty.
pub struct ExternalEntityMapping<'a, T> {
    table: Option<&'a MappingTable<T>>,
}

impl<'a, T: MappingValue> ExternalEntityMapping<'a, T> {
    pub(crate) fn new(table: Option<&'a MappingTable<T>>) -> Self {
        Self { table }
    }

    pub fn get_data_by_entity_id(&self, id: EntityId) -> Option<&'a T> {
        self.table?.by_entity.get(&id)
    }

    /// Entities mapped to a value equal to `value`, in mapping order.
    pub fn get_entities(&self, value: &T) -> Vec<EntityId> {
        self.iter()
            .filter(|(_, mapped)| *mapped == value)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &'a T)> + 'a {
        self.table
            .into_iter()
            .flat_map(|table| table.by_entity.iter().map(|(id, value)| (*id, value)))
    }

    pub fn len(&self) -> usize {
        self.table.map_or(0, |table| table.by_entity.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for ExternalEntityMapping<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalEntityMapping")
            .field("len", &self.table.map_or(0, |table| table.by_entity.len()))
            .finish()
    }
}

/// Writable view of one mapping inside a builder.
pub struct MutableExternalEntityMapping<'b, T> {
    table: &'b mut MappingTable<T>,
    entities: &'b EntityTable,
    modification_count: &'b mut u64,
}

impl<T> fmt::Debug for MutableExternalEntityMapping<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableExternalEntityMapping")
            .field("len", &self.table.by_entity.len())
            .finish()
    }
}

impl<'b, T: MappingValue> MutableExternalEntityMapping<'b, T> {
    pub(crate) fn new(
        table: &'b mut MappingTable<T>,
        entities: &'b EntityTable,
        modification_count: &'b mut u64,
    ) -> Self {
        Self {
            table,
            entities,
            modification_count,
        }
    }

    /// Maps `id` to `value`, returning the previous value.
    ///
    /// Fails with [`StorageError::NotFound`] when `id` is not in the builder.
    pub fn add_mapping(&mut self, id: EntityId, value: T) -> Result<Option<T>> {
        if !self.entities.contains(id) {
            return Err(StorageError::NotFound { id });
        }
        *self.modification_count += 1;
        Ok(self.table.by_entity.insert(id, value))
    }

    pub fn remove_mapping(&mut self, id: EntityId) -> Option<T> {
        let removed = self.table.by_entity.shift_remove(&id);
        if removed.is_some() {
            *self.modification_count += 1;
        }
        removed
    }

    pub fn get_data_by_entity_id(&self, id: EntityId) -> Option<&T> {
        self.table.by_entity.get(&id)
    }

    pub fn get_entities(&self, value: &T) -> Vec<EntityId> {
        self.table
            .by_entity
            .iter()
            .filter(|(_, mapped)| *mapped == value)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.table.by_entity.iter().map(|(id, value)| (*id, value))
    }

    pub fn len(&self) -> usize {
        self.table.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.by_entity.is_empty()
    }
}
