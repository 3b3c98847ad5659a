use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strata_config::{ConsistencyChecks, StorageConfig};

use crate::arena::EntityTable;
use crate::builder::MutableEntityStorage;
use crate::consistency;
use crate::entity::Entity;
use crate::error::ConsistencyError;
use crate::id::{EntityId, SymbolicEntityId};
use crate::index::Indexes;
use crate::mapping::{ExternalEntityMapping, ExternalMappingKey, MappingValue, Mappings};
use crate::schema::{EntitySchema, EntityTypeRef};
use crate::source::EntitySource;

/// Storage behaviour fixed when the first snapshot of a lineage is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageOptions {
    pub consistency_checks: ConsistencyChecks,
    pub page_size: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for StorageOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            consistency_checks: config.consistency_checks,
            page_size: config.effective_page_size(),
        }
    }
}

/// Identity shared by every snapshot and builder derived from one empty storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Lineage(u64);

impl Lineage {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tables behind a snapshot or a builder.
///
/// Cloning only bumps reference counts; builders copy individual pages and
/// index buckets on first write.
#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct StorageData {
    pub(crate) schema: Arc<EntitySchema>,
    pub(crate) entities: EntityTable,
    pub(crate) indexes: Indexes,
    pub(crate) mappings: Mappings,
    /// `None` once every id has been handed out.
    pub(crate) next_id: Option<EntityId>,
    pub(crate) options: StorageOptions,
    pub(crate) lineage: Lineage,
}

impl StorageData {
    pub(crate) fn empty(schema: Arc<EntitySchema>, options: StorageOptions) -> Self {
        let indexes = Indexes::new(schema.len());
        Self {
            entities: EntityTable::new(options.page_size),
            indexes,
            mappings: Mappings::default(),
            next_id: Some(EntityId::first()),
            options,
            schema,
            lineage: Lineage::fresh(),
        }
    }
}

/// Read operations shared by snapshots and builders.
///
/// Lookups never fail: unknown ids, types and names yield `None` or empty results.
pub trait EntityStorageRead {
    #[doc(hidden)]
    fn storage_data(&self) -> &StorageData;

    fn schema(&self) -> &Arc<EntitySchema> {
        &self.storage_data().schema
    }

    /// Entities of `entity_type` in insertion order.
    ///
    /// The iterator is lazy and can be restarted by calling `entities` again
    /// or cloning it.
    fn entities<T: EntityTypeRef>(&self, entity_type: T) -> Entities<'_> {
        let data = self.storage_data();
        let ids = entity_type
            .resolve_type(&data.schema)
            .and_then(|type_id| data.indexes.of_type(type_id))
            .map(|ids| ids.iter());
        Entities {
            ids,
            table: &data.entities,
        }
    }

    fn entity_count<T: EntityTypeRef>(&self, entity_type: T) -> usize {
        let data = self.storage_data();
        entity_type
            .resolve_type(&data.schema)
            .and_then(|type_id| data.indexes.of_type(type_id))
            .map_or(0, |ids| ids.len())
    }

    /// Total number of entities.
    fn len(&self) -> usize {
        self.storage_data().entities.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(&self, id: EntityId) -> Option<Entity> {
        self.storage_data().entities.get(id).cloned()
    }

    fn contains(&self, id: EntityId) -> bool {
        self.storage_data().entities.contains(id)
    }

    fn resolve_symbolic(&self, symbolic_id: &SymbolicEntityId) -> Option<Entity> {
        let data = self.storage_data();
        let id = data.indexes.symbolic(symbolic_id)?;
        data.entities.get(id).cloned()
    }

    fn contains_symbolic(&self, symbolic_id: &SymbolicEntityId) -> bool {
        self.storage_data().indexes.symbolic(symbolic_id).is_some()
    }

    /// Entities whose source satisfies `filter`, in id order.
    fn entities_by_source(&self, filter: impl Fn(&EntitySource) -> bool) -> Vec<Entity> {
        let data = self.storage_data();
        let mut ids: Vec<EntityId> = data
            .indexes
            .by_source
            .keys()
            .filter(|source| filter(source))
            .flat_map(|source| data.indexes.by_source.get(source))
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| data.entities.get(id).cloned())
            .collect()
    }

    /// Entities of `entity_type` holding a symbolic reference to `symbolic_id`, in id order.
    fn referrers<T: EntityTypeRef>(
        &self,
        symbolic_id: &SymbolicEntityId,
        entity_type: T,
    ) -> Vec<Entity> {
        let data = self.storage_data();
        let Some(type_id) = entity_type.resolve_type(&data.schema) else {
            return Vec::new();
        };
        let mut referrers: Vec<Entity> = data
            .indexes
            .soft_links
            .get(symbolic_id)
            .filter_map(|id| data.entities.get(id))
            .filter(|entity| entity.type_id() == type_id)
            .cloned()
            .collect();
        referrers.sort_unstable_by_key(Entity::id);
        referrers
    }

    /// Entities of `entity_type` whose reference field `field` points at `parent`, in id order.
    fn children<T: EntityTypeRef>(&self, parent: EntityId, entity_type: T, field: &str) -> Vec<Entity> {
        let data = self.storage_data();
        let Some(type_id) = entity_type.resolve_type(&data.schema) else {
            return Vec::new();
        };
        let mut children: Vec<Entity> = data
            .indexes
            .referrers
            .get(&parent)
            .filter_map(|id| data.entities.get(id))
            .filter(|entity| {
                entity.type_id() == type_id
                    && entity
                        .field(field)
                        .is_some_and(|value| value.referenced_ids().contains(&parent))
            })
            .cloned()
            .collect();
        children.sort_unstable_by_key(Entity::id);
        children
    }

    /// Read-only view of the mapping named by `key`; empty when nothing was stored under it.
    fn get_external_mapping<T: MappingValue>(
        &self,
        key: &ExternalMappingKey<T>,
    ) -> ExternalEntityMapping<'_, T> {
        ExternalEntityMapping::new(self.storage_data().mappings.table(key))
    }

    /// Names of mappings holding at least one entry.
    fn mapping_names(&self) -> Vec<&'static str> {
        self.storage_data().mappings.names().collect()
    }

    /// Verifies referential integrity and index agreement.
    fn check_consistency(&self) -> Result<(), ConsistencyError> {
        consistency::check(self.storage_data())
    }
}

/// Lazy iterator over the entities of one type.
#[derive(Clone)]
pub struct Entities<'a> {
    ids: Option<indexmap::set::Iter<'a, EntityId>>,
    table: &'a EntityTable,
}

impl Iterator for Entities<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let ids = self.ids.as_mut()?;
        ids.find_map(|id| self.table.get(*id).cloned())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.ids {
            Some(ids) => (0, Some(ids.len())),
            None => (0, Some(0)),
        }
    }
}

impl fmt::Debug for Entities<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entities")
            .field("remaining", &self.ids.as_ref().map_or(0, |ids| ids.len()))
            .finish()
    }
}

/// Immutable snapshot of the entity graph.
///
/// Snapshots are cheap to clone and safe to share across threads. They are
/// never modified; [`EntityStorage::to_builder`] starts a transaction that
/// produces a new snapshot.
#[derive(Clone)]
pub struct EntityStorage {
    data: Arc<StorageData>,
}

impl EntityStorage {
    pub fn empty(schema: Arc<EntitySchema>) -> Self {
        Self::with_options(schema, StorageOptions::default())
    }

    pub fn with_config(schema: Arc<EntitySchema>, config: &StorageConfig) -> Self {
        Self::with_options(schema, StorageOptions::from(config))
    }

    pub fn with_options(schema: Arc<EntitySchema>, options: StorageOptions) -> Self {
        Self::from_data(StorageData::empty(schema, options))
    }

    pub(crate) fn from_data(data: StorageData) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub(crate) fn data(&self) -> &StorageData {
        &self.data
    }

    /// Starts a builder on top of this snapshot.
    pub fn to_builder(&self) -> MutableEntityStorage {
        MutableEntityStorage::from_snapshot(self)
    }

    pub fn options(&self) -> StorageOptions {
        self.data.options
    }

    /// `true` when both handles refer to the same snapshot.
    pub fn ptr_eq(&self, other: &EntityStorage) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl EntityStorageRead for EntityStorage {
    fn storage_data(&self) -> &StorageData {
        &self.data
    }
}

impl fmt::Debug for EntityStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStorage")
            .field("entities", &self.data.entities.len())
            .field("next_id", &self.data.next_id)
            .field("mappings", &self.data.mappings)
            .finish()
    }
}
