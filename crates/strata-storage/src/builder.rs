use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use strata_config::ConsistencyChecks;

use crate::changelog::{ChangeLog, EntityChange};
use crate::consistency;
use crate::edit::Edit;
use crate::entity::Entity;
use crate::error::{Result, StorageError, ValidationError};
use crate::id::{EntityId, EntityTypeId};
use crate::mapping::{ExternalMappingKey, MappingValue, MutableExternalEntityMapping};
use crate::schema::{EntitySchema, EntityTypeRef};
use crate::source::EntitySource;
use crate::storage::{EntityStorage, EntityStorageRead, StorageData, StorageOptions};
use crate::value::{FieldValue, Fields};

/// Copy-on-write transaction over an [`EntityStorage`] snapshot.
///
/// Reads see the base snapshot merged with every edit made so far. The base
/// snapshot is never touched: pages, index buckets and mapping tables are
/// copied on their first write. [`MutableEntityStorage::to_snapshot`] consumes
/// the builder; afterwards every mutation fails with
/// [`StorageError::IllegalState`] while reads keep working.
pub struct MutableEntityStorage {
    base: EntityStorage,
    pub(crate) state: StorageData,
    pub(crate) changelog: ChangeLog,
    pub(crate) modification_count: u64,
    pub(crate) mapping_writes: u64,
    consumed: bool,
}

impl MutableEntityStorage {
    /// Builder over an empty storage for `schema`.
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self::from_snapshot(&EntityStorage::empty(schema))
    }

    pub fn with_options(schema: Arc<EntitySchema>, options: StorageOptions) -> Self {
        Self::from_snapshot(&EntityStorage::with_options(schema, options))
    }

    pub fn from_snapshot(snapshot: &EntityStorage) -> Self {
        Self {
            base: snapshot.clone(),
            state: snapshot.data().clone(),
            changelog: ChangeLog::default(),
            modification_count: 0,
            mapping_writes: 0,
            consumed: false,
        }
    }

    /// Snapshot this builder was started from.
    pub fn base(&self) -> &EntityStorage {
        &self.base
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.consumed {
            return Err(StorageError::IllegalState { operation });
        }
        Ok(())
    }

    pub(crate) fn edit(&mut self) -> Edit<'_> {
        Edit::new(&mut self.state, &mut self.changelog)
    }

    /// Adds an entity of `entity_type` and returns its freshly allocated id.
    pub fn add_entity<T: EntityTypeRef>(
        &mut self,
        entity_type: T,
        fields: Fields,
        source: EntitySource,
    ) -> Result<EntityId> {
        self.ensure_open("add_entity")?;
        let type_id = entity_type.resolve_type(&self.state.schema).ok_or_else(|| {
            ValidationError::UnknownType {
                name: entity_type.describe(),
            }
        })?;
        let id = self.edit().add(type_id, fields, source)?;
        self.modification_count += 1;
        Ok(id)
    }

    /// Removes `id`, the entities it owns and their mapping entries.
    ///
    /// Returns every removed id, `id` first.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<Vec<EntityId>> {
        self.ensure_open("remove_entity")?;
        let removed = self.edit().remove_cascading(id)?;
        self.modification_count += 1;
        Ok(removed)
    }

    /// Applies `mutator` to a copy of the entity's data and stores the result
    /// as a new version. Returns the current version of the entity.
    pub fn modify_entity(
        &mut self,
        id: EntityId,
        mutator: impl FnOnce(&mut EntityEditor),
    ) -> Result<Entity> {
        self.ensure_open("modify_entity")?;
        let current = self.resolve(id).ok_or(StorageError::NotFound { id })?;
        let mut editor = EntityEditor {
            fields: current.fields().clone(),
            source: current.source().clone(),
        };
        mutator(&mut editor);

        match self.edit().replace(id, editor.fields, editor.source)? {
            Some(updated) => {
                self.modification_count += 1;
                Ok(updated)
            }
            None => Ok(current),
        }
    }

    /// Writable view of the mapping named by `key`.
    ///
    /// Fails with [`StorageError::MappingTypeMismatch`] when the name is already
    /// used for another value type.
    pub fn get_mutable_external_mapping<T: MappingValue>(
        &mut self,
        key: &ExternalMappingKey<T>,
    ) -> Result<MutableExternalEntityMapping<'_, T>> {
        self.ensure_open("get_mutable_external_mapping")?;
        let StorageData {
            entities, mappings, ..
        } = &mut self.state;
        let table = mappings.table_mut(key)?;
        Ok(MutableExternalEntityMapping::new(
            table,
            entities,
            &mut self.mapping_writes,
        ))
    }

    /// Turns the builder into a new immutable snapshot.
    ///
    /// With strict consistency checks a violation fails the call and leaves the
    /// builder usable.
    pub fn to_snapshot(&mut self) -> Result<EntityStorage> {
        self.ensure_open("to_snapshot")?;
        match self.state.options.consistency_checks {
            ConsistencyChecks::Off => {}
            ConsistencyChecks::Debug => {
                if let Err(err) = consistency::check(&self.state) {
                    tracing::error!(
                        target: "strata.storage",
                        error = %err,
                        "snapshot failed the consistency check"
                    );
                }
            }
            ConsistencyChecks::Strict => consistency::check(&self.state)?,
        }

        self.state.mappings.prune_empty();
        self.consumed = true;
        tracing::debug!(
            target: "strata.storage",
            entities = self.state.entities.len(),
            changes = self.changelog.len(),
            modifications = self.modification_count(),
            "created snapshot"
        );
        Ok(EntityStorage::from_data(self.state.clone()))
    }

    /// `true` when the builder differs from its base in entities or mapping writes.
    pub fn has_changes(&self) -> bool {
        !self.changelog.is_empty() || self.mapping_writes > 0
    }

    /// Number of successful mutating calls, mapping writes included.
    pub fn modification_count(&self) -> u64 {
        self.modification_count + self.mapping_writes
    }

    /// Net entity changes relative to the base snapshot, grouped by type.
    pub fn collect_changes(&self) -> BTreeMap<EntityTypeId, Vec<EntityChange>> {
        self.changelog.collect()
    }
}

impl EntityStorageRead for MutableEntityStorage {
    fn storage_data(&self) -> &StorageData {
        &self.state
    }
}

impl From<&EntityStorage> for MutableEntityStorage {
    fn from(snapshot: &EntityStorage) -> Self {
        Self::from_snapshot(snapshot)
    }
}

impl fmt::Debug for MutableEntityStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableEntityStorage")
            .field("entities", &self.state.entities.len())
            .field("changes", &self.changelog.len())
            .field("modification_count", &self.modification_count())
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// Working copy of one entity handed to [`MutableEntityStorage::modify_entity`].
#[derive(Debug)]
pub struct EntityEditor {
    fields: Fields,
    source: EntitySource,
}

impl EntityEditor {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.fields.remove(name);
        self
    }

    pub fn set_source(&mut self, source: EntitySource) -> &mut Self {
        self.source = source;
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn source(&self) -> &EntitySource {
        &self.source
    }
}
