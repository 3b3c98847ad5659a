//! Low-level edits on [`StorageData`] that keep the indexes and the change
//! log in step with the entity table.

use std::sync::Arc;

use indexmap::IndexSet;

use crate::changelog::ChangeLog;
use crate::entity::{Entity, EntityData};
use crate::error::{Result, StorageError, ValidationError};
use crate::id::{EntityId, EntityTypeId, SymbolicEntityId};
use crate::schema::{EntitySchema, EntityType, RefOwnership};
use crate::source::EntitySource;
use crate::storage::StorageData;
use crate::value::{FieldKind, FieldValue, Fields};

pub(crate) fn entity_type(
    schema: &EntitySchema,
    type_id: EntityTypeId,
) -> Result<&EntityType, ValidationError> {
    schema
        .entity_type(type_id)
        .ok_or_else(|| ValidationError::UnknownType {
            name: type_id.to_string(),
        })
}

/// Checks `fields` against `ty` and the references against the entities in `data`.
///
/// Symbolic id uniqueness is checked separately by [`check_symbolic_free`].
pub(crate) fn validate_fields(
    data: &StorageData,
    ty: &EntityType,
    fields: &Fields,
) -> Result<(), ValidationError> {
    for (name, value) in fields.iter() {
        let def = ty.field(name).ok_or_else(|| ValidationError::UnknownField {
            type_name: ty.name().to_owned(),
            field: name.to_owned(),
        })?;
        let Some(kind) = value.kind() else {
            continue;
        };
        if kind != def.kind() {
            return Err(ValidationError::KindMismatch {
                type_name: ty.name().to_owned(),
                field: name.to_owned(),
                expected: def.kind(),
            });
        }
        let Some(target_type) = def.target() else {
            continue;
        };
        if let FieldValue::Symbolic(symbolic_id) = value {
            if symbolic_id.type_id() != target_type {
                return Err(ValidationError::WrongSymbolicType {
                    type_name: ty.name().to_owned(),
                    field: name.to_owned(),
                    expected: data.schema.type_name(target_type),
                });
            }
            continue;
        }
        for target in value.referenced_ids() {
            let Some(referenced) = data.entities.get(*target) else {
                return Err(ValidationError::MissingReference {
                    type_name: ty.name().to_owned(),
                    field: name.to_owned(),
                    target: *target,
                });
            };
            if referenced.type_id() != target_type {
                return Err(ValidationError::WrongReferenceType {
                    type_name: ty.name().to_owned(),
                    field: name.to_owned(),
                    target: *target,
                    expected: data.schema.type_name(target_type),
                });
            }
        }
    }

    for def in ty.fields() {
        if def.is_required() && fields.value(def.name()).is_none() {
            return Err(ValidationError::MissingField {
                type_name: ty.name().to_owned(),
                field: def.name().to_owned(),
            });
        }
    }
    Ok(())
}

/// Fails when `symbolic_id` is taken by an entity other than `owner`.
pub(crate) fn check_symbolic_free(
    data: &StorageData,
    symbolic_id: &SymbolicEntityId,
    owner: Option<EntityId>,
) -> Result<(), ValidationError> {
    match data.indexes.symbolic(symbolic_id) {
        Some(existing) if Some(existing) != owner => Err(ValidationError::DuplicateSymbolicId {
            symbolic_id: symbolic_id.clone(),
            existing,
        }),
        _ => Ok(()),
    }
}

pub(crate) struct Edit<'a> {
    pub(crate) data: &'a mut StorageData,
    log: &'a mut ChangeLog,
}

impl<'a> Edit<'a> {
    pub(crate) fn new(data: &'a mut StorageData, log: &'a mut ChangeLog) -> Self {
        Self { data, log }
    }

    fn schema(&self) -> Arc<EntitySchema> {
        Arc::clone(&self.data.schema)
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&Entity> {
        self.data.entities.get(id)
    }

    pub(crate) fn allocate_id(&mut self) -> Result<EntityId> {
        let id = self.data.next_id.ok_or(StorageError::IdSpaceExhausted)?;
        self.data.next_id = id.next();
        Ok(id)
    }

    /// Validates and inserts a new entity under a fresh id.
    pub(crate) fn add(
        &mut self,
        type_id: EntityTypeId,
        fields: Fields,
        source: EntitySource,
    ) -> Result<EntityId> {
        let schema = self.schema();
        let ty = entity_type(&schema, type_id)?;
        validate_fields(self.data, ty, &fields)?;
        let symbolic_id = ty.symbolic_id(&fields);
        if let Some(symbolic_id) = &symbolic_id {
            check_symbolic_free(self.data, symbolic_id, None)?;
        }

        let id = self.allocate_id()?;
        self.insert_unchecked(Entity::new(EntityData {
            id,
            type_id,
            source,
            fields,
            symbolic_id,
            revision: 0,
        }));
        Ok(id)
    }

    pub(crate) fn insert_unchecked(&mut self, entity: Entity) {
        self.data.indexes.add(&entity);
        self.data.entities.put(entity.clone());
        self.log.added(entity);
    }

    /// Validates and stores a new version of `id`.
    ///
    /// Returns `None` when the data is unchanged. Symbolic references to the
    /// entity follow a change of its symbolic id.
    pub(crate) fn replace(
        &mut self,
        id: EntityId,
        fields: Fields,
        source: EntitySource,
    ) -> Result<Option<Entity>> {
        let old = self.get(id).cloned().ok_or(StorageError::NotFound { id })?;
        if old.fields() == &fields && old.source() == &source {
            return Ok(None);
        }
        let schema = self.schema();
        let ty = entity_type(&schema, old.type_id())?;
        validate_fields(self.data, ty, &fields)?;
        let symbolic_id = ty.symbolic_id(&fields);
        if let Some(symbolic_id) = &symbolic_id {
            check_symbolic_free(self.data, symbolic_id, Some(id))?;
        }

        let new = self.store_version(&old, fields, source, symbolic_id);
        if let (Some(from), Some(to)) = (old.symbolic_id(), new.symbolic_id()) {
            if from != to {
                self.retarget_soft_links(from, to);
            }
        }
        Ok(self.get(id).cloned())
    }

    /// Stores a new version of `id` without validation. Returns the stored version.
    pub(crate) fn replace_unchecked(
        &mut self,
        id: EntityId,
        fields: Fields,
        source: EntitySource,
    ) -> Option<Entity> {
        let old = self.get(id).cloned()?;
        if old.fields() == &fields && old.source() == &source {
            return Some(old);
        }
        let symbolic_id = self
            .data
            .schema
            .entity_type(old.type_id())
            .and_then(|ty| ty.symbolic_id(&fields));
        Some(self.store_version(&old, fields, source, symbolic_id))
    }

    fn store_version(
        &mut self,
        old: &Entity,
        fields: Fields,
        source: EntitySource,
        symbolic_id: Option<SymbolicEntityId>,
    ) -> Entity {
        let new = Entity::new(EntityData {
            id: old.id(),
            type_id: old.type_id(),
            source,
            fields,
            symbolic_id,
            revision: old.revision().saturating_add(1),
        });
        self.data.indexes.replace(old, &new);
        self.data.entities.put(new.clone());
        self.log.replaced(old.clone(), new.clone());
        new
    }

    fn retarget_soft_links(&mut self, from: &SymbolicEntityId, to: &SymbolicEntityId) {
        let referrers: Vec<EntityId> = self.data.indexes.soft_links.get(from).collect();
        for referrer in referrers {
            let Some(entity) = self.get(referrer).cloned() else {
                continue;
            };
            let mut fields = entity.fields().clone();
            for (_, value) in fields.values_mut() {
                if value.as_symbolic() == Some(from) {
                    *value = FieldValue::Symbolic(to.clone());
                }
            }
            self.replace_unchecked(referrer, fields, entity.source().clone());
        }
        tracing::trace!(
            target: "strata.storage",
            from = %from,
            to = %to,
            "retargeted symbolic references"
        );
    }

    /// Removes `id` with everything it owns and detaches the survivors that
    /// referenced removed entities. Returns the removed ids, `id` first.
    pub(crate) fn remove_cascading(&mut self, id: EntityId) -> Result<Vec<EntityId>> {
        if !self.data.entities.contains(id) {
            return Err(StorageError::NotFound { id });
        }
        let schema = self.schema();

        let mut doomed: IndexSet<EntityId> = IndexSet::new();
        doomed.insert(id);
        let mut next = 0;
        while let Some(current) = doomed.get_index(next).copied() {
            next += 1;
            let referrers: Vec<EntityId> = self.data.indexes.referrers.get(&current).collect();
            for referrer in referrers {
                let Some(entity) = self.get(referrer) else {
                    continue;
                };
                if owned_by(&schema, entity, current) {
                    doomed.insert(referrer);
                }
            }
        }

        let mut survivors: IndexSet<EntityId> = IndexSet::new();
        for removed in &doomed {
            for referrer in self.data.indexes.referrers.get(removed) {
                if !doomed.contains(&referrer) {
                    survivors.insert(referrer);
                }
            }
        }
        for survivor in survivors {
            let Some(entity) = self.get(survivor).cloned() else {
                continue;
            };
            let mut fields = entity.fields().clone();
            for (_, value) in fields.values_mut() {
                match value {
                    FieldValue::Ref(target) if doomed.contains(target) => *value = FieldValue::Null,
                    FieldValue::Refs(targets) => targets.retain(|target| !doomed.contains(target)),
                    _ => {}
                }
            }
            self.replace_unchecked(survivor, fields, entity.source().clone());
        }

        for removed in &doomed {
            if let Some(entity) = self.data.entities.remove(*removed) {
                self.data.indexes.remove(&entity);
                self.data.mappings.remove_entity(*removed);
                self.log.removed(entity);
            }
        }

        tracing::debug!(
            target: "strata.storage",
            id = %id,
            cascaded = doomed.len() - 1,
            "removed entity"
        );
        Ok(doomed.into_iter().collect())
    }
}

/// `true` when `entity` points at `target` through a reference that makes it a child of `target`.
fn owned_by(schema: &EntitySchema, entity: &Entity, target: EntityId) -> bool {
    let Some(ty) = schema.entity_type(entity.type_id()) else {
        return false;
    };
    ty.fields().iter().any(|def| {
        def.ownership() == RefOwnership::Owned
            && matches!(def.kind(), FieldKind::Ref | FieldKind::Refs)
            && entity
                .field(def.name())
                .is_some_and(|value| value.referenced_ids().contains(&target))
    })
}
