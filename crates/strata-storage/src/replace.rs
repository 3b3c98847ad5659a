//! Replacing every entity of some sources with the entities of another storage.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::builder::MutableEntityStorage;
use crate::edit::{check_symbolic_free, entity_type, validate_fields, Edit};
use crate::entity::{Entity, EntityData};
use crate::error::{Result, StorageError};
use crate::id::EntityId;
use crate::schema::{EntitySchema, RefOwnership};
use crate::source::EntitySource;
use crate::storage::{EntityStorageRead, StorageData};
use crate::value::{FieldValue, Fields};

/// Counts reported by [`MutableEntityStorage::replace_by_source`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub added: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Incoming entities dropped because a required reference could not be resolved.
    pub skipped: usize,
}

impl MutableEntityStorage {
    /// Makes the entities whose source satisfies `filter` equal to those of
    /// `replace_with` that satisfy it.
    ///
    /// Incoming entities are paired with existing ones by symbolic id, or,
    /// for types without one, by equal type, source and fields. Paired
    /// entities keep their id and are modified in place; unpaired incoming
    /// entities are added and unpaired existing ones are removed. References
    /// from incoming entities to entities outside the filter are resolved by
    /// symbolic id; unresolved optional references are cleared and entities
    /// with unresolved required references are skipped. Mapping entries of
    /// incoming entities are copied.
    pub fn replace_by_source(
        &mut self,
        filter: impl Fn(&EntitySource) -> bool,
        replace_with: &impl EntityStorageRead,
    ) -> Result<ReplaceSummary> {
        self.ensure_open("replace_by_source")?;
        let incoming_data = replace_with.storage_data();
        let schema = Arc::clone(&self.state.schema);
        if !Arc::ptr_eq(&schema, &incoming_data.schema) && schema != incoming_data.schema {
            return Err(StorageError::SchemaMismatch);
        }

        let local: Vec<Entity> = self.entities_by_source(&filter);
        let incoming: Vec<Entity> = replace_with.entities_by_source(&filter);
        let mut summary = ReplaceSummary::default();

        let mut state = self.state.clone();
        let mut log = self.changelog.clone();
        let mut edit = Edit::new(&mut state, &mut log);

        // Incoming id to the id the entity ends up with here.
        let mut targets: HashMap<EntityId, EntityId> = HashMap::new();
        let mut paired: HashSet<EntityId> = HashSet::new();
        for entity in &incoming {
            let Some(symbolic_id) = entity.symbolic_id() else {
                continue;
            };
            if let Some(existing) = edit.data.indexes.symbolic(symbolic_id) {
                targets.insert(entity.id(), existing);
                paired.insert(existing);
            }
        }

        let skipped = unresolvable(&schema, &incoming, &targets, incoming_data, edit.data);
        summary.skipped = skipped.len();

        let incoming_ids: HashSet<EntityId> = incoming.iter().map(Entity::id).collect();
        let mut fresh = Vec::new();
        for entity in &incoming {
            if skipped.contains(&entity.id()) || targets.contains_key(&entity.id()) {
                continue;
            }
            let resolved =
                resolve_fields(&schema, entity, &targets, &skipped, incoming_data, edit.data);
            let candidate = local.iter().find(|existing| {
                !paired.contains(&existing.id())
                    && existing.symbolic_id().is_none()
                    && existing.type_id() == entity.type_id()
                    && existing.source() == entity.source()
                    && resolved.as_ref() == Some(existing.fields())
            });
            match candidate {
                Some(existing) => {
                    targets.insert(entity.id(), existing.id());
                    paired.insert(existing.id());
                }
                None => {
                    let id = edit.allocate_id()?;
                    targets.insert(entity.id(), id);
                    fresh.push(id);
                }
            }
        }

        // Fresh entities are inserted first so that paired ones can point at them.
        let mut touched = Vec::new();
        let fresh: HashSet<EntityId> = fresh.into_iter().collect();
        for entity in &incoming {
            let Some(target) = targets.get(&entity.id()).copied() else {
                continue;
            };
            if !fresh.contains(&target) {
                continue;
            }
            let Some(fields) =
                resolve_fields(&schema, entity, &targets, &skipped, incoming_data, edit.data)
            else {
                summary.skipped += 1;
                continue;
            };
            if let Some(symbolic_id) = entity.symbolic_id() {
                check_symbolic_free(edit.data, symbolic_id, None)?;
            }
            edit.insert_unchecked(Entity::new(EntityData {
                id: target,
                type_id: entity.type_id(),
                source: entity.source().clone(),
                fields,
                symbolic_id: entity.symbolic_id().cloned(),
                revision: 0,
            }));
            touched.push(target);
            summary.added += 1;
        }
        for entity in &incoming {
            let Some(target) = targets.get(&entity.id()).copied() else {
                continue;
            };
            if fresh.contains(&target) {
                continue;
            }
            let Some(fields) =
                resolve_fields(&schema, entity, &targets, &skipped, incoming_data, edit.data)
            else {
                continue;
            };
            let Some(existing) = edit.get(target).cloned() else {
                continue;
            };
            if existing.fields() == &fields && existing.source() == entity.source() {
                summary.unchanged += 1;
                continue;
            }
            if let Some(symbolic_id) = entity.symbolic_id() {
                check_symbolic_free(edit.data, symbolic_id, Some(target))?;
            }
            edit.replace_unchecked(target, fields, entity.source().clone());
            touched.push(target);
            summary.modified += 1;
        }

        for existing in &local {
            if paired.contains(&existing.id()) || edit.get(existing.id()).is_none() {
                continue;
            }
            summary.removed += edit.remove_cascading(existing.id())?.len();
        }

        for id in touched {
            let Some(entity) = edit.get(id) else {
                continue;
            };
            let ty = entity_type(&schema, entity.type_id())?;
            validate_fields(edit.data, ty, entity.fields())?;
        }

        // Mappings of the incoming storage replace those of every entity it wrote.
        let written: Vec<(EntityId, EntityId)> = incoming
            .iter()
            .filter_map(|entity| {
                let target = targets.get(&entity.id()).copied()?;
                edit.data.entities.contains(target).then_some((entity.id(), target))
            })
            .collect();
        let names: Vec<&'static str> = edit.data.mappings.names().collect();
        for name in names {
            let incoming_table = incoming_data.mappings.get_erased(name);
            let stale: Vec<EntityId> = written
                .iter()
                .filter(|(id, _)| !incoming_table.is_some_and(|table| table.contains_entity(*id)))
                .map(|(_, target)| *target)
                .collect();
            edit.data.mappings.remove_entries(name, &stale);
        }

        for (name, table) in incoming_data.mappings.iter() {
            let StorageData {
                entities, mappings, ..
            } = &mut *edit.data;
            let translate = |id: EntityId| {
                if !incoming_ids.contains(&id) {
                    return None;
                }
                targets.get(&id).copied().filter(|id| entities.contains(*id))
            };
            if let Some(target) = mappings.get_or_insert_like(name, table) {
                if !target.merge_diff(None, table, &translate) {
                    return Err(StorageError::MappingTypeMismatch {
                        name: name.to_owned(),
                    });
                }
            }
        }

        drop(edit);
        self.state = state;
        self.changelog = log;
        self.modification_count += 1;
        tracing::debug!(
            target: "strata.storage",
            added = summary.added,
            modified = summary.modified,
            unchanged = summary.unchanged,
            removed = summary.removed,
            skipped = summary.skipped,
            "replaced entities by source"
        );
        Ok(summary)
    }
}

/// Where a reference held by an incoming entity points in the target storage.
fn resolve_ref(
    target: EntityId,
    targets: &HashMap<EntityId, EntityId>,
    skipped: &HashSet<EntityId>,
    incoming: &StorageData,
    local: &StorageData,
) -> Option<EntityId> {
    if skipped.contains(&target) {
        return None;
    }
    if let Some(mapped) = targets.get(&target) {
        return Some(*mapped);
    }
    let referenced = incoming.entities.get(target)?;
    match referenced.symbolic_id() {
        Some(symbolic_id) => local.indexes.symbolic(symbolic_id),
        None => local
            .entities
            .get(target)
            .filter(|existing| existing.has_equal_data(referenced))
            .map(Entity::id),
    }
}

/// Fields of an incoming entity with references translated, or `None` when
/// a required reference cannot be resolved.
fn resolve_fields(
    schema: &EntitySchema,
    entity: &Entity,
    targets: &HashMap<EntityId, EntityId>,
    skipped: &HashSet<EntityId>,
    incoming: &StorageData,
    local: &StorageData,
) -> Option<Fields> {
    let ty = schema.entity_type(entity.type_id())?;
    let mut fields = entity.fields().clone();
    for (name, value) in fields.values_mut() {
        match value {
            FieldValue::Ref(id) => {
                match resolve_ref(*id, targets, skipped, incoming, local) {
                    Some(resolved) => *id = resolved,
                    None => {
                        let def = ty.field(name)?;
                        if def.is_required() || def.ownership() == RefOwnership::Owned {
                            return None;
                        }
                        *value = FieldValue::Null;
                    }
                }
            }
            FieldValue::Refs(ids) => {
                *ids = ids
                    .iter()
                    .filter_map(|id| resolve_ref(*id, targets, skipped, incoming, local))
                    .collect();
            }
            _ => {}
        }
    }
    Some(fields)
}

/// Incoming entities that cannot be placed because a required reference
/// leads nowhere, directly or through another skipped entity.
fn unresolvable(
    schema: &EntitySchema,
    incoming: &[Entity],
    targets: &HashMap<EntityId, EntityId>,
    incoming_data: &StorageData,
    local: &StorageData,
) -> HashSet<EntityId> {
    let members: HashSet<EntityId> = incoming.iter().map(Entity::id).collect();
    let mut skipped = HashSet::new();
    loop {
        let before = skipped.len();
        for entity in incoming {
            if skipped.contains(&entity.id()) {
                continue;
            }
            let Some(ty) = schema.entity_type(entity.type_id()) else {
                skipped.insert(entity.id());
                continue;
            };
            let broken = ty.fields().iter().any(|def| {
                let detachable = !def.is_required() && def.ownership() == RefOwnership::Optional;
                let Some(target) = entity.get_ref(def.name()) else {
                    return false;
                };
                if detachable || (members.contains(&target) && !skipped.contains(&target)) {
                    return false;
                }
                resolve_ref(target, targets, &skipped, incoming_data, local).is_none()
            });
            if broken {
                tracing::warn!(
                    target: "strata.storage",
                    id = %entity.id(),
                    "skipping incoming entity with an unresolvable required reference"
                );
                skipped.insert(entity.id());
            }
        }
        if skipped.len() == before {
            return skipped;
        }
    }
}
