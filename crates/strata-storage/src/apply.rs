//! Replaying one builder's changes onto another.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::MutableEntityStorage;
use crate::changelog::EntityChange;
use crate::edit::{check_symbolic_free, entity_type, validate_fields, Edit};
use crate::entity::{Entity, EntityData};
use crate::error::{Result, StorageError};
use crate::id::EntityId;
use crate::storage::StorageData;

impl MutableEntityStorage {
    /// Replays the net changes of `other` onto this builder.
    ///
    /// Entities removed or modified by `other` are removed or overwritten
    /// here when they still exist; entities added by `other` are added under
    /// fresh ids. External mapping writes are replayed the same way. The
    /// returned map translates ids of entities added by `other` to their ids
    /// in this builder.
    ///
    /// Both builders must descend from the same storage lineage. The call is
    /// all-or-nothing: if any replayed entity fails validation against this
    /// builder's state, nothing is applied.
    pub fn apply_changes_from(
        &mut self,
        other: &MutableEntityStorage,
    ) -> Result<HashMap<EntityId, EntityId>> {
        self.ensure_open("apply_changes_from")?;
        if !Arc::ptr_eq(&self.state.schema, &other.state.schema)
            && self.state.schema != other.state.schema
        {
            return Err(StorageError::SchemaMismatch);
        }
        if self.state.lineage != other.state.lineage {
            return Err(StorageError::LineageMismatch);
        }

        let mut state = self.state.clone();
        let mut log = self.changelog.clone();
        let mut edit = Edit::new(&mut state, &mut log);
        let changes: Vec<&EntityChange> = other.changelog.iter().collect();

        for change in &changes {
            if let EntityChange::Removed(entity) = change {
                if edit.get(entity.id()).is_some() {
                    edit.remove_cascading(entity.id())?;
                }
            }
        }

        let mut remap = HashMap::new();
        for change in &changes {
            if let EntityChange::Added(entity) = change {
                remap.insert(entity.id(), edit.allocate_id()?);
            }
        }
        let translate = |id: EntityId| remap.get(&id).copied().unwrap_or(id);

        let mut touched = Vec::new();
        for change in &changes {
            match change {
                EntityChange::Added(entity) => {
                    let id = translate(entity.id());
                    if let Some(symbolic_id) = entity.symbolic_id() {
                        check_symbolic_free(edit.data, symbolic_id, None)?;
                    }
                    edit.insert_unchecked(Entity::new(EntityData {
                        id,
                        type_id: entity.type_id(),
                        source: entity.source().clone(),
                        fields: entity.fields().map_refs(translate),
                        symbolic_id: entity.symbolic_id().cloned(),
                        revision: 0,
                    }));
                    touched.push(id);
                }
                EntityChange::Replaced { new, .. } => {
                    let id = new.id();
                    if edit.get(id).is_none() {
                        tracing::debug!(
                            target: "strata.storage",
                            id = %id,
                            "skipping modification of an entity removed in the target builder"
                        );
                        continue;
                    }
                    if let Some(symbolic_id) = new.symbolic_id() {
                        check_symbolic_free(edit.data, symbolic_id, Some(id))?;
                    }
                    edit.replace_unchecked(
                        id,
                        new.fields().map_refs(translate),
                        new.source().clone(),
                    );
                    touched.push(id);
                }
                EntityChange::Removed(_) => {}
            }
        }

        for id in touched {
            validate_entity(edit.data, id)?;
        }

        for (name, changed) in other.state.mappings.iter() {
            let base = other.base().data().mappings.get_erased(name);
            if other.base().data().mappings.shares_table(&other.state.mappings, name) {
                continue;
            }
            let StorageData {
                entities, mappings, ..
            } = &mut *edit.data;
            let live = |id: EntityId| Some(translate(id)).filter(|id| entities.contains(*id));
            if let Some(target) = mappings.get_or_insert_like(name, changed) {
                if !target.merge_diff(base, changed, &live) {
                    return Err(StorageError::MappingTypeMismatch {
                        name: name.to_owned(),
                    });
                }
            }
        }
        for (name, base) in other.base().data().mappings.iter() {
            if other.state.mappings.get_erased(name).is_some() {
                continue;
            }
            let emptied = base.empty_like();
            let StorageData {
                entities, mappings, ..
            } = &mut *edit.data;
            let live = |id: EntityId| Some(id).filter(|id| entities.contains(*id));
            if let Some(target) = mappings.get_or_insert_like(name, base) {
                target.merge_diff(Some(base), emptied.as_ref(), &live);
            }
        }

        drop(edit);
        let added = remap.len();
        self.state = state;
        self.changelog = log;
        self.modification_count += other.modification_count;
        self.mapping_writes += other.mapping_writes;
        tracing::debug!(
            target: "strata.storage",
            changes = changes.len(),
            added,
            "applied changes from another builder"
        );
        Ok(remap)
    }
}

fn validate_entity(data: &StorageData, id: EntityId) -> Result<()> {
    let Some(entity) = data.entities.get(id) else {
        return Ok(());
    };
    let ty = entity_type(&data.schema, entity.type_id())?;
    validate_fields(data, ty, entity.fields())?;
    Ok(())
}
