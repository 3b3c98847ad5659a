//! Full scan verifying that the entity table, the indexes and the mappings agree.

use crate::edit::{entity_type, validate_fields};
use crate::error::ConsistencyError;
use crate::storage::StorageData;

pub(crate) fn check(data: &StorageData) -> Result<(), ConsistencyError> {
    for entity in data.entities.iter() {
        let id = entity.id();
        if data.next_id.is_some_and(|next| id >= next) {
            return Err(ConsistencyError::IndexMismatch {
                index: "next_id",
                id,
            });
        }
        let ty = entity_type(&data.schema, entity.type_id())
            .map_err(|source| ConsistencyError::InvalidEntity { id, source })?;
        validate_fields(data, ty, entity.fields())
            .map_err(|source| ConsistencyError::InvalidEntity { id, source })?;

        if !data
            .indexes
            .of_type(entity.type_id())
            .is_some_and(|ids| ids.contains(&id))
        {
            return Err(ConsistencyError::IndexMismatch { index: "type", id });
        }
        if !data.indexes.by_source.contains(entity.source(), id) {
            return Err(ConsistencyError::IndexMismatch {
                index: "source",
                id,
            });
        }
        for target in entity.fields().referenced_ids() {
            if !data.indexes.referrers.contains(&target, id) {
                return Err(ConsistencyError::IndexMismatch {
                    index: "referrers",
                    id,
                });
            }
        }
        for target in entity.fields().symbolic_refs() {
            if !data.indexes.soft_links.contains(target, id) {
                return Err(ConsistencyError::IndexMismatch {
                    index: "soft_links",
                    id,
                });
            }
        }

        let expected = ty.symbolic_id(entity.fields());
        if entity.symbolic_id() != expected.as_ref() {
            return Err(ConsistencyError::IndexMismatch {
                index: "symbolic",
                id,
            });
        }
        if let Some(symbolic_id) = entity.symbolic_id() {
            if data.indexes.symbolic(symbolic_id) != Some(id) {
                return Err(ConsistencyError::IndexMismatch {
                    index: "symbolic",
                    id,
                });
            }
        }
    }

    // Reverse direction: every index entry names a live entity that agrees with it.
    for (type_id, ids) in data.indexes.types() {
        for id in ids {
            if data.entities.get(*id).map(|entity| entity.type_id()) != Some(type_id) {
                return Err(ConsistencyError::IndexMismatch {
                    index: "type",
                    id: *id,
                });
            }
        }
    }
    for (source, id) in data.indexes.by_source.iter() {
        if data.entities.get(id).map(|entity| entity.source()) != Some(source) {
            return Err(ConsistencyError::IndexMismatch {
                index: "source",
                id,
            });
        }
    }
    for (target, id) in data.indexes.referrers.iter() {
        let holds = data
            .entities
            .get(id)
            .is_some_and(|entity| entity.fields().referenced_ids().any(|held| held == *target));
        if !holds {
            return Err(ConsistencyError::IndexMismatch {
                index: "referrers",
                id,
            });
        }
    }
    for (target, id) in data.indexes.soft_links.iter() {
        let holds = data
            .entities
            .get(id)
            .is_some_and(|entity| entity.fields().symbolic_refs().any(|held| held == target));
        if !holds {
            return Err(ConsistencyError::IndexMismatch {
                index: "soft_links",
                id,
            });
        }
    }
    for (symbolic_id, id) in data.indexes.symbolic_entries() {
        if data.entities.get(id).and_then(|entity| entity.symbolic_id()) != Some(symbolic_id) {
            return Err(ConsistencyError::IndexMismatch {
                index: "symbolic",
                id,
            });
        }
    }

    for (name, table) in data.mappings.iter() {
        if let Some(id) = table
            .entity_ids()
            .into_iter()
            .find(|id| !data.entities.contains(*id))
        {
            return Err(ConsistencyError::MappingForMissingEntity {
                mapping: name.to_owned(),
                id,
            });
        }
    }

    Ok(())
}
