use std::fmt;
use std::sync::Arc;

use crate::id::{EntityId, EntityTypeId, SymbolicEntityId};
use crate::source::EntitySource;
use crate::value::{FieldValue, Fields};

#[derive(Clone, PartialEq, Eq)]
pub(crate) struct EntityData {
    pub(crate) id: EntityId,
    pub(crate) type_id: EntityTypeId,
    pub(crate) source: EntitySource,
    pub(crate) fields: Fields,
    pub(crate) symbolic_id: Option<SymbolicEntityId>,
    pub(crate) revision: u32,
}

/// One immutable version of an entity.
///
/// Cloning is cheap; every clone shares the same version. Modifying an entity
/// through a builder produces a new version with the same id and a higher
/// [`Entity::revision`].
#[derive(Clone, PartialEq, Eq)]
pub struct Entity(Arc<EntityData>);

impl Entity {
    pub(crate) fn new(data: EntityData) -> Self {
        Self(Arc::new(data))
    }

    pub fn id(&self) -> EntityId {
        self.0.id
    }

    pub fn type_id(&self) -> EntityTypeId {
        self.0.type_id
    }

    pub fn source(&self) -> &EntitySource {
        &self.0.source
    }

    pub fn fields(&self) -> &Fields {
        &self.0.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.0.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.fields.get_str(name)
    }

    pub fn get_ref(&self, name: &str) -> Option<EntityId> {
        self.0.fields.get_ref(name)
    }

    pub fn symbolic_id(&self) -> Option<&SymbolicEntityId> {
        self.0.symbolic_id.as_ref()
    }

    /// Number of modifications since the entity was added.
    pub fn revision(&self) -> u32 {
        self.0.revision
    }

    /// `true` when both handles point at the same version.
    pub fn same_version(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Same type, source and fields, ignoring id and revision.
    pub fn has_equal_data(&self, other: &Entity) -> bool {
        self.0.type_id == other.0.type_id
            && self.0.source == other.0.source
            && self.0.fields == other.0.fields
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.0.id)
            .field("type_id", &self.0.type_id)
            .field("source", &self.0.source)
            .field("revision", &self.0.revision)
            .field("fields", &self.0.fields)
            .finish()
    }
}
