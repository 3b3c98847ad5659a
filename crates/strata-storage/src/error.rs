use thiserror::Error;

use crate::id::{EntityId, SymbolicEntityId};
use crate::schema::SchemaError;
use crate::value::FieldKind;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("entity {id} does not exist in this storage")]
    NotFound { id: EntityId },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cannot {operation}: the builder was already turned into a snapshot")]
    IllegalState { operation: &'static str },

    #[error("consistency check failed: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("external mapping `{name}` holds values of a different type")]
    MappingTypeMismatch { name: String },

    #[error("storages were created from different schemas")]
    SchemaMismatch,

    #[error("builders do not descend from the same storage")]
    LineageMismatch,

    #[error("no entity ids are left to allocate")]
    IdSpaceExhausted,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Why an entity value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown entity type `{name}`")]
    UnknownType { name: String },

    #[error("`{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },

    #[error("required field `{type_name}.{field}` is missing")]
    MissingField { type_name: String, field: String },

    #[error("field `{type_name}.{field}` expects a {expected} value")]
    KindMismatch {
        type_name: String,
        field: String,
        expected: FieldKind,
    },

    #[error("field `{type_name}.{field}` references missing entity {target}")]
    MissingReference {
        type_name: String,
        field: String,
        target: EntityId,
    },

    #[error("field `{type_name}.{field}` references {target}, which is not a `{expected}`")]
    WrongReferenceType {
        type_name: String,
        field: String,
        target: EntityId,
        expected: String,
    },

    #[error("field `{type_name}.{field}` holds a symbolic id of another type than `{expected}`")]
    WrongSymbolicType {
        type_name: String,
        field: String,
        expected: String,
    },

    #[error("symbolic id {symbolic_id} is already used by entity {existing}")]
    DuplicateSymbolicId {
        symbolic_id: SymbolicEntityId,
        existing: EntityId,
    },
}

/// First invariant violation found by a consistency check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("entity {id} is invalid: {source}")]
    InvalidEntity {
        id: EntityId,
        #[source]
        source: ValidationError,
    },

    #[error("{index} index disagrees with the entity table at {id}")]
    IndexMismatch { index: &'static str, id: EntityId },

    #[error("external mapping `{mapping}` has an entry for missing entity {id}")]
    MappingForMissingEntity { mapping: String, id: EntityId },
}
