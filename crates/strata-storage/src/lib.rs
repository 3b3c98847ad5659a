//! Versioned entity storage for the workspace model.
//!
//! An [`EntityStorage`] is an immutable snapshot of typed entities. Edits go
//! through a [`MutableEntityStorage`] builder that shares all untouched data
//! with its base snapshot and turns into a new snapshot with
//! [`MutableEntityStorage::to_snapshot`]. Readers holding older snapshots are
//! never affected.
//!
//! Entity types are declared up front in an [`EntitySchema`]; every write is
//! validated against it, and removal cascades along reference fields declared
//! as [`RefOwnership::Owned`].

mod apply;
mod arena;
mod builder;
mod changelog;
mod consistency;
mod edit;
mod entity;
mod error;
mod id;
mod index;
mod mapping;
mod replace;
mod schema;
mod source;
mod storage;
mod value;

pub use builder::{EntityEditor, MutableEntityStorage};
pub use changelog::EntityChange;
pub use entity::Entity;
pub use error::{ConsistencyError, Result, StorageError, ValidationError};
pub use id::{EntityId, EntityTypeId, SymbolicEntityId};
pub use mapping::{
    ExternalEntityMapping, ExternalMappingKey, MappingValue, MutableExternalEntityMapping,
};
pub use replace::ReplaceSummary;
pub use schema::{
    EntitySchema, EntityType, EntityTypeDecl, EntityTypeRef, FieldDef, FieldSpec, RefOwnership,
    SchemaBuilder, SchemaError,
};
pub use source::EntitySource;
pub use storage::{Entities, EntityStorage, EntityStorageRead, StorageData, StorageOptions};
pub use value::{FieldKind, FieldValue, Fields};
