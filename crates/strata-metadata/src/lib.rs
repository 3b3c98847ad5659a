//! Structural type metadata for workspace entity types.
//!
//! Entity schemas describe themselves as [`StorageTypeMetadata`] trees and
//! register them in a [`MetadataRegistry`]. The registry is later consulted to
//! decide whether metadata persisted by another build is still compatible with
//! the types compiled into this one.

mod compare;
mod error;
mod hash;
mod model;
mod registry;

pub use compare::{compare_metadata, ComparisonResult};
pub use error::{MetadataError, Result};
pub use hash::{metadata_hash, MetadataHash};
pub use model::{
    AbstractClassMetadata, ConnectionType, EntityMetadata, ExtPropertyMetadata,
    FinalClassMetadata, OwnPropertyMetadata, StorageTypeMetadata, ValueTypeMetadata,
};
pub use registry::{
    CompatibilityReport, MetadataMismatch, MetadataProvider, MetadataRegistry, MetadataStorage,
    PersistedMetadata,
};
