//! Caller-side holder of the workspace entity storage.
//!
//! [`WorkspaceModel`] owns the current [`strata_storage::EntityStorage`]
//! snapshot, serialises writers and tells subscribers what changed after each
//! publish. [`project_model`] declares the entity types of an IDE project
//! (modules, content roots, libraries and dependencies between them).

mod error;
mod events;
mod model;
pub mod project_model;

pub use error::{Result, WorkspaceError};
pub use events::{SubscriptionId, VersionedStorageChange};
pub use model::WorkspaceModel;
