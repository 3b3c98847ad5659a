use thiserror::Error;

use strata_metadata::MetadataError;
use strata_storage::StorageError;

pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The builder was derived from a snapshot that is no longer current and
    /// rebasing is disabled.
    #[error("builder is not based on the current workspace version {current}")]
    StaleBuilder { current: u64 },
}
