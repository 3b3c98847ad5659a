use thiserror::Error;

pub type Result<T, E = MetadataError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("metadata registry is frozen; cannot register `{fq_name}`")]
    Frozen { fq_name: String },

    #[error("conflicting metadata registered for `{fq_name}`")]
    Conflict { fq_name: String },

    #[error("conflicting metadata hash registered for `{fq_name}`")]
    HashConflict { fq_name: String },

    #[error("a process-wide metadata registry is already installed")]
    AlreadyInstalled,

    #[error("invalid persisted metadata: {message}")]
    Json { message: String },
}

impl From<serde_json::Error> for MetadataError {
    fn from(err: serde_json::Error) -> Self {
        MetadataError::Json {
            message: err.to_string(),
        }
    }
}
