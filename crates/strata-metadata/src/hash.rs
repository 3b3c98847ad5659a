use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::StorageTypeMetadata;

/// Stable fingerprint of a type descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataHash(u64);

impl MetadataHash {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MetadataHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hashes the canonical JSON form of `metadata`.
///
/// The first eight bytes of the SHA-256 digest are used; property and
/// subclass order is significant.
pub fn metadata_hash(metadata: &StorageTypeMetadata) -> MetadataHash {
    let mut hasher = Sha256::new();
    // Serializing plain data into a `Vec` cannot fail.
    match serde_json::to_vec(metadata) {
        Ok(bytes) => hasher.update(&bytes),
        Err(_) => hasher.update(metadata.fq_name().as_bytes()),
    }
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    MetadataHash(u64::from_be_bytes(prefix))
}
