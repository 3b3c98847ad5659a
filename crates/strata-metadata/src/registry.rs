use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strata_config::{MetadataConfig, MetadataConflictPolicy};

use crate::compare::{compare_metadata, ComparisonResult};
use crate::error::{MetadataError, Result};
use crate::hash::{metadata_hash, MetadataHash};
use crate::model::StorageTypeMetadata;

/// Read access to registered type metadata.
pub trait MetadataStorage {
    /// Looks up a descriptor by fully-qualified name. Absent names are `None`.
    fn get_metadata_by_type_fqn_or_null(&self, fq_name: &str) -> Option<Arc<StorageTypeMetadata>>;

    /// Hash registered for `fq_name` via [`MetadataRegistry::add_metadata_hash`].
    fn get_hash_by_fqn(&self, fq_name: &str) -> Option<MetadataHash>;
}

/// A module that contributes type descriptors during the registration phase.
pub trait MetadataProvider {
    fn initialize_metadata(&self, registry: &MetadataRegistry) -> Result<()>;
}

/// Process-wide table of type descriptors keyed by fully-qualified name.
///
/// The registry has two phases. During registration every module calls
/// [`MetadataRegistry::add_metadata`]; [`MetadataRegistry::freeze`] ends that
/// phase and later registrations fail with [`MetadataError::Frozen`]. Reads are
/// allowed in both phases.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    inner: RwLock<RegistryInner>,
    on_conflict: MetadataConflictPolicy,
}

#[derive(Debug, Default)]
struct RegistryInner {
    types: BTreeMap<String, Arc<StorageTypeMetadata>>,
    hashes: BTreeMap<String, MetadataHash>,
    frozen: bool,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &MetadataConfig) -> Self {
        Self {
            inner: RwLock::default(),
            on_conflict: config.on_conflict,
        }
    }

    /// Builds a registry from `providers` in order, freezing it afterwards when
    /// `config.freeze_on_load` is set.
    pub fn from_providers(
        providers: &[&dyn MetadataProvider],
        config: &MetadataConfig,
    ) -> Result<Self> {
        let registry = Self::with_config(config);
        for provider in providers {
            provider.initialize_metadata(&registry)?;
        }
        if config.freeze_on_load {
            registry.freeze();
        }
        tracing::debug!(
            target: "strata.metadata",
            providers = providers.len(),
            types = registry.len(),
            frozen = registry.is_frozen(),
            "metadata registry loaded"
        );
        Ok(registry)
    }

    /// Returns the process-wide registry, creating an empty one if none was installed.
    pub fn global() -> &'static MetadataRegistry {
        GLOBAL.get_or_init(MetadataRegistry::new)
    }

    /// Installs `registry` as the process-wide registry.
    ///
    /// Fails when a registry is already installed, including the implicit one
    /// created by an earlier [`MetadataRegistry::global`] call.
    pub fn install_global(registry: MetadataRegistry) -> Result<&'static MetadataRegistry> {
        let mut installed = false;
        let global = GLOBAL.get_or_init(|| {
            installed = true;
            registry
        });
        if installed {
            Ok(global)
        } else {
            Err(MetadataError::AlreadyInstalled)
        }
    }

    /// Registers `metadata` and every descriptor nested in it.
    ///
    /// Registering an identical descriptor twice is a no-op. A full descriptor
    /// replaces a `KnownClass` placeholder and a placeholder never replaces a
    /// full descriptor. Any other difference is a conflict, handled according
    /// to the configured [`MetadataConflictPolicy`]. Nothing is inserted when
    /// the call fails.
    pub fn add_metadata(&self, metadata: StorageTypeMetadata) -> Result<()> {
        let fq_name = metadata.fq_name().to_owned();
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(MetadataError::Frozen { fq_name });
        }

        let mut pending: BTreeMap<String, StorageTypeMetadata> = BTreeMap::new();
        for nested in metadata.flatten() {
            let name = nested.fq_name().to_owned();
            let existing = pending
                .get(&name)
                .or_else(|| inner.types.get(&name).map(|arc| arc.as_ref()));
            let Some(existing) = existing else {
                pending.insert(name, nested);
                continue;
            };
            match merge(existing, &nested) {
                Merge::Keep => {}
                Merge::Replace => {
                    pending.insert(name, nested);
                }
                Merge::Conflict => match self.on_conflict {
                    MetadataConflictPolicy::Error => {
                        return Err(MetadataError::Conflict { fq_name: name });
                    }
                    MetadataConflictPolicy::FirstWins => {
                        tracing::warn!(
                            target: "strata.metadata",
                            fq_name = %name,
                            "conflicting metadata ignored; keeping the first registration"
                        );
                    }
                },
            }
        }

        for (name, nested) in pending {
            tracing::trace!(target: "strata.metadata", fq_name = %name, "registered type metadata");
            inner.types.insert(name, Arc::new(nested));
        }
        Ok(())
    }

    /// Records the hash generated for `type_fqn` by the build that declared it.
    pub fn add_metadata_hash(&self, type_fqn: impl Into<String>, hash: MetadataHash) -> Result<()> {
        let type_fqn = type_fqn.into();
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(MetadataError::Frozen { fq_name: type_fqn });
        }
        match inner.hashes.get(&type_fqn) {
            Some(existing) if *existing == hash => Ok(()),
            Some(_) => match self.on_conflict {
                MetadataConflictPolicy::Error => {
                    Err(MetadataError::HashConflict { fq_name: type_fqn })
                }
                MetadataConflictPolicy::FirstWins => {
                    tracing::warn!(
                        target: "strata.metadata",
                        fq_name = %type_fqn,
                        "conflicting metadata hash ignored; keeping the first registration"
                    );
                    Ok(())
                }
            },
            None => {
                inner.hashes.insert(type_fqn, hash);
                Ok(())
            }
        }
    }

    /// Ends the registration phase. Idempotent.
    pub fn freeze(&self) {
        self.inner.write().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.read().frozen
    }

    pub fn len(&self) -> usize {
        self.inner.read().types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().types.is_empty()
    }

    /// Registered names in lexicographic order.
    pub fn fq_names(&self) -> Vec<String> {
        self.inner.read().types.keys().cloned().collect()
    }

    /// Registered hash for `fq_name`, or the hash computed from its descriptor.
    pub fn effective_hash(&self, fq_name: &str) -> Option<MetadataHash> {
        let inner = self.inner.read();
        inner
            .hashes
            .get(fq_name)
            .copied()
            .or_else(|| inner.types.get(fq_name).map(|meta| metadata_hash(meta)))
    }

    /// Copies the registry contents into a serializable listing.
    pub fn export(&self) -> PersistedMetadata {
        let inner = self.inner.read();
        let types: Vec<StorageTypeMetadata> =
            inner.types.values().map(|meta| meta.as_ref().clone()).collect();
        let hashes = inner
            .types
            .iter()
            .map(|(name, meta)| {
                let hash = inner
                    .hashes
                    .get(name)
                    .copied()
                    .unwrap_or_else(|| metadata_hash(meta));
                (name.clone(), hash)
            })
            .collect();
        PersistedMetadata { types, hashes }
    }

    /// Compares every persisted descriptor against the registered one.
    ///
    /// Types whose hashes agree are accepted without a structural comparison.
    pub fn check_compatibility(&self, persisted: &PersistedMetadata) -> CompatibilityReport {
        let mut report = CompatibilityReport::default();
        for cached in &persisted.types {
            let fq_name = cached.fq_name();
            let Some(current) = self.get_metadata_by_type_fqn_or_null(fq_name) else {
                report.missing.push(fq_name.to_owned());
                continue;
            };
            let hashes_match = matches!(
                (persisted.hashes.get(fq_name), self.effective_hash(fq_name)),
                (Some(cached_hash), Some(current_hash)) if *cached_hash == current_hash
            );
            if hashes_match {
                continue;
            }
            if let ComparisonResult::NotEqual(reason) = compare_metadata(cached, &current) {
                report.mismatches.push(MetadataMismatch {
                    fq_name: fq_name.to_owned(),
                    reason,
                });
            }
        }
        if !report.is_compatible() {
            tracing::info!(
                target: "strata.metadata",
                missing = report.missing.len(),
                mismatches = report.mismatches.len(),
                "persisted metadata is not compatible with the current build"
            );
        }
        report
    }
}

static GLOBAL: OnceLock<MetadataRegistry> = OnceLock::new();

impl MetadataStorage for MetadataRegistry {
    fn get_metadata_by_type_fqn_or_null(&self, fq_name: &str) -> Option<Arc<StorageTypeMetadata>> {
        self.inner.read().types.get(fq_name).cloned()
    }

    fn get_hash_by_fqn(&self, fq_name: &str) -> Option<MetadataHash> {
        self.inner.read().hashes.get(fq_name).copied()
    }
}

enum Merge {
    Keep,
    Replace,
    Conflict,
}

fn merge(existing: &StorageTypeMetadata, incoming: &StorageTypeMetadata) -> Merge {
    if existing == incoming || incoming.is_placeholder() {
        Merge::Keep
    } else if existing.is_placeholder() {
        Merge::Replace
    } else {
        Merge::Conflict
    }
}

/// Registry contents as written next to a persisted storage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMetadata {
    pub types: Vec<StorageTypeMetadata>,
    #[serde(default)]
    pub hashes: BTreeMap<String, MetadataHash>,
}

impl PersistedMetadata {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataMismatch {
    pub fq_name: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompatibilityReport {
    /// Persisted types the current build no longer declares.
    pub missing: Vec<String>,
    pub mismatches: Vec<MetadataMismatch>,
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        self.missing.is_empty() && self.mismatches.is_empty()
    }
}
