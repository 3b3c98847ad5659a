use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use strata_config::{StrataConfig, WorkspaceConfig};
use strata_metadata::{MetadataProvider, MetadataRegistry};
use strata_storage::{
    EntitySchema, EntitySource, EntityStorage, EntityStorageRead, MutableEntityStorage,
    ReplaceSummary, StorageError, StorageOptions,
};

use crate::error::{Result, WorkspaceError};
use crate::events::{Listeners, SubscriptionId, VersionedStorageChange};

/// Holder of the current entity storage snapshot.
///
/// Readers call [`WorkspaceModel::current`] and keep the returned snapshot for
/// as long as they like; it never changes underneath them. Writers are
/// serialised: [`WorkspaceModel::update`] and [`WorkspaceModel::commit`] hold a
/// writer lock while the new snapshot is built, then publish it with a single
/// swap.
///
/// Change listeners run on the committing thread while the writer lock is
/// held, in publish order. A listener must not write to the same model.
pub struct WorkspaceModel {
    schema: Arc<EntitySchema>,
    config: WorkspaceConfig,
    published: RwLock<Published>,
    writer: Mutex<()>,
    listeners: Listeners,
}

struct Published {
    storage: EntityStorage,
    version: u64,
}

impl WorkspaceModel {
    /// Creates a model holding an empty storage (version 0).
    pub fn new(schema: Arc<EntitySchema>, config: &StrataConfig) -> Self {
        let storage = EntityStorage::with_options(schema, StorageOptions::from(&config.storage));
        Self::with_storage(storage, &config.workspace)
    }

    /// Creates a model whose version 0 is `storage`.
    pub fn with_storage(storage: EntityStorage, config: &WorkspaceConfig) -> Self {
        Self {
            schema: storage.schema().clone(),
            config: config.clone(),
            published: RwLock::new(Published {
                storage,
                version: 0,
            }),
            writer: Mutex::new(()),
            listeners: Listeners::default(),
        }
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// The latest published snapshot.
    pub fn current(&self) -> EntityStorage {
        self.published.read().storage.clone()
    }

    /// Number of snapshots published since the model was created.
    pub fn version(&self) -> u64 {
        self.published.read().version
    }

    /// Opens a builder on the current snapshot without taking the writer lock.
    ///
    /// Hand the builder back through [`WorkspaceModel::commit`]. If another
    /// writer publishes first, the builder's changes are rebased onto the newer
    /// snapshot (or rejected when `rebase_stale_builders` is off).
    pub fn begin(&self) -> MutableEntityStorage {
        self.current().to_builder()
    }

    /// Runs `f` against a builder of the current snapshot and publishes the result.
    ///
    /// The writer lock is held for the whole call, so the builder can never go
    /// stale. When `f` fails, the builder is dropped and nothing is published.
    pub fn update<R>(
        &self,
        description: &str,
        f: impl FnOnce(&mut MutableEntityStorage) -> Result<R>,
    ) -> Result<R> {
        let _writer = self.writer.lock();
        let current = self.current();
        let mut builder = current.to_builder();
        let value = f(&mut builder)?;
        self.publish_locked(description, current, builder)?;
        Ok(value)
    }

    /// Publishes the changes collected in `builder` and returns the resulting snapshot.
    ///
    /// A builder without changes publishes nothing and returns the current
    /// snapshot.
    pub fn commit(
        &self,
        description: &str,
        builder: MutableEntityStorage,
    ) -> Result<EntityStorage> {
        if builder.is_consumed() {
            return Err(StorageError::IllegalState {
                operation: "commit",
            }
            .into());
        }

        let _writer = self.writer.lock();
        let (current, version) = {
            let published = self.published.read();
            (published.storage.clone(), published.version)
        };

        let builder = if builder.base().ptr_eq(&current) {
            builder
        } else if self.config.rebase_stale_builders {
            let mut rebased = current.to_builder();
            let remapped = rebased.apply_changes_from(&builder)?;
            tracing::debug!(
                target: "strata.workspace",
                description,
                version,
                remapped = remapped.len(),
                "rebased stale builder onto the current snapshot"
            );
            rebased
        } else {
            return Err(WorkspaceError::StaleBuilder { current: version });
        };

        self.publish_locked(description, current, builder)
    }

    /// Replaces every entity whose source matches `filter` with the matching
    /// entities of `replace_with`, as one published transaction.
    pub fn replace_by_source(
        &self,
        description: &str,
        filter: impl Fn(&EntitySource) -> bool,
        replace_with: &impl EntityStorageRead,
    ) -> Result<ReplaceSummary> {
        self.update(description, |builder| {
            Ok(builder.replace_by_source(filter, replace_with)?)
        })
    }

    /// Registers `listener` for every future publish.
    pub fn subscribe(
        &self,
        listener: impl Fn(&VersionedStorageChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.listeners.add(Arc::new(listener))
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    /// Adds the metadata of every entity type of this model's schema to `registry`.
    pub fn register_metadata(&self, registry: &MetadataRegistry) -> Result<()> {
        self.schema.initialize_metadata(registry)?;
        Ok(())
    }

    fn publish_locked(
        &self,
        description: &str,
        old: EntityStorage,
        mut builder: MutableEntityStorage,
    ) -> Result<EntityStorage> {
        if !builder.has_changes() {
            tracing::debug!(target: "strata.workspace", description, "nothing to publish");
            return Ok(old);
        }

        let changes = builder.collect_changes();
        let new = builder.to_snapshot()?;
        let version = {
            let mut published = self.published.write();
            published.storage = new.clone();
            published.version += 1;
            published.version
        };
        tracing::debug!(
            target: "strata.workspace",
            description,
            version,
            entities = new.len(),
            modifications = builder.modification_count(),
            "published workspace snapshot"
        );

        let event = VersionedStorageChange::new(
            version,
            Arc::from(description),
            old,
            new.clone(),
            changes,
        );
        self.listeners
            .notify(&event, Duration::from_millis(self.config.slow_listener_ms));
        Ok(new)
    }
}

impl fmt::Debug for WorkspaceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let published = self.published.read();
        f.debug_struct("WorkspaceModel")
            .field("version", &published.version)
            .field("entities", &published.storage.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}
