use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use strata_storage::{
    EntityChange, EntityStorage, EntityStorageRead, EntityTypeId, EntityTypeRef,
};

/// One published transition of the workspace model.
#[derive(Clone)]
pub struct VersionedStorageChange {
    pub version: u64,
    pub description: Arc<str>,
    pub old: EntityStorage,
    pub new: EntityStorage,
    changes: Arc<BTreeMap<EntityTypeId, Vec<EntityChange>>>,
}

impl VersionedStorageChange {
    pub(crate) fn new(
        version: u64,
        description: Arc<str>,
        old: EntityStorage,
        new: EntityStorage,
        changes: BTreeMap<EntityTypeId, Vec<EntityChange>>,
    ) -> Self {
        Self {
            version,
            description,
            old,
            new,
            changes: Arc::new(changes),
        }
    }

    /// Changes of one entity type, removals first, then replacements, then additions.
    pub fn changes_of<T: EntityTypeRef>(&self, entity_type: T) -> &[EntityChange] {
        entity_type
            .resolve_type(self.new.schema())
            .and_then(|type_id| self.changes.get(&type_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_changes(&self) -> impl Iterator<Item = &EntityChange> {
        self.changes.values().flatten()
    }

    pub fn changed_types(&self) -> impl Iterator<Item = EntityTypeId> + '_ {
        self.changes.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl fmt::Debug for VersionedStorageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedStorageChange")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("changes", &self.all_changes().count())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`crate::WorkspaceModel::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscription#{}", self.0)
    }
}

type Listener = Arc<dyn Fn(&VersionedStorageChange) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.entries.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Calls every listener in subscription order.
    ///
    /// The list is copied first so listeners may subscribe or unsubscribe
    /// while being notified.
    pub(crate) fn notify(&self, event: &VersionedStorageChange, slow_threshold: Duration) {
        let listeners: Vec<(SubscriptionId, Listener)> = self.entries.read().clone();
        for (id, listener) in listeners {
            let started = Instant::now();
            listener(event);
            let elapsed = started.elapsed();
            if elapsed > slow_threshold {
                tracing::warn!(
                    target: "strata.workspace",
                    subscription = %id,
                    version = event.version,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow workspace change listener"
                );
            }
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}
