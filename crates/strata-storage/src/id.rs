use std::fmt;
use std::num::NonZeroU64;

/// Synthetic entity identifier.
///
/// Ids are allocated from 1 upwards and never reused within the lineage of
/// snapshots derived from one empty storage. An id stays valid across
/// modifications of its entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Returns `None` for the reserved raw value `0`.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub const fn to_raw(self) -> u64 {
        self.0.get()
    }

    /// Dense zero-based slot index.
    pub(crate) fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub(crate) fn first() -> Self {
        Self(NonZeroU64::MIN)
    }

    /// `None` once the id space is used up.
    pub(crate) fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of an entity type in its [`crate::EntitySchema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityTypeId(u16);

impl EntityTypeId {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u16 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Identity of an entity derived from its key fields rather than its id.
///
/// Symbolic ids survive removal and re-creation of an entity, which makes them
/// suitable for soft references between entities owned by different sources.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolicEntityId {
    type_id: EntityTypeId,
    key: Vec<String>,
}

impl SymbolicEntityId {
    pub fn new(type_id: EntityTypeId, key: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            type_id,
            key: key.into_iter().map(Into::into).collect(),
        }
    }

    pub fn type_id(&self) -> EntityTypeId {
        self.type_id
    }

    pub fn key(&self) -> &[String] {
        &self.key
    }
}

impl fmt::Display for SymbolicEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_id, self.key.join(", "))
    }
}
