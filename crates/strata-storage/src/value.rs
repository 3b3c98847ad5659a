use std::collections::BTreeMap;
use std::fmt;

use crate::id::{EntityId, SymbolicEntityId};

/// Declared kind of an entity field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int,
    String,
    Strings,
    /// Hard reference to another entity in the same storage.
    Ref,
    /// Ordered list of hard references.
    Refs,
    /// Soft reference by symbolic id; the target may be absent.
    Symbolic,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::String => "string",
            FieldKind::Strings => "string list",
            FieldKind::Ref => "reference",
            FieldKind::Refs => "reference list",
            FieldKind::Symbolic => "symbolic reference",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Strings(Vec<String>),
    Ref(EntityId),
    Refs(Vec<EntityId>),
    Symbolic(SymbolicEntityId),
}

impl FieldValue {
    /// `None` for [`FieldValue::Null`], which fits any nullable field.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(_) => Some(FieldKind::Bool),
            FieldValue::Int(_) => Some(FieldKind::Int),
            FieldValue::String(_) => Some(FieldKind::String),
            FieldValue::Strings(_) => Some(FieldKind::Strings),
            FieldValue::Ref(_) => Some(FieldKind::Ref),
            FieldValue::Refs(_) => Some(FieldKind::Refs),
            FieldValue::Symbolic(_) => Some(FieldKind::Symbolic),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            FieldValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_symbolic(&self) -> Option<&SymbolicEntityId> {
        match self {
            FieldValue::Symbolic(id) => Some(id),
            _ => None,
        }
    }

    /// Hard references held by this value.
    pub fn referenced_ids(&self) -> &[EntityId] {
        match self {
            FieldValue::Ref(id) => std::slice::from_ref(id),
            FieldValue::Refs(ids) => ids,
            _ => &[],
        }
    }

    /// Rewrites every hard reference through `remap`.
    pub(crate) fn map_refs(&self, remap: &mut impl FnMut(EntityId) -> EntityId) -> FieldValue {
        match self {
            FieldValue::Ref(id) => FieldValue::Ref(remap(*id)),
            FieldValue::Refs(ids) => FieldValue::Refs(ids.iter().map(|id| remap(*id)).collect()),
            other => other.clone(),
        }
    }

    /// Key-field rendering used in symbolic ids.
    pub(crate) fn key_text(&self) -> Option<String> {
        match self {
            FieldValue::String(value) => Some(value.clone()),
            FieldValue::Int(value) => Some(value.to_string()),
            FieldValue::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::Strings(value)
    }
}

impl From<EntityId> for FieldValue {
    fn from(value: EntityId) -> Self {
        FieldValue::Ref(value)
    }
}

impl From<Vec<EntityId>> for FieldValue {
    fn from(value: Vec<EntityId>) -> Self {
        FieldValue::Refs(value)
    }
}

impl From<SymbolicEntityId> for FieldValue {
    fn from(value: SymbolicEntityId) -> Self {
        FieldValue::Symbolic(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Field values of one entity, keyed by field name.
///
/// Absent fields and fields set to [`FieldValue::Null`] are equivalent for
/// validation; `Fields` stores whatever the caller provided.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Fields::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// The value of `name`, treating `Null` as absent.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn get_ref(&self, name: &str) -> Option<EntityId> {
        self.get(name).and_then(FieldValue::as_ref_id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every hard reference held by any field, in field order.
    pub fn referenced_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.0
            .values()
            .flat_map(|value| value.referenced_ids().iter().copied())
    }

    pub fn symbolic_refs(&self) -> impl Iterator<Item = &SymbolicEntityId> + '_ {
        self.0.values().filter_map(FieldValue::as_symbolic)
    }

    pub(crate) fn map_refs(&self, mut remap: impl FnMut(EntityId) -> EntityId) -> Fields {
        Fields(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), value.map_refs(&mut remap)))
                .collect(),
        )
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldValue)> {
        self.0.iter_mut().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Fields(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}
