//! Closed table of entity types known to a storage.
//!
//! A schema fixes, per entity type, its fields, the kind and target of every
//! reference, what happens to a referrer when its target is removed, and which
//! fields form the type's symbolic id.

use std::collections::HashMap;
use std::fmt;

use strata_metadata::{
    ConnectionType, EntityMetadata, FinalClassMetadata, MetadataProvider, MetadataRegistry,
    OwnPropertyMetadata, StorageTypeMetadata, ValueTypeMetadata,
};
use thiserror::Error;

use crate::id::{EntityTypeId, SymbolicEntityId};
use crate::value::{FieldKind, Fields};

/// What happens to a referrer when the entity a reference field points at is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefOwnership {
    /// The referrer is a child of the target and is removed with it.
    Owned,
    /// The reference is cleared (set to null, or pruned from a list).
    Optional,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    target: Option<String>,
    ownership: RefOwnership,
    required: bool,
}

impl FieldSpec {
    fn scalar(name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            target: None,
            ownership: RefOwnership::Optional,
            required,
        }
    }

    fn reference(
        name: impl Into<String>,
        kind: FieldKind,
        target: impl Into<String>,
        ownership: RefOwnership,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: Some(target.into()),
            ownership,
            required,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::scalar(name, FieldKind::Bool, true)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::scalar(name, FieldKind::Int, true)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::scalar(name, FieldKind::String, true)
    }

    /// List of strings; an absent list is valid.
    pub fn strings(name: impl Into<String>) -> Self {
        Self::scalar(name, FieldKind::Strings, false)
    }

    /// Required reference to the owning parent. Removing the parent removes the child.
    pub fn parent(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::reference(name, FieldKind::Ref, target, RefOwnership::Owned, true)
    }

    /// Nullable reference, cleared when the target is removed.
    pub fn reference_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::reference(name, FieldKind::Ref, target, RefOwnership::Optional, false)
    }

    /// Ordered references; removed targets are pruned from the list.
    pub fn references_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::reference(name, FieldKind::Refs, target, RefOwnership::Optional, false)
    }

    /// Soft reference to an entity of `target` type by symbolic id.
    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::reference(name, FieldKind::Symbolic, target, RefOwnership::Optional, true)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Declaration of one entity type, resolved by [`SchemaBuilder::build`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityTypeDecl {
    name: String,
    fq_name: Option<String>,
    fields: Vec<FieldSpec>,
    key: Vec<String>,
}

impl EntityTypeDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fq_name: None,
            fields: Vec::new(),
            key: Vec::new(),
        }
    }

    /// Fully-qualified name used in type metadata. Defaults to the short name.
    pub fn fq_name(mut self, fq_name: impl Into<String>) -> Self {
        self.fq_name = Some(fq_name.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Fields whose values form the symbolic id, in order.
    pub fn key(mut self, fields: &[&str]) -> Self {
        self.key = fields.iter().map(|field| (*field).to_owned()).collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    target: Option<EntityTypeId>,
    ownership: RefOwnership,
    required: bool,
}

impl FieldDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Target type of reference fields.
    pub fn target(&self) -> Option<EntityTypeId> {
        self.target
    }

    pub fn ownership(&self) -> RefOwnership {
        self.ownership
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_hard_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Ref | FieldKind::Refs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityType {
    id: EntityTypeId,
    name: String,
    fq_name: String,
    fields: Vec<FieldDef>,
    key: Vec<usize>,
}

impl EntityType {
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_symbolic_id(&self) -> bool {
        !self.key.is_empty()
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.key.iter().map(|idx| &self.fields[*idx])
    }

    /// Symbolic id of an entity of this type with `fields`.
    ///
    /// `None` for types without key fields, or when a key field is missing.
    pub fn symbolic_id(&self, fields: &Fields) -> Option<SymbolicEntityId> {
        if self.key.is_empty() {
            return None;
        }
        let key = self
            .key_fields()
            .map(|field| fields.value(&field.name).and_then(|value| value.key_text()))
            .collect::<Option<Vec<_>>>()?;
        Some(SymbolicEntityId::new(self.id, key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("entity type `{name}` is declared twice")]
    DuplicateType { name: String },

    #[error("field `{type_name}.{field}` is declared twice")]
    DuplicateField { type_name: String, field: String },

    #[error("field `{type_name}.{field}` references unknown type `{target}`")]
    UnknownTarget {
        type_name: String,
        field: String,
        target: String,
    },

    #[error("key field `{type_name}.{field}` is not a declared required scalar field")]
    InvalidKeyField { type_name: String, field: String },

    #[error("field `{type_name}.{field}` is cleared when its target is removed and cannot be required")]
    RequiredDetachableReference { type_name: String, field: String },

    #[error("too many entity types declared")]
    TooManyTypes,
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    decls: Vec<EntityTypeDecl>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, decl: EntityTypeDecl) -> Self {
        self.decls.push(decl);
        self
    }

    pub fn build(self) -> Result<EntitySchema, SchemaError> {
        let mut by_name = HashMap::new();
        for (idx, decl) in self.decls.iter().enumerate() {
            let raw = u16::try_from(idx).map_err(|_| SchemaError::TooManyTypes)?;
            if by_name
                .insert(decl.name.clone(), EntityTypeId::from_raw(raw))
                .is_some()
            {
                return Err(SchemaError::DuplicateType {
                    name: decl.name.clone(),
                });
            }
        }

        let mut types = Vec::with_capacity(self.decls.len());
        for (idx, decl) in self.decls.into_iter().enumerate() {
            let id = EntityTypeId::from_raw(idx as u16);
            types.push(resolve_decl(id, decl, &by_name)?);
        }

        Ok(EntitySchema { types, by_name })
    }
}

fn resolve_decl(
    id: EntityTypeId,
    decl: EntityTypeDecl,
    by_name: &HashMap<String, EntityTypeId>,
) -> Result<EntityType, SchemaError> {
    let mut fields: Vec<FieldDef> = Vec::with_capacity(decl.fields.len());
    for spec in decl.fields {
        if fields.iter().any(|field| field.name == spec.name) {
            return Err(SchemaError::DuplicateField {
                type_name: decl.name.clone(),
                field: spec.name,
            });
        }
        let target = match &spec.target {
            Some(target) => Some(*by_name.get(target).ok_or_else(|| SchemaError::UnknownTarget {
                type_name: decl.name.clone(),
                field: spec.name.clone(),
                target: target.clone(),
            })?),
            None => None,
        };
        if spec.kind == FieldKind::Ref && spec.required && spec.ownership == RefOwnership::Optional
        {
            return Err(SchemaError::RequiredDetachableReference {
                type_name: decl.name.clone(),
                field: spec.name,
            });
        }
        fields.push(FieldDef {
            name: spec.name,
            kind: spec.kind,
            target,
            ownership: spec.ownership,
            required: spec.required,
        });
    }

    let mut key = Vec::with_capacity(decl.key.len());
    for name in &decl.key {
        let position = fields.iter().position(|field| {
            &field.name == name
                && field.required
                && matches!(field.kind, FieldKind::String | FieldKind::Int | FieldKind::Bool)
        });
        match position {
            Some(position) => key.push(position),
            None => {
                return Err(SchemaError::InvalidKeyField {
                    type_name: decl.name.clone(),
                    field: name.clone(),
                })
            }
        }
    }

    let fq_name = decl.fq_name.unwrap_or_else(|| decl.name.clone());
    Ok(EntityType {
        id,
        name: decl.name,
        fq_name,
        fields,
        key,
    })
}

/// Resolved set of entity types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitySchema {
    types: Vec<EntityType>,
    by_name: HashMap<String, EntityTypeId>,
}

impl EntitySchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn type_id(&self, name: &str) -> Option<EntityTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn entity_type(&self, id: EntityTypeId) -> Option<&EntityType> {
        self.types.get(id.index())
    }

    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn type_name(&self, id: EntityTypeId) -> String {
        self.entity_type(id)
            .map_or_else(|| id.to_string(), |ty| ty.name.clone())
    }

    /// Structural descriptor of `id`, as registered in a [`MetadataRegistry`].
    pub fn type_metadata(&self, id: EntityTypeId) -> Option<StorageTypeMetadata> {
        let ty = self.entity_type(id)?;
        let mut properties = vec![OwnPropertyMetadata::new(
            "entitySource",
            ValueTypeMetadata::custom(FinalClassMetadata::known(ENTITY_SOURCE_FQN)),
        )];
        for (idx, field) in ty.fields.iter().enumerate() {
            let mut property = OwnPropertyMetadata::new(&field.name, self.value_type(field));
            property.is_key = ty.key.contains(&idx);
            properties.push(property);
        }
        let supertypes = if ty.has_symbolic_id() {
            properties.push(
                OwnPropertyMetadata::new(
                    "symbolicId",
                    ValueTypeMetadata::custom(self.symbolic_id_metadata(ty)),
                )
                .computable(),
            );
            vec![WORKSPACE_ENTITY_WITH_SYMBOLIC_ID_FQN.to_owned()]
        } else {
            vec![WORKSPACE_ENTITY_FQN.to_owned()]
        };

        Some(StorageTypeMetadata::Entity(EntityMetadata {
            fq_name: ty.fq_name.clone(),
            entity_data_fq_name: format!("{}Data", ty.fq_name),
            supertypes,
            properties,
            ext_properties: Vec::new(),
            is_abstract: false,
        }))
    }

    fn value_type(&self, field: &FieldDef) -> ValueTypeMetadata {
        let target_fq = || {
            field
                .target
                .and_then(|target| self.entity_type(target))
                .map_or_else(String::new, |ty| ty.fq_name.clone())
        };
        let value_type = match field.kind {
            FieldKind::Bool => ValueTypeMetadata::primitive("Boolean"),
            FieldKind::Int => ValueTypeMetadata::primitive("Long"),
            FieldKind::String => ValueTypeMetadata::primitive("String"),
            FieldKind::Strings => ValueTypeMetadata::list_of(ValueTypeMetadata::primitive("String")),
            FieldKind::Ref => ValueTypeMetadata::EntityReference {
                connection_type: ConnectionType::OneToMany,
                entity_fq_name: target_fq(),
                is_child: false,
                is_nullable: false,
            },
            FieldKind::Refs => ValueTypeMetadata::list_of(ValueTypeMetadata::EntityReference {
                connection_type: ConnectionType::OneToMany,
                entity_fq_name: target_fq(),
                is_child: false,
                is_nullable: false,
            }),
            FieldKind::Symbolic => match field.target.and_then(|target| self.entity_type(target)) {
                Some(target) => ValueTypeMetadata::custom(self.symbolic_id_metadata(target)),
                None => ValueTypeMetadata::custom(FinalClassMetadata::known(SYMBOLIC_ID_FQN)),
            },
        };
        if field.required {
            value_type
        } else {
            value_type.nullable()
        }
    }

    fn symbolic_id_metadata(&self, ty: &EntityType) -> FinalClassMetadata {
        FinalClassMetadata::Class {
            fq_name: format!("{}Id", ty.fq_name),
            properties: ty
                .key_fields()
                .map(|field| OwnPropertyMetadata::new(&field.name, self.value_type(field)))
                .collect(),
            supertypes: vec![SYMBOLIC_ID_FQN.to_owned()],
        }
    }
}

const ENTITY_SOURCE_FQN: &str = "strata.storage.EntitySource";
const SYMBOLIC_ID_FQN: &str = "strata.storage.SymbolicEntityId";
const WORKSPACE_ENTITY_FQN: &str = "strata.storage.WorkspaceEntity";
const WORKSPACE_ENTITY_WITH_SYMBOLIC_ID_FQN: &str = "strata.storage.WorkspaceEntityWithSymbolicId";

impl MetadataProvider for EntitySchema {
    fn initialize_metadata(&self, registry: &MetadataRegistry) -> strata_metadata::Result<()> {
        for ty in &self.types {
            if let Some(metadata) = self.type_metadata(ty.id) {
                registry.add_metadata(metadata)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Anything that names an entity type: a resolved [`EntityTypeId`] or a type name.
pub trait EntityTypeRef {
    fn resolve_type(&self, schema: &EntitySchema) -> Option<EntityTypeId>;

    fn describe(&self) -> String;
}

impl EntityTypeRef for EntityTypeId {
    fn resolve_type(&self, schema: &EntitySchema) -> Option<EntityTypeId> {
        schema.entity_type(*self).map(|ty| ty.id)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl EntityTypeRef for &str {
    fn resolve_type(&self, schema: &EntitySchema) -> Option<EntityTypeId> {
        schema.type_id(self)
    }

    fn describe(&self) -> String {
        (*self).to_owned()
    }
}
