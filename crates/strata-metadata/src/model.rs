//! Structural descriptors for entity types and the value types they reference.
//!
//! Descriptors are plain data: they are built by entity schemas (or by hand in
//! tests), registered in a [`crate::MetadataRegistry`] and compared against
//! descriptors persisted by other builds.

use serde::{Deserialize, Serialize};

/// Descriptor of one named type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTypeMetadata {
    Entity(EntityMetadata),
    FinalClass(FinalClassMetadata),
    AbstractClass(AbstractClassMetadata),
}

impl StorageTypeMetadata {
    pub fn fq_name(&self) -> &str {
        match self {
            StorageTypeMetadata::Entity(entity) => &entity.fq_name,
            StorageTypeMetadata::FinalClass(class) => class.fq_name(),
            StorageTypeMetadata::AbstractClass(class) => &class.fq_name,
        }
    }

    pub fn supertypes(&self) -> &[String] {
        match self {
            StorageTypeMetadata::Entity(entity) => &entity.supertypes,
            StorageTypeMetadata::FinalClass(class) => class.supertypes(),
            StorageTypeMetadata::AbstractClass(class) => &class.supertypes,
        }
    }

    /// Placeholder descriptors only name a type whose structure is owned elsewhere.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self,
            StorageTypeMetadata::FinalClass(FinalClassMetadata::KnownClass { .. })
        )
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            StorageTypeMetadata::Entity(_) => "entity",
            StorageTypeMetadata::FinalClass(FinalClassMetadata::Class { .. }) => "class",
            StorageTypeMetadata::FinalClass(FinalClassMetadata::Object { .. }) => "object",
            StorageTypeMetadata::FinalClass(FinalClassMetadata::Enum { .. }) => "enum",
            StorageTypeMetadata::FinalClass(FinalClassMetadata::KnownClass { .. }) => "known class",
            StorageTypeMetadata::AbstractClass(_) => "abstract class",
        }
    }

    /// This descriptor followed by every descriptor nested in it, depth first.
    ///
    /// Entity references are by name and are not followed.
    pub fn flatten(&self) -> Vec<StorageTypeMetadata> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<StorageTypeMetadata>) {
        out.push(self.clone());
        match self {
            StorageTypeMetadata::Entity(entity) => {
                for property in &entity.properties {
                    property.value_type.collect_into(out);
                }
                for property in &entity.ext_properties {
                    property.value_type.collect_into(out);
                }
            }
            StorageTypeMetadata::FinalClass(class) => class.collect_properties_into(out),
            StorageTypeMetadata::AbstractClass(class) => {
                for property in &class.properties {
                    property.value_type.collect_into(out);
                }
                for subclass in &class.subclasses {
                    StorageTypeMetadata::FinalClass(subclass.clone()).collect_into(out);
                }
            }
        }
    }
}

impl From<EntityMetadata> for StorageTypeMetadata {
    fn from(value: EntityMetadata) -> Self {
        StorageTypeMetadata::Entity(value)
    }
}

impl From<FinalClassMetadata> for StorageTypeMetadata {
    fn from(value: FinalClassMetadata) -> Self {
        StorageTypeMetadata::FinalClass(value)
    }
}

impl From<AbstractClassMetadata> for StorageTypeMetadata {
    fn from(value: AbstractClassMetadata) -> Self {
        StorageTypeMetadata::AbstractClass(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub fq_name: String,
    /// Name of the backing data type that is actually persisted.
    pub entity_data_fq_name: String,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub properties: Vec<OwnPropertyMetadata>,
    /// Properties declared on other entity types that point at this one.
    #[serde(default)]
    pub ext_properties: Vec<ExtPropertyMetadata>,
    #[serde(default)]
    pub is_abstract: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalClassMetadata {
    Class {
        fq_name: String,
        #[serde(default)]
        properties: Vec<OwnPropertyMetadata>,
        #[serde(default)]
        supertypes: Vec<String>,
    },
    Object {
        fq_name: String,
        #[serde(default)]
        properties: Vec<OwnPropertyMetadata>,
        #[serde(default)]
        supertypes: Vec<String>,
    },
    Enum {
        fq_name: String,
        #[serde(default)]
        properties: Vec<OwnPropertyMetadata>,
        #[serde(default)]
        supertypes: Vec<String>,
        /// Enum constants in declaration order.
        values: Vec<String>,
    },
    /// A type whose structure is not described here (for example a URL type
    /// provided by the host).
    KnownClass { fq_name: String },
}

impl FinalClassMetadata {
    pub fn fq_name(&self) -> &str {
        match self {
            FinalClassMetadata::Class { fq_name, .. }
            | FinalClassMetadata::Object { fq_name, .. }
            | FinalClassMetadata::Enum { fq_name, .. }
            | FinalClassMetadata::KnownClass { fq_name } => fq_name,
        }
    }

    pub fn properties(&self) -> &[OwnPropertyMetadata] {
        match self {
            FinalClassMetadata::Class { properties, .. }
            | FinalClassMetadata::Object { properties, .. }
            | FinalClassMetadata::Enum { properties, .. } => properties,
            FinalClassMetadata::KnownClass { .. } => &[],
        }
    }

    pub fn supertypes(&self) -> &[String] {
        match self {
            FinalClassMetadata::Class { supertypes, .. }
            | FinalClassMetadata::Object { supertypes, .. }
            | FinalClassMetadata::Enum { supertypes, .. } => supertypes,
            FinalClassMetadata::KnownClass { .. } => &[],
        }
    }

    pub fn known(fq_name: impl Into<String>) -> Self {
        FinalClassMetadata::KnownClass {
            fq_name: fq_name.into(),
        }
    }

    fn collect_properties_into(&self, out: &mut Vec<StorageTypeMetadata>) {
        for property in self.properties() {
            property.value_type.collect_into(out);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbstractClassMetadata {
    pub fq_name: String,
    #[serde(default)]
    pub properties: Vec<OwnPropertyMetadata>,
    #[serde(default)]
    pub supertypes: Vec<String>,
    pub subclasses: Vec<FinalClassMetadata>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnPropertyMetadata {
    pub name: String,
    pub value_type: ValueTypeMetadata,
    /// Derived from other properties and never persisted.
    #[serde(default)]
    pub is_computable: bool,
    /// Part of the symbolic id of the owning entity.
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub with_default: bool,
}

impl OwnPropertyMetadata {
    pub fn new(name: impl Into<String>, value_type: ValueTypeMetadata) -> Self {
        Self {
            name: name.into(),
            value_type,
            is_computable: false,
            is_key: false,
            is_open: false,
            with_default: false,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn computable(mut self) -> Self {
        self.is_computable = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.with_default = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtPropertyMetadata {
    pub name: String,
    pub receiver_fq_name: String,
    pub value_type: ValueTypeMetadata,
    #[serde(default)]
    pub is_computable: bool,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub with_default: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    OneToOne,
    OneToMany,
    OneToAbstractMany,
    AbstractOneToOne,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueTypeMetadata {
    Primitive {
        type_name: String,
        #[serde(default)]
        is_nullable: bool,
    },
    Custom {
        type_metadata: Box<StorageTypeMetadata>,
        #[serde(default)]
        is_nullable: bool,
    },
    EntityReference {
        connection_type: ConnectionType,
        entity_fq_name: String,
        /// The referencing side is the child: removing the target removes the referrer.
        is_child: bool,
        #[serde(default)]
        is_nullable: bool,
    },
    Parameterized {
        generic: Box<ValueTypeMetadata>,
        arguments: Vec<ValueTypeMetadata>,
    },
}

impl ValueTypeMetadata {
    pub fn primitive(type_name: impl Into<String>) -> Self {
        ValueTypeMetadata::Primitive {
            type_name: type_name.into(),
            is_nullable: false,
        }
    }

    pub fn custom(type_metadata: impl Into<StorageTypeMetadata>) -> Self {
        ValueTypeMetadata::Custom {
            type_metadata: Box::new(type_metadata.into()),
            is_nullable: false,
        }
    }

    pub fn list_of(argument: ValueTypeMetadata) -> Self {
        ValueTypeMetadata::Parameterized {
            generic: Box::new(ValueTypeMetadata::primitive("List")),
            arguments: vec![argument],
        }
    }

    /// Returns the same type with nullability set.
    pub fn nullable(mut self) -> Self {
        match &mut self {
            ValueTypeMetadata::Primitive { is_nullable, .. }
            | ValueTypeMetadata::Custom { is_nullable, .. }
            | ValueTypeMetadata::EntityReference { is_nullable, .. } => *is_nullable = true,
            ValueTypeMetadata::Parameterized { .. } => {}
        }
        self
    }

    fn collect_into(&self, out: &mut Vec<StorageTypeMetadata>) {
        match self {
            ValueTypeMetadata::Custom { type_metadata, .. } => type_metadata.collect_into(out),
            ValueTypeMetadata::Parameterized { generic, arguments } => {
                generic.collect_into(out);
                for argument in arguments {
                    argument.collect_into(out);
                }
            }
            ValueTypeMetadata::Primitive { .. } | ValueTypeMetadata::EntityReference { .. } => {}
        }
    }
}
