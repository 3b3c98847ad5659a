//! Entity types of the IDE project model.
//!
//! ```text
//! Module ─┬─ ContentRoot ── SourceRoot
//!         ├─ ModuleDependency ··> Module   (by name)
//!         └─ LibraryDependency ··> Library (by name)
//! ```
//!
//! Solid lines are owning references: removing a module removes its content
//! roots, source roots and dependency entries. Dotted lines are symbolic
//! references; they survive the removal of their target and follow renames.

use std::fmt;
use std::sync::{Arc, OnceLock};

use strata_config::MetadataConfig;
use strata_metadata::{MetadataProvider, MetadataRegistry};
use strata_storage::{
    Entity, EntityId, EntitySchema, EntityStorageRead, EntityTypeDecl, EntityTypeId, FieldSpec,
    Fields, SchemaError, SymbolicEntityId,
};

pub const MODULE: &str = "Module";
pub const CONTENT_ROOT: &str = "ContentRoot";
pub const SOURCE_ROOT: &str = "SourceRoot";
pub const LIBRARY: &str = "Library";
pub const MODULE_DEPENDENCY: &str = "ModuleDependency";
pub const LIBRARY_DEPENDENCY: &str = "LibraryDependency";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DependencyScope {
    #[default]
    Compile,
    Test,
    Runtime,
    Provided,
}

impl DependencyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyScope::Compile => "compile",
            DependencyScope::Test => "test",
            DependencyScope::Runtime => "runtime",
            DependencyScope::Provided => "provided",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "compile" => Some(DependencyScope::Compile),
            "test" => Some(DependencyScope::Test),
            "runtime" => Some(DependencyScope::Runtime),
            "provided" => Some(DependencyScope::Provided),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SourceRootKind {
    #[default]
    Source,
    TestSource,
    Resource,
    TestResource,
}

impl SourceRootKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceRootKind::Source => "java-source",
            SourceRootKind::TestSource => "java-test",
            SourceRootKind::Resource => "java-resource",
            SourceRootKind::TestResource => "java-test-resource",
        }
    }
}

pub fn build_schema() -> Result<EntitySchema, SchemaError> {
    EntitySchema::builder()
        .declare(
            EntityTypeDecl::new(MODULE)
                .fq_name("strata.project.ModuleEntity")
                .field(FieldSpec::string("name"))
                .field(FieldSpec::string("type").optional())
                .key(&["name"]),
        )
        .declare(
            EntityTypeDecl::new(CONTENT_ROOT)
                .fq_name("strata.project.ContentRootEntity")
                .field(FieldSpec::parent("module", MODULE))
                .field(FieldSpec::string("url"))
                .field(FieldSpec::strings("excluded_urls")),
        )
        .declare(
            EntityTypeDecl::new(SOURCE_ROOT)
                .fq_name("strata.project.SourceRootEntity")
                .field(FieldSpec::parent("content_root", CONTENT_ROOT))
                .field(FieldSpec::string("url"))
                .field(FieldSpec::string("root_type")),
        )
        .declare(
            EntityTypeDecl::new(LIBRARY)
                .fq_name("strata.project.LibraryEntity")
                .field(FieldSpec::string("name"))
                .field(FieldSpec::strings("roots"))
                .key(&["name"]),
        )
        .declare(
            EntityTypeDecl::new(MODULE_DEPENDENCY)
                .fq_name("strata.project.ModuleDependencyEntity")
                .field(FieldSpec::parent("module", MODULE))
                .field(FieldSpec::symbolic("target", MODULE))
                .field(FieldSpec::string("scope"))
                .field(FieldSpec::bool("exported").optional()),
        )
        .declare(
            EntityTypeDecl::new(LIBRARY_DEPENDENCY)
                .fq_name("strata.project.LibraryDependencyEntity")
                .field(FieldSpec::parent("module", MODULE))
                .field(FieldSpec::symbolic("library", LIBRARY))
                .field(FieldSpec::string("scope")),
        )
        .build()
}

/// The shared project model schema.
pub fn schema() -> Arc<EntitySchema> {
    static SCHEMA: OnceLock<Arc<EntitySchema>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| Arc::new(build_schema().expect("project model schema should be valid")))
        .clone()
}

fn type_id(name: &str) -> EntityTypeId {
    schema()
        .type_id(name)
        .expect("project model types are declared in `build_schema`")
}

/// Builds a registry holding the metadata of every project model type.
pub fn metadata_registry(config: &MetadataConfig) -> strata_metadata::Result<MetadataRegistry> {
    let schema = schema();
    let providers: [&dyn MetadataProvider; 1] = [schema.as_ref()];
    MetadataRegistry::from_providers(&providers, config)
}

pub fn module_id(name: &str) -> SymbolicEntityId {
    SymbolicEntityId::new(type_id(MODULE), [name])
}

pub fn library_id(name: &str) -> SymbolicEntityId {
    SymbolicEntityId::new(type_id(LIBRARY), [name])
}

pub fn module(name: &str) -> Fields {
    Fields::new().with("name", name)
}

pub fn content_root(module: EntityId, url: &str) -> Fields {
    Fields::new()
        .with("module", module)
        .with("url", url)
        .with("excluded_urls", Vec::<String>::new())
}

pub fn source_root(content_root: EntityId, url: &str, kind: SourceRootKind) -> Fields {
    Fields::new()
        .with("content_root", content_root)
        .with("url", url)
        .with("root_type", kind.as_str())
}

pub fn library(name: &str, roots: &[&str]) -> Fields {
    Fields::new().with("name", name).with(
        "roots",
        roots.iter().map(|root| (*root).to_owned()).collect::<Vec<_>>(),
    )
}

pub fn module_dependency(module: EntityId, target: &str, scope: DependencyScope) -> Fields {
    Fields::new()
        .with("module", module)
        .with("target", module_id(target))
        .with("scope", scope.as_str())
}

pub fn library_dependency(module: EntityId, library: &str, scope: DependencyScope) -> Fields {
    Fields::new()
        .with("module", module)
        .with("library", library_id(library))
        .with("scope", scope.as_str())
}

pub fn find_module(storage: &impl EntityStorageRead, name: &str) -> Option<Entity> {
    storage.resolve_symbolic(&module_id(name))
}

/// Names of the modules `module` depends on, in declaration order.
///
/// Dependencies on modules that do not exist are included.
pub fn module_dependencies(storage: &impl EntityStorageRead, module: EntityId) -> Vec<String> {
    storage
        .children(module, MODULE_DEPENDENCY, "module")
        .into_iter()
        .filter_map(|dependency| {
            dependency
                .field("target")
                .and_then(|value| value.as_symbolic())
                .and_then(|target| target.key().first().cloned())
        })
        .collect()
}

/// Modules that declare a dependency on the module named `name`.
pub fn dependents(storage: &impl EntityStorageRead, name: &str) -> Vec<EntityId> {
    storage
        .referrers(&module_id(name), MODULE_DEPENDENCY)
        .into_iter()
        .filter_map(|dependency| dependency.get_ref("module"))
        .collect()
}
