use std::sync::{Arc, OnceLock};

use strata_storage::{
    EntityId, EntitySchema, EntitySource, EntityStorage, EntityStorageRead, EntityTypeDecl,
    FieldSpec, Fields, MutableEntityStorage, StorageOptions, SymbolicEntityId,
};

pub const NAMED: &str = "Named";
pub const NAMED_CHILD: &str = "NamedChild";
pub const PARENT: &str = "Parent";
pub const CHILD: &str = "Child";
pub const GRANDCHILD: &str = "Grandchild";
pub const SAMPLE: &str = "Sample";

/// Builds a fresh fixture schema.
pub fn build_test_schema() -> EntitySchema {
    EntitySchema::builder()
        .declare(
            EntityTypeDecl::new(NAMED)
                .fq_name("strata.test.NamedEntity")
                .field(FieldSpec::string("name"))
                .field(FieldSpec::string("comment").optional())
                .key(&["name"]),
        )
        .declare(
            EntityTypeDecl::new(NAMED_CHILD)
                .fq_name("strata.test.NamedChildEntity")
                .field(FieldSpec::parent("owner", NAMED))
                .field(FieldSpec::string("name")),
        )
        .declare(
            EntityTypeDecl::new(PARENT)
                .fq_name("strata.test.ParentEntity")
                .field(FieldSpec::string("data")),
        )
        .declare(
            EntityTypeDecl::new(CHILD)
                .fq_name("strata.test.ChildEntity")
                .field(FieldSpec::parent("parent", PARENT))
                .field(FieldSpec::string("data")),
        )
        .declare(
            EntityTypeDecl::new(GRANDCHILD)
                .fq_name("strata.test.GrandchildEntity")
                .field(FieldSpec::parent("child", CHILD))
                .field(FieldSpec::string("data")),
        )
        .declare(
            EntityTypeDecl::new(SAMPLE)
                .fq_name("strata.test.SampleEntity")
                .field(FieldSpec::string("name"))
                .field(FieldSpec::bool("enabled").optional())
                .field(FieldSpec::int("count").optional())
                .field(FieldSpec::strings("tags"))
                .field(FieldSpec::reference_to("favorite", NAMED))
                .field(FieldSpec::references_to("linked", NAMED))
                .field(FieldSpec::symbolic("named", NAMED).optional()),
        )
        .build()
        .expect("fixture schema is valid")
}

/// Shared fixture schema. Every call returns the same `Arc`.
pub fn test_schema() -> Arc<EntitySchema> {
    static SCHEMA: OnceLock<Arc<EntitySchema>> = OnceLock::new();
    Arc::clone(SCHEMA.get_or_init(|| Arc::new(build_test_schema())))
}

pub fn empty_storage() -> EntityStorage {
    EntityStorage::empty(test_schema())
}

pub fn empty_storage_with(options: StorageOptions) -> EntityStorage {
    EntityStorage::with_options(test_schema(), options)
}

pub fn builder() -> MutableEntityStorage {
    MutableEntityStorage::new(test_schema())
}

pub fn source(kind: &str) -> EntitySource {
    EntitySource::new(kind)
}

/// Source used by fixtures unless a test cares about provenance.
pub fn main_source() -> EntitySource {
    EntitySource::new("main")
}

pub fn imported_source(location: &str) -> EntitySource {
    EntitySource::with_location("import", location)
}

pub fn named(name: &str) -> Fields {
    Fields::new().with("name", name)
}

pub fn named_child(owner: EntityId, name: &str) -> Fields {
    Fields::new().with("owner", owner).with("name", name)
}

pub fn parent(data: &str) -> Fields {
    Fields::new().with("data", data)
}

pub fn child(parent: EntityId, data: &str) -> Fields {
    Fields::new().with("parent", parent).with("data", data)
}

pub fn grandchild(child: EntityId, data: &str) -> Fields {
    Fields::new().with("child", child).with("data", data)
}

pub fn sample(name: &str) -> Fields {
    Fields::new().with("name", name)
}

pub fn named_id(name: &str) -> SymbolicEntityId {
    let schema = test_schema();
    let type_id = schema.type_id(NAMED).expect("Named is declared");
    SymbolicEntityId::new(type_id, [name])
}

/// Adds a `Parent` with one `Child` and one `Grandchild` under it.
pub fn add_family(
    builder: &mut MutableEntityStorage,
    data: &str,
) -> (EntityId, EntityId, EntityId) {
    let parent_id = builder
        .add_entity(PARENT, parent(data), main_source())
        .expect("add parent");
    let child_id = builder
        .add_entity(CHILD, child(parent_id, &format!("{data}/child")), main_source())
        .expect("add child");
    let grandchild_id = builder
        .add_entity(
            GRANDCHILD,
            grandchild(child_id, &format!("{data}/child/grandchild")),
            main_source(),
        )
        .expect("add grandchild");
    (parent_id, child_id, grandchild_id)
}

/// Sorted `name` fields of all entities of `entity_type`.
pub fn names(storage: &impl EntityStorageRead, entity_type: &str) -> Vec<String> {
    let mut names: Vec<String> = storage
        .entities(entity_type)
        .filter_map(|entity| entity.get_str("name").map(str::to_owned))
        .collect();
    names.sort();
    names
}

#[track_caller]
pub fn assert_consistent(storage: &impl EntityStorageRead) {
    if let Err(err) = storage.check_consistency() {
        panic!("storage is inconsistent: {err}");
    }
}
