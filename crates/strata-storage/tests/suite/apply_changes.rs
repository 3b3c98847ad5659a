use std::sync::Arc;

use pretty_assertions::assert_eq;
use strata_storage::{
    EntitySchema, EntityStorageRead, EntityTypeDecl, ExternalMappingKey, FieldSpec,
    MutableEntityStorage, StorageError, ValidationError,
};
use strata_test_utils::{
    assert_consistent, build_test_schema, builder, child, main_source, named, names, parent,
    CHILD, NAMED, PARENT,
};

const PATHS: ExternalMappingKey<String> = ExternalMappingKey::new("test.paths");

#[test]
fn changes_are_rebased_onto_a_newer_snapshot() {
    let mut b = builder();
    let a = b.add_entity(NAMED, named("a"), main_source()).expect("add a");
    let gone = b.add_entity(NAMED, named("b"), main_source()).expect("add b");
    b.get_mutable_external_mapping(&PATHS)
        .expect("mapping")
        .add_mapping(gone, "b/".into())
        .expect("map b");
    let base = b.to_snapshot().expect("commit base");

    // Two writers start from the same snapshot.
    let mut stale = base.to_builder();
    let c = stale.add_entity(NAMED, named("c"), main_source()).expect("add c");
    stale
        .modify_entity(a, |editor| {
            editor.set("comment", "edited");
        })
        .expect("modify a");
    stale.remove_entity(gone).expect("remove b");
    stale
        .get_mutable_external_mapping(&PATHS)
        .expect("mapping")
        .add_mapping(c, "c/".into())
        .expect("map c");

    let mut winner = base.to_builder();
    let d = winner.add_entity(NAMED, named("d"), main_source()).expect("add d");
    let current = winner.to_snapshot().expect("commit winner");
    assert_eq!(c, d, "both writers allocated the same id");

    let mut rebased = current.to_builder();
    let remap = rebased.apply_changes_from(&stale).expect("rebase");
    let new_c = remap[&c];
    assert_ne!(new_c, d);
    assert_eq!(remap.len(), 1);

    let result = rebased.to_snapshot().expect("commit rebased");
    assert_eq!(names(&result, NAMED), vec!["a", "c", "d"]);
    assert_eq!(
        result.resolve(new_c).and_then(|e| e.get_str("name").map(str::to_owned)),
        Some("c".to_owned())
    );
    assert_eq!(
        result.resolve(a).and_then(|e| e.get_str("comment").map(str::to_owned)),
        Some("edited".to_owned())
    );
    let paths = result.get_external_mapping(&PATHS);
    assert_eq!(paths.get_data_by_entity_id(new_c).map(String::as_str), Some("c/"));
    assert_eq!(paths.get_data_by_entity_id(d), None);
    assert_eq!(paths.get_data_by_entity_id(gone), None);
    assert_consistent(&result);
}

#[test]
fn references_between_added_entities_are_remapped_together() {
    let base = builder().to_snapshot().expect("commit");

    let mut stale = base.to_builder();
    let p = stale.add_entity(PARENT, parent("p"), main_source()).expect("add parent");
    let c = stale.add_entity(CHILD, child(p, "c"), main_source()).expect("add child");

    let mut winner = base.to_builder();
    winner.add_entity(PARENT, parent("other"), main_source()).expect("add");
    winner.add_entity(PARENT, parent("another"), main_source()).expect("add");
    let current = winner.to_snapshot().expect("commit");

    let mut rebased = current.to_builder();
    let remap = rebased.apply_changes_from(&stale).expect("rebase");
    let child_entity = rebased.resolve(remap[&c]).expect("child");
    assert_eq!(child_entity.get_ref("parent"), Some(remap[&p]));
    assert_eq!(
        rebased.resolve(remap[&p]).and_then(|e| e.get_str("data").map(str::to_owned)),
        Some("p".to_owned())
    );
    assert_consistent(&rebased);
}

#[test]
fn conflicting_changes_leave_the_target_untouched() {
    let mut b = builder();
    let p = b.add_entity(PARENT, parent("p"), main_source()).expect("add parent");
    let base = b.to_snapshot().expect("commit");

    let mut stale = base.to_builder();
    stale.add_entity(NAMED, named("unrelated"), main_source()).expect("add named");
    stale.add_entity(CHILD, child(p, "c"), main_source()).expect("add child");

    let mut winner = base.to_builder();
    winner.remove_entity(p).expect("remove parent");
    let current = winner.to_snapshot().expect("commit");

    let mut rebased = current.to_builder();
    let err = rebased.apply_changes_from(&stale).expect_err("parent is gone");
    assert!(
        matches!(
            err,
            StorageError::Validation(ValidationError::MissingReference { target, .. }) if target == p
        ),
        "{err}"
    );
    assert!(!rebased.has_changes());
    assert!(rebased.is_empty());
}

#[test]
fn modifications_of_entities_removed_in_the_target_are_dropped() {
    let mut b = builder();
    let a = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    let base = b.to_snapshot().expect("commit");

    let mut stale = base.to_builder();
    stale
        .modify_entity(a, |editor| {
            editor.set("comment", "late");
        })
        .expect("modify");

    let mut winner = base.to_builder();
    winner.remove_entity(a).expect("remove");
    let current = winner.to_snapshot().expect("commit");

    let mut rebased = current.to_builder();
    rebased.apply_changes_from(&stale).expect("rebase");
    assert!(!rebased.contains(a));
}

#[test]
fn builders_of_unrelated_storages_cannot_be_combined() {
    let mut target = builder();
    let keep = target.add_entity(NAMED, named("keep"), main_source()).expect("add keep");

    let mut other = MutableEntityStorage::new(Arc::new(build_test_schema()));
    let x = other.add_entity(NAMED, named("x"), main_source()).expect("add x");
    let other_base = other.to_snapshot().expect("commit");
    let mut other = other_base.to_builder();
    other.remove_entity(x).expect("remove x");
    assert_eq!(keep, x);

    assert_eq!(
        target.apply_changes_from(&other),
        Err(StorageError::LineageMismatch)
    );
    assert_eq!(names(&target, NAMED), vec!["keep"]);
    assert_eq!(target.modification_count(), 1);
}

#[test]
fn builders_over_different_schemas_cannot_be_combined() {
    let schema = EntitySchema::builder()
        .declare(EntityTypeDecl::new("Only").field(FieldSpec::string("name")))
        .build()
        .expect("schema");
    let mut other = MutableEntityStorage::new(Arc::new(schema));
    other
        .add_entity("Only", named("x"), main_source())
        .expect("add");

    let mut target = builder();
    assert_eq!(
        target.apply_changes_from(&other),
        Err(StorageError::SchemaMismatch)
    );
}
