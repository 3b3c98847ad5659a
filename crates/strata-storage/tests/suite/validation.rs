use strata_storage::{
    EntityId, EntityStorageRead, FieldKind, Fields, StorageError, ValidationError,
};
use strata_test_utils::{
    builder, child, main_source, named, named_id, parent, sample, CHILD, NAMED, PARENT, SAMPLE,
};

fn validation_error(result: strata_storage::Result<EntityId>) -> ValidationError {
    match result {
        Err(StorageError::Validation(err)) => err,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn unknown_type_is_rejected() {
    let mut b = builder();
    let err = validation_error(b.add_entity("Unknown", Fields::new(), main_source()));
    assert_eq!(
        err,
        ValidationError::UnknownType {
            name: "Unknown".into()
        }
    );
}

#[test]
fn unknown_field_is_rejected() {
    let mut b = builder();
    let err = validation_error(b.add_entity(
        NAMED,
        named("a").with("colour", "red"),
        main_source(),
    ));
    assert_eq!(
        err,
        ValidationError::UnknownField {
            type_name: NAMED.into(),
            field: "colour".into(),
        }
    );
}

#[test]
fn missing_required_field_is_rejected() {
    let mut b = builder();
    let err = validation_error(b.add_entity(NAMED, Fields::new(), main_source()));
    assert_eq!(
        err,
        ValidationError::MissingField {
            type_name: NAMED.into(),
            field: "name".into(),
        }
    );

    // Null counts as missing.
    let err = validation_error(b.add_entity(
        NAMED,
        Fields::new().with("name", None::<String>),
        main_source(),
    ));
    assert!(matches!(err, ValidationError::MissingField { .. }), "{err}");
}

#[test]
fn value_of_the_wrong_kind_is_rejected() {
    let mut b = builder();
    let err = validation_error(b.add_entity(NAMED, Fields::new().with("name", 7i64), main_source()));
    assert_eq!(
        err,
        ValidationError::KindMismatch {
            type_name: NAMED.into(),
            field: "name".into(),
            expected: FieldKind::String,
        }
    );
}

#[test]
fn optional_fields_accept_null() {
    let mut b = builder();
    b.add_entity(
        SAMPLE,
        sample("s")
            .with("favorite", None::<EntityId>)
            .with("count", None::<i64>),
        main_source(),
    )
    .expect("nulls are fine in optional fields");
}

#[test]
fn reference_to_a_missing_entity_is_rejected() {
    let mut b = builder();
    let ghost = EntityId::from_raw(42).expect("id");
    let err = validation_error(b.add_entity(CHILD, child(ghost, "orphan"), main_source()));
    assert_eq!(
        err,
        ValidationError::MissingReference {
            type_name: CHILD.into(),
            field: "parent".into(),
            target: ghost,
        }
    );
    assert_eq!(b.entity_count(CHILD), 0);
}

#[test]
fn reference_to_an_entity_of_another_type_is_rejected() {
    let mut b = builder();
    let not_a_parent = b.add_entity(NAMED, named("n"), main_source()).expect("add");
    let err = validation_error(b.add_entity(CHILD, child(not_a_parent, "c"), main_source()));
    assert!(
        matches!(err, ValidationError::WrongReferenceType { target, .. } if target == not_a_parent),
        "{err}"
    );
}

#[test]
fn references_into_the_base_and_the_pending_edits_both_resolve() {
    let mut b = builder();
    let old_parent = b.add_entity(PARENT, parent("old"), main_source()).expect("add");
    let snapshot = b.to_snapshot().expect("commit");

    let mut b = snapshot.to_builder();
    let new_parent = b.add_entity(PARENT, parent("new"), main_source()).expect("add");
    b.add_entity(CHILD, child(old_parent, "a"), main_source())
        .expect("reference into the base");
    b.add_entity(CHILD, child(new_parent, "b"), main_source())
        .expect("reference into pending edits");
}

#[test]
fn symbolic_reference_must_name_the_declared_type() {
    let mut b = builder();
    let parent_type = b.schema().type_id(PARENT).expect("Parent");
    let wrong = strata_storage::SymbolicEntityId::new(parent_type, ["x"]);
    let err = validation_error(b.add_entity(SAMPLE, sample("s").with("named", wrong), main_source()));
    assert!(matches!(err, ValidationError::WrongSymbolicType { .. }), "{err}");
}

#[test]
fn duplicate_symbolic_id_is_rejected() {
    let mut b = builder();
    let first = b.add_entity(NAMED, named("dup"), main_source()).expect("add");
    let err = validation_error(b.add_entity(NAMED, named("dup"), main_source()));
    assert_eq!(
        err,
        ValidationError::DuplicateSymbolicId {
            symbolic_id: named_id("dup"),
            existing: first,
        }
    );
}

#[test]
fn renaming_onto_a_taken_symbolic_id_is_rejected() {
    let mut b = builder();
    b.add_entity(NAMED, named("a"), main_source()).expect("add a");
    let second = b.add_entity(NAMED, named("b"), main_source()).expect("add b");

    let err = b
        .modify_entity(second, |editor| {
            editor.set("name", "a");
        })
        .expect_err("rename onto a");
    assert!(
        matches!(
            err,
            StorageError::Validation(ValidationError::DuplicateSymbolicId { .. })
        ),
        "{err}"
    );
    assert_eq!(
        b.resolve(second).and_then(|e| e.get_str("name").map(str::to_owned)),
        Some("b".to_owned())
    );
}

#[test]
fn failed_modification_leaves_the_entity_untouched() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    let before = b.resolve(id).expect("resolve");

    let err = b
        .modify_entity(id, |editor| {
            editor.remove("name");
        })
        .expect_err("name is required");
    assert!(matches!(err, StorageError::Validation(_)), "{err}");
    assert!(b.resolve(id).expect("resolve").same_version(&before));
}
