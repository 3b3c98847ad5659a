use pretty_assertions::assert_eq;
use strata_storage::{
    EntityId, EntityStorageRead, FieldValue, StorageError, SymbolicEntityId,
};
use strata_test_utils::{
    add_family, builder, child, empty_storage, imported_source, main_source, named, named_id,
    names, sample, source, CHILD, NAMED, PARENT, SAMPLE,
};

#[test]
fn first_entity_of_an_empty_storage_gets_id_one() {
    let s0 = empty_storage();
    let mut b = s0.to_builder();

    let id = b
        .add_entity(NAMED, named("app"), source("x"))
        .expect("add app");
    assert_eq!(id.to_raw(), 1);

    let s1 = b.to_snapshot().expect("commit");
    let apps: Vec<Option<String>> = s1
        .entities(NAMED)
        .map(|entity| entity.get_str("name").map(str::to_owned))
        .collect();
    assert_eq!(apps, vec![Some("app".to_owned())]);
    assert_eq!(s0.entities(NAMED).count(), 0);
    assert!(s0.is_empty());
}

#[test]
fn added_entity_reads_back_with_its_fields_and_source() {
    let mut b = builder();
    let fields = sample("first")
        .with("enabled", true)
        .with("count", 3i64)
        .with("tags", vec!["a".to_owned(), "b".to_owned()]);
    let id = b
        .add_entity(SAMPLE, fields.clone(), imported_source("build.gradle"))
        .expect("add");

    let entity = b.resolve(id).expect("resolve within the builder");
    assert_eq!(entity.fields(), &fields);
    assert_eq!(entity.source(), &imported_source("build.gradle"));
    assert_eq!(entity.revision(), 0);
    assert_eq!(entity.symbolic_id(), None);
}

#[test]
fn repeated_reads_return_the_same_version() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    let snapshot = b.to_snapshot().expect("commit");

    let first = snapshot.resolve(id).expect("first read");
    let second = snapshot.resolve(id).expect("second read");
    assert!(first.same_version(&second));

    let missing = EntityId::from_raw(99).expect("id");
    assert!(snapshot.resolve(missing).is_none());
    assert!(snapshot.resolve(missing).is_none());
}

#[test]
fn commit_reflects_every_edit_and_leaves_the_base_alone() {
    let mut b = builder();
    let a = b.add_entity(NAMED, named("a"), main_source()).expect("add a");
    let keep = b.add_entity(NAMED, named("b"), main_source()).expect("add b");
    let s1 = b.to_snapshot().expect("commit s1");

    let mut b = s1.to_builder();
    b.remove_entity(a).expect("remove a");
    b.modify_entity(keep, |editor| {
        editor.set("comment", "kept");
    })
    .expect("modify b");
    let c = b.add_entity(NAMED, named("c"), main_source()).expect("add c");
    let s2 = b.to_snapshot().expect("commit s2");

    assert_eq!(names(&s2, NAMED), vec!["b", "c"]);
    assert!(s2.resolve(a).is_none());
    assert_eq!(
        s2.resolve(keep).and_then(|e| e.get_str("comment").map(str::to_owned)),
        Some("kept".to_owned())
    );
    assert!(s2.contains(c));

    assert_eq!(names(&s1, NAMED), vec!["a", "b"]);
    assert!(s1.resolve(keep).expect("b in s1").get_str("comment").is_none());
    assert!(!s1.contains(c));
}

#[test]
fn ids_are_not_reused_after_removal() {
    let mut b = builder();
    let a = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    b.remove_entity(a).expect("remove");
    let again = b.add_entity(NAMED, named("a"), main_source()).expect("re-add");
    assert!(again > a);

    let snapshot = b.to_snapshot().expect("commit");
    let mut next = snapshot.to_builder();
    let later = next.add_entity(NAMED, named("z"), main_source()).expect("add");
    assert!(later > again);
}

#[test]
fn iteration_follows_insertion_order_across_modifications() {
    let mut b = builder();
    let ids: Vec<EntityId> = ["b", "a", "c"]
        .into_iter()
        .map(|name| b.add_entity(NAMED, named(name), main_source()).expect("add"))
        .collect();
    b.modify_entity(ids[0], |editor| {
        editor.set("comment", "first");
    })
    .expect("modify");

    let order: Vec<EntityId> = b.entities(NAMED).map(|entity| entity.id()).collect();
    assert_eq!(order, ids);

    // The iterator can be restarted.
    let entities = b.entities(NAMED);
    assert_eq!(entities.clone().count(), 3);
    assert_eq!(entities.count(), 3);
}

#[test]
fn unknown_types_have_no_entities() {
    let snapshot = empty_storage();
    assert_eq!(snapshot.entities("Unknown").count(), 0);
    assert_eq!(snapshot.entity_count("Unknown"), 0);
    assert_eq!(snapshot.entity_count(PARENT), 0);
}

#[test]
fn modification_produces_a_new_revision_with_the_same_id() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    let before = b.resolve(id).expect("resolve");

    let after = b
        .modify_entity(id, |editor| {
            editor.set("comment", "changed").set_source(source("user"));
        })
        .expect("modify");

    assert_eq!(after.id(), id);
    assert_eq!(after.revision(), before.revision() + 1);
    assert_eq!(after.source(), &source("user"));
    assert_eq!(before.get_str("comment"), None);
}

#[test]
fn modification_without_changes_keeps_the_version() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    let count = b.modification_count();
    let before = b.resolve(id).expect("resolve");

    let after = b
        .modify_entity(id, |editor| {
            editor.set("name", "a");
        })
        .expect("modify");

    assert!(after.same_version(&before));
    assert_eq!(b.modification_count(), count);
}

#[test]
fn stale_ids_are_not_found() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    b.remove_entity(id).expect("remove");

    assert_eq!(b.remove_entity(id), Err(StorageError::NotFound { id }));
    let err = b
        .modify_entity(id, |editor| {
            editor.set("comment", "x");
        })
        .expect_err("modify removed entity");
    assert_eq!(err, StorageError::NotFound { id });
}

#[test]
fn consumed_builder_rejects_mutation_but_serves_reads() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("a"), main_source()).expect("add");
    let snapshot = b.to_snapshot().expect("commit");
    assert!(b.is_consumed());

    assert!(matches!(
        b.to_snapshot(),
        Err(StorageError::IllegalState { operation: "to_snapshot" })
    ));
    assert!(matches!(
        b.add_entity(NAMED, named("b"), main_source()),
        Err(StorageError::IllegalState { operation: "add_entity" })
    ));
    assert!(matches!(
        b.remove_entity(id),
        Err(StorageError::IllegalState { .. })
    ));
    assert!(matches!(
        b.modify_entity(id, |_| {}),
        Err(StorageError::IllegalState { .. })
    ));

    let other = snapshot.to_builder();
    assert!(matches!(
        b.apply_changes_from(&other),
        Err(StorageError::IllegalState { .. })
    ));
    assert!(matches!(
        b.replace_by_source(|_| true, &snapshot),
        Err(StorageError::IllegalState { .. })
    ));

    assert_eq!(b.resolve(id), snapshot.resolve(id));
    assert_eq!(b.len(), 1);
}

#[test]
fn entities_can_be_selected_by_source() {
    let mut b = builder();
    let a = b
        .add_entity(NAMED, named("a"), imported_source("a/pom.xml"))
        .expect("add a");
    b.add_entity(NAMED, named("b"), main_source()).expect("add b");
    let c = b
        .add_entity(PARENT, strata_test_utils::parent("c"), imported_source("c/pom.xml"))
        .expect("add c");

    let imported: Vec<EntityId> = b
        .entities_by_source(|source| source.kind() == "import")
        .iter()
        .map(|entity| entity.id())
        .collect();
    assert_eq!(imported, vec![a, c]);
    assert!(b.entities_by_source(|_| false).is_empty());
}

#[test]
fn children_are_found_through_their_parent_reference() {
    let mut b = builder();
    let (parent, first, _) = add_family(&mut b, "p");
    let second = b
        .add_entity(CHILD, child(parent, "second"), main_source())
        .expect("add second child");
    let (other_parent, _, _) = add_family(&mut b, "q");

    let children: Vec<EntityId> = b
        .children(parent, CHILD, "parent")
        .iter()
        .map(|entity| entity.id())
        .collect();
    assert_eq!(children, vec![first, second]);
    assert_eq!(b.children(other_parent, CHILD, "parent").len(), 1);
    assert!(b.children(parent, CHILD, "data").is_empty());
}

#[test]
fn entities_with_keys_resolve_by_symbolic_id() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("core"), main_source()).expect("add");

    assert!(b.contains_symbolic(&named_id("core")));
    assert_eq!(
        b.resolve_symbolic(&named_id("core")).map(|entity| entity.id()),
        Some(id)
    );
    assert_eq!(
        b.resolve(id).and_then(|entity| entity.symbolic_id().cloned()),
        Some(named_id("core"))
    );
    assert!(b.resolve_symbolic(&named_id("missing")).is_none());
}

#[test]
fn symbolic_references_are_soft() {
    let mut b = builder();
    let sample_id = b
        .add_entity(
            SAMPLE,
            sample("s").with("named", named_id("not-yet")),
            main_source(),
        )
        .expect("symbolic reference to a missing entity is allowed");

    let referrers: Vec<EntityId> = b
        .referrers(&named_id("not-yet"), SAMPLE)
        .iter()
        .map(|entity| entity.id())
        .collect();
    assert_eq!(referrers, vec![sample_id]);
    assert!(b.referrers(&named_id("not-yet"), NAMED).is_empty());
}

#[test]
fn symbolic_references_follow_a_rename() {
    let mut b = builder();
    let core = b.add_entity(NAMED, named("core"), main_source()).expect("add");
    let user = b
        .add_entity(SAMPLE, sample("user").with("named", named_id("core")), main_source())
        .expect("add referrer");
    let before = b.resolve(user).expect("referrer");

    b.modify_entity(core, |editor| {
        editor.set("name", "base");
    })
    .expect("rename");

    let after = b.resolve(user).expect("referrer");
    assert_eq!(
        after.field("named"),
        Some(&FieldValue::Symbolic(named_id("base")))
    );
    assert_eq!(after.revision(), before.revision() + 1);
    assert!(b.referrers(&named_id("core"), SAMPLE).is_empty());
    assert_eq!(b.referrers(&named_id("base"), SAMPLE).len(), 1);
    assert!(!b.contains_symbolic(&named_id("core")));
}

#[test]
fn type_names_and_ids_select_the_same_entities() {
    let mut b = builder();
    b.add_entity(NAMED, named("a"), main_source()).expect("add");
    let type_id = b.schema().type_id(NAMED).expect("Named");

    assert_eq!(b.entity_count(type_id), b.entity_count(NAMED));
    let symbolic = SymbolicEntityId::new(type_id, ["a"]);
    assert!(b.contains_symbolic(&symbolic));
}
