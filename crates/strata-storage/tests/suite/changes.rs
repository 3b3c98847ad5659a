use pretty_assertions::assert_eq;
use strata_storage::{EntityChange, EntityId, EntityStorageRead};
use strata_test_utils::{add_family, builder, main_source, named, CHILD, GRANDCHILD, NAMED, PARENT};

fn kinds(changes: &[EntityChange]) -> Vec<(&'static str, EntityId)> {
    changes
        .iter()
        .map(|change| {
            let kind = match change {
                EntityChange::Added(_) => "added",
                EntityChange::Removed(_) => "removed",
                EntityChange::Replaced { .. } => "replaced",
            };
            (kind, change.id())
        })
        .collect()
}

#[test]
fn fresh_builder_has_no_changes() {
    let b = builder();
    assert!(!b.has_changes());
    assert_eq!(b.modification_count(), 0);
    assert!(b.collect_changes().is_empty());
}

#[test]
fn changes_are_grouped_by_type_and_ordered_removed_replaced_added() {
    let mut b = builder();
    let a = b.add_entity(NAMED, named("a"), main_source()).expect("add a");
    let m = b.add_entity(NAMED, named("m"), main_source()).expect("add m");
    let base = b.to_snapshot().expect("commit");

    let mut b = base.to_builder();
    let z = b.add_entity(NAMED, named("z"), main_source()).expect("add z");
    b.modify_entity(m, |editor| {
        editor.set("comment", "touched");
    })
    .expect("modify m");
    b.remove_entity(a).expect("remove a");

    let changes = b.collect_changes();
    let named_type = b.schema().type_id(NAMED).expect("Named");
    assert_eq!(changes.len(), 1);
    assert_eq!(
        kinds(&changes[&named_type]),
        vec![("removed", a), ("replaced", m), ("added", z)]
    );

    let EntityChange::Replaced { old, new } = &changes[&named_type][1] else {
        panic!("expected a replacement");
    };
    assert_eq!(old.get_str("comment"), None);
    assert_eq!(new.get_str("comment"), Some("touched"));
    assert_eq!(b.modification_count(), 3);
}

#[test]
fn edits_that_cancel_out_are_not_reported() {
    let mut b = builder();
    let kept = b.add_entity(NAMED, named("kept"), main_source()).expect("add");
    let base = b.to_snapshot().expect("commit");

    let mut b = base.to_builder();
    let temp = b.add_entity(NAMED, named("temp"), main_source()).expect("add temp");
    b.modify_entity(temp, |editor| {
        editor.set("comment", "short-lived");
    })
    .expect("modify temp");
    b.remove_entity(temp).expect("remove temp");

    b.modify_entity(kept, |editor| {
        editor.set("comment", "draft");
    })
    .expect("modify");
    b.modify_entity(kept, |editor| {
        editor.remove("comment");
    })
    .expect("revert");

    assert!(b.collect_changes().is_empty());
    assert!(!b.has_changes());
    assert_eq!(b.modification_count(), 5);
}

#[test]
fn added_then_modified_entity_is_reported_as_added_in_its_latest_form() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("draft"), main_source()).expect("add");
    b.modify_entity(id, |editor| {
        editor.set("name", "final");
    })
    .expect("rename");

    let changes: Vec<EntityChange> = b.collect_changes().into_values().flatten().collect();
    assert_eq!(changes.len(), 1);
    let EntityChange::Added(entity) = &changes[0] else {
        panic!("expected an addition, got {:?}", changes[0]);
    };
    assert_eq!(entity.get_str("name"), Some("final"));
}

#[test]
fn cascading_removal_reports_every_removed_type() {
    let mut b = builder();
    let (parent, child, grandchild) = add_family(&mut b, "p");
    let base = b.to_snapshot().expect("commit");

    let mut b = base.to_builder();
    b.remove_entity(parent).expect("remove");
    let changes = b.collect_changes();
    let schema = b.schema().clone();

    for (type_name, id) in [(PARENT, parent), (CHILD, child), (GRANDCHILD, grandchild)] {
        let type_id = schema.type_id(type_name).expect("declared");
        assert_eq!(kinds(&changes[&type_id]), vec![("removed", id)], "{type_name}");
        assert_eq!(changes[&type_id][0].old_entity().map(|e| e.id()), Some(id));
    }
}

#[test]
fn snapshot_changes_are_relative_to_the_builder_base() {
    let mut b = builder();
    let first = b.add_entity(NAMED, named("first"), main_source()).expect("add");
    let s1 = b.to_snapshot().expect("commit");

    let mut b = s1.to_builder();
    let second = b.add_entity(NAMED, named("second"), main_source()).expect("add");
    let changes: Vec<EntityId> = b
        .collect_changes()
        .into_values()
        .flatten()
        .map(|change| change.id())
        .collect();
    assert_eq!(changes, vec![second]);
    assert!(b.base().ptr_eq(&s1));
    assert!(b.base().contains(first));
}

#[test]
fn edits_after_a_revert_are_relative_to_the_base_version() {
    let mut b = builder();
    let id = b.add_entity(NAMED, named("kept"), main_source()).expect("add");
    let base = b.to_snapshot().expect("commit");

    let mut b = base.to_builder();
    b.modify_entity(id, |editor| {
        editor.set("comment", "draft");
    })
    .expect("modify");
    b.modify_entity(id, |editor| {
        editor.remove("comment");
    })
    .expect("revert");
    b.modify_entity(id, |editor| {
        editor.set("comment", "final");
    })
    .expect("modify again");

    let changes: Vec<EntityChange> = b.collect_changes().into_values().flatten().collect();
    assert_eq!(kinds(&changes), vec![("replaced", id)]);
    let base_version = base.resolve(id).expect("in base");
    let old = changes[0].old_entity().expect("replaced has an old version");
    assert!(old.same_version(&base_version));
    assert!(old.get_str("comment").is_none());
}
