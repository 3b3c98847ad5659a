use pretty_assertions::assert_eq;
use strata_storage::{EntityStorageRead, ExternalMappingKey, FieldValue};
use strata_test_utils::{
    add_family, assert_consistent, builder, main_source, named, named_child, sample, CHILD,
    GRANDCHILD, NAMED, NAMED_CHILD, PARENT, SAMPLE,
};

const LABELS: ExternalMappingKey<String> = ExternalMappingKey::new("test.labels");

#[test]
fn removing_a_parent_removes_everything_it_owns() {
    let mut b = builder();
    let (parent, child, grandchild) = add_family(&mut b, "p");
    let (other_parent, other_child, _) = add_family(&mut b, "q");

    let removed = b.remove_entity(parent).expect("remove parent");
    assert_eq!(removed, vec![parent, child, grandchild]);

    assert_eq!(b.entity_count(PARENT), 1);
    assert_eq!(b.entity_count(CHILD), 1);
    assert_eq!(b.entity_count(GRANDCHILD), 1);
    assert!(b.contains(other_parent));
    assert!(b.contains(other_child));
    assert_consistent(&b);
}

#[test]
fn removing_a_child_keeps_its_parent() {
    let mut b = builder();
    let (parent, child, grandchild) = add_family(&mut b, "p");

    b.remove_entity(child).expect("remove child");
    assert!(b.contains(parent));
    assert!(!b.contains(grandchild));
    assert!(b.children(parent, CHILD, "parent").is_empty());
}

#[test]
fn optional_references_are_cleared_and_lists_pruned() {
    let mut b = builder();
    let keep = b.add_entity(NAMED, named("keep"), main_source()).expect("add keep");
    let gone = b.add_entity(NAMED, named("gone"), main_source()).expect("add gone");
    let holder = b
        .add_entity(
            SAMPLE,
            sample("holder")
                .with("favorite", gone)
                .with("linked", vec![gone, keep, gone]),
            main_source(),
        )
        .expect("add holder");
    let revision = b.resolve(holder).expect("holder").revision();

    let removed = b.remove_entity(gone).expect("remove");
    assert_eq!(removed, vec![gone]);

    let holder = b.resolve(holder).expect("holder survives");
    assert_eq!(holder.field("favorite"), Some(&FieldValue::Null));
    assert_eq!(holder.field("linked"), Some(&FieldValue::Refs(vec![keep])));
    assert_eq!(holder.revision(), revision + 1);
    assert_consistent(&b);
}

#[test]
fn symbolic_references_survive_removal_of_their_target() {
    let mut b = builder();
    let target = b.add_entity(NAMED, named("t"), main_source()).expect("add");
    let holder = b
        .add_entity(
            SAMPLE,
            sample("s").with("named", strata_test_utils::named_id("t")),
            main_source(),
        )
        .expect("add holder");

    b.remove_entity(target).expect("remove");
    let holder = b.resolve(holder).expect("holder survives");
    assert_eq!(holder.revision(), 0);
    assert!(b.resolve_symbolic(&strata_test_utils::named_id("t")).is_none());
}

#[test]
fn cascade_cleans_mapping_entries_of_every_removed_entity() {
    let mut b = builder();
    let owner = b.add_entity(NAMED, named("owner"), main_source()).expect("add");
    let child = b
        .add_entity(NAMED_CHILD, named_child(owner, "c"), main_source())
        .expect("add child");
    {
        let mut labels = b.get_mutable_external_mapping(&LABELS).expect("mapping");
        labels.add_mapping(owner, "owner".into()).expect("map owner");
        labels.add_mapping(child, "child".into()).expect("map child");
    }
    let before = b.to_snapshot().expect("commit");

    let mut b = before.to_builder();
    b.remove_entity(owner).expect("remove owner");
    let after = b.to_snapshot().expect("commit");

    let labels = after.get_external_mapping(&LABELS);
    assert_eq!(labels.get_data_by_entity_id(owner), None);
    assert_eq!(labels.get_data_by_entity_id(child), None);
    assert!(labels.is_empty());
    assert!(after.mapping_names().is_empty());

    let old_labels = before.get_external_mapping(&LABELS);
    assert_eq!(old_labels.get_data_by_entity_id(owner).map(String::as_str), Some("owner"));
    assert_eq!(old_labels.len(), 2);
}

#[test]
fn removal_in_a_builder_does_not_touch_the_base() {
    let mut b = builder();
    let (parent, child, grandchild) = add_family(&mut b, "p");
    let base = b.to_snapshot().expect("commit");

    let mut b = base.to_builder();
    b.remove_entity(parent).expect("remove");
    assert!(b.is_empty());

    for id in [parent, child, grandchild] {
        assert!(base.contains(id), "{id} should still be in the base");
    }
    assert_consistent(&base);
}
