use std::sync::Arc;

use pretty_assertions::assert_eq;
use strata_config::MetadataConfig;
use strata_metadata::{
    MetadataError, MetadataHash, MetadataProvider, MetadataRegistry, MetadataStorage,
    StorageTypeMetadata,
};

use super::fixtures::module_entity;

#[test]
fn nested_types_are_registered_by_name() {
    let registry = MetadataRegistry::new();
    registry.add_metadata(module_entity()).expect("register");

    assert_eq!(
        registry.fq_names(),
        vec![
            "strata.EntitySource",
            "strata.ImportedSource",
            "strata.Url",
            "strata.project.ModuleEntity",
        ]
    );
    assert!(registry
        .get_metadata_by_type_fqn_or_null("strata.project.ContentRootEntity")
        .is_none());
}

#[test]
fn adding_identical_metadata_twice_is_idempotent() {
    let once = MetadataRegistry::new();
    once.add_metadata(module_entity()).expect("register");

    let twice = MetadataRegistry::new();
    twice.add_metadata(module_entity()).expect("register");
    twice.add_metadata(module_entity()).expect("register again");

    for name in once.fq_names() {
        assert_eq!(
            once.get_metadata_by_type_fqn_or_null(&name),
            twice.get_metadata_by_type_fqn_or_null(&name),
            "{name}"
        );
    }
    assert_eq!(once.len(), twice.len());
}

#[test]
fn unknown_names_are_absent_not_errors() {
    let registry = MetadataRegistry::new();
    assert_eq!(registry.get_metadata_by_type_fqn_or_null("strata.Nope"), None);
    assert_eq!(registry.get_hash_by_fqn("strata.Nope"), None);
}

#[test]
fn frozen_registry_rejects_registration_but_serves_reads() {
    let registry = MetadataRegistry::new();
    registry.add_metadata(module_entity()).expect("register");
    registry.freeze();

    let err = registry
        .add_metadata(StorageTypeMetadata::from(
            strata_metadata::FinalClassMetadata::known("strata.Late"),
        ))
        .expect_err("frozen");
    assert_eq!(
        err,
        MetadataError::Frozen {
            fq_name: "strata.Late".into()
        }
    );
    assert_eq!(
        registry.add_metadata_hash("strata.Late", MetadataHash::from_raw(1)),
        Err(MetadataError::Frozen {
            fq_name: "strata.Late".into()
        })
    );
    assert!(registry
        .get_metadata_by_type_fqn_or_null("strata.project.ModuleEntity")
        .is_some());
}

#[test]
fn conflicting_hashes_are_rejected() {
    let registry = MetadataRegistry::new();
    registry
        .add_metadata_hash("strata.project.ModuleEntity", MetadataHash::from_raw(7))
        .expect("first");
    registry
        .add_metadata_hash("strata.project.ModuleEntity", MetadataHash::from_raw(7))
        .expect("same hash again");

    assert_eq!(
        registry.add_metadata_hash("strata.project.ModuleEntity", MetadataHash::from_raw(8)),
        Err(MetadataError::HashConflict {
            fq_name: "strata.project.ModuleEntity".into()
        })
    );
    assert_eq!(
        registry.get_hash_by_fqn("strata.project.ModuleEntity"),
        Some(MetadataHash::from_raw(7))
    );
}

struct ProjectModel;

impl MetadataProvider for ProjectModel {
    fn initialize_metadata(&self, registry: &MetadataRegistry) -> strata_metadata::Result<()> {
        registry.add_metadata(module_entity())?;
        registry.add_metadata_hash("strata.project.ModuleEntity", MetadataHash::from_raw(42))
    }
}

#[test]
fn providers_load_then_freeze() {
    let registry = MetadataRegistry::from_providers(&[&ProjectModel], &MetadataConfig::default())
        .expect("load");

    assert!(registry.is_frozen());
    assert_eq!(
        registry.get_hash_by_fqn("strata.project.ModuleEntity"),
        Some(MetadataHash::from_raw(42))
    );
}

#[test]
fn concurrent_readers_see_registered_metadata() {
    let registry = Arc::new(
        MetadataRegistry::from_providers(&[&ProjectModel], &MetadataConfig::default())
            .expect("load"),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                registry
                    .get_metadata_by_type_fqn_or_null("strata.project.ModuleEntity")
                    .is_some()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("reader thread"));
    }
}

#[test]
fn global_registry_is_installed_once() {
    let registry = MetadataRegistry::new();
    registry.add_metadata(module_entity()).expect("register");
    registry.freeze();

    let installed = MetadataRegistry::install_global(registry).expect("first install");
    assert!(std::ptr::eq(installed, MetadataRegistry::global()));
    assert_eq!(
        MetadataRegistry::install_global(MetadataRegistry::new()).map(|_| ()),
        Err(MetadataError::AlreadyInstalled)
    );
}
