use pretty_assertions::assert_eq;
use strata_config::{MetadataConfig, StrataConfig};
use strata_metadata::{MetadataRegistry, MetadataStorage};
use strata_storage::{EntityStorageRead, StorageError, ValidationError};
use strata_test_utils::{assert_consistent, main_source};
use strata_workspace::project_model::{
    self, content_root, dependents, find_module, library, library_dependency, module,
    module_dependencies, module_dependency, source_root, DependencyScope, SourceRootKind,
    CONTENT_ROOT, LIBRARY, LIBRARY_DEPENDENCY, MODULE, MODULE_DEPENDENCY, SOURCE_ROOT,
};
use strata_workspace::{WorkspaceError, WorkspaceModel};

fn model() -> WorkspaceModel {
    WorkspaceModel::new(project_model::schema(), &StrataConfig::default())
}

#[test]
fn removing_a_module_removes_what_it_owns() {
    let model = model();
    let app = model
        .update("setup", |builder| {
            let app = builder.add_entity(MODULE, module("app"), main_source())?;
            let core = builder.add_entity(MODULE, module("core"), main_source())?;
            let root = builder.add_entity(
                CONTENT_ROOT,
                content_root(app, "file:///app"),
                main_source(),
            )?;
            builder.add_entity(
                SOURCE_ROOT,
                source_root(root, "file:///app/src", SourceRootKind::Source),
                main_source(),
            )?;
            builder.add_entity(
                MODULE_DEPENDENCY,
                module_dependency(app, "core", DependencyScope::Compile),
                main_source(),
            )?;
            builder.add_entity(LIBRARY, library("junit", &["junit.jar"]), main_source())?;
            builder.add_entity(
                LIBRARY_DEPENDENCY,
                library_dependency(app, "junit", DependencyScope::Test),
                main_source(),
            )?;
            builder.add_entity(
                MODULE_DEPENDENCY,
                module_dependency(core, "app", DependencyScope::Runtime),
                main_source(),
            )?;
            Ok(app)
        })
        .expect("setup");

    let before = model.current();
    assert_eq!(module_dependencies(&before, app), vec!["core"]);
    assert_eq!(dependents(&before, "app").len(), 1);

    model
        .update("remove app", |builder| {
            builder.remove_entity(app)?;
            Ok(())
        })
        .expect("remove");

    let after = model.current();
    assert_consistent(&after);
    for owned in [CONTENT_ROOT, SOURCE_ROOT, LIBRARY_DEPENDENCY] {
        assert_eq!(after.entity_count(owned), 0, "{owned}");
    }
    assert_eq!(after.entity_count(MODULE_DEPENDENCY), 1);
    assert_eq!(after.entity_count(LIBRARY), 1);
    // The dependency of `core` on `app` survives as a dangling symbolic reference.
    assert_eq!(dependents(&after, "app").len(), 1);
    assert!(find_module(&after, "app").is_none());
}

#[test]
fn renaming_a_module_updates_dependencies_on_it() {
    let model = model();
    let (core, app) = model
        .update("setup", |builder| {
            let core = builder.add_entity(MODULE, module("core"), main_source())?;
            let app = builder.add_entity(MODULE, module("app"), main_source())?;
            builder.add_entity(
                MODULE_DEPENDENCY,
                module_dependency(app, "core", DependencyScope::Compile),
                main_source(),
            )?;
            Ok((core, app))
        })
        .expect("setup");

    model
        .update("rename", |builder| {
            builder.modify_entity(core, |editor| {
                editor.set("name", "base");
            })?;
            Ok(())
        })
        .expect("rename");

    let current = model.current();
    assert_eq!(module_dependencies(&current, app), vec!["base"]);
    assert_eq!(dependents(&current, "base"), vec![app]);
    assert!(dependents(&current, "core").is_empty());
}

#[test]
fn dependency_on_a_library_of_the_wrong_type_is_rejected() {
    let model = model();
    let err = model
        .update("bad", |builder| {
            let app = builder.add_entity(MODULE, module("app"), main_source())?;
            // A module id where a library id is expected.
            let fields = library_dependency(app, "junit", DependencyScope::Test)
                .with("library", project_model::module_id("junit"));
            builder.add_entity(LIBRARY_DEPENDENCY, fields, main_source())?;
            Ok(())
        })
        .expect_err("wrong symbolic type");
    assert!(
        matches!(
            err,
            WorkspaceError::Storage(StorageError::Validation(
                ValidationError::WrongSymbolicType { .. }
            ))
        ),
        "{err}"
    );
}

#[test]
fn project_model_metadata_is_registered() {
    let registry =
        project_model::metadata_registry(&MetadataConfig::default()).expect("registry");
    assert!(registry.is_frozen());
    for fq_name in [
        "strata.project.ModuleEntity",
        "strata.project.ContentRootEntity",
        "strata.project.SourceRootEntity",
        "strata.project.LibraryEntity",
        "strata.project.ModuleDependencyEntity",
        "strata.project.LibraryDependencyEntity",
    ] {
        assert!(
            registry.get_metadata_by_type_fqn_or_null(fq_name).is_some(),
            "{fq_name}"
        );
    }

    let exported = registry.export();
    let again = MetadataRegistry::new();
    model().register_metadata(&again).expect("register");
    assert!(again.check_compatibility(&exported).is_compatible());
}

#[test]
fn registering_into_a_frozen_registry_fails() {
    let registry = MetadataRegistry::new();
    registry.freeze();
    assert!(matches!(
        model().register_metadata(&registry),
        Err(WorkspaceError::Metadata(_))
    ));
}

#[test]
fn dependency_scopes_round_trip_through_their_names() {
    for scope in [
        DependencyScope::Compile,
        DependencyScope::Test,
        DependencyScope::Runtime,
        DependencyScope::Provided,
    ] {
        assert_eq!(DependencyScope::parse(scope.as_str()), Some(scope));
    }
    assert_eq!(DependencyScope::parse("system"), None);
}
