//! Compatibility check between a persisted (cached) descriptor and the one
//! compiled into the running build.
//!
//! Data written under `cached` can be read back under `current` when:
//! - both descriptors describe the same kind of type under the same name,
//! - every persisted (non-computable) property still exists with a compatible type,
//! - every new persisted property has a default value,
//! - enum constants and abstract subclasses were only ever appended.

use std::fmt;

use crate::model::{
    AbstractClassMetadata, EntityMetadata, FinalClassMetadata, OwnPropertyMetadata,
    StorageTypeMetadata, ValueTypeMetadata,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComparisonResult {
    Equal,
    NotEqual(String),
}

impl ComparisonResult {
    pub fn is_equal(&self) -> bool {
        matches!(self, ComparisonResult::Equal)
    }

    fn and_then(self, next: impl FnOnce() -> ComparisonResult) -> ComparisonResult {
        match self {
            ComparisonResult::Equal => next(),
            not_equal => not_equal,
        }
    }
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonResult::Equal => f.write_str("equal"),
            ComparisonResult::NotEqual(reason) => write!(f, "not equal: {reason}"),
        }
    }
}

fn not_equal(reason: impl Into<String>) -> ComparisonResult {
    ComparisonResult::NotEqual(reason.into())
}

pub fn compare_metadata(
    cached: &StorageTypeMetadata,
    current: &StorageTypeMetadata,
) -> ComparisonResult {
    if cached.fq_name() != current.fq_name() {
        return not_equal(format!(
            "type name changed from `{}` to `{}`",
            cached.fq_name(),
            current.fq_name()
        ));
    }

    match (cached, current) {
        (StorageTypeMetadata::Entity(cached), StorageTypeMetadata::Entity(current)) => {
            compare_entities(cached, current)
        }
        (StorageTypeMetadata::FinalClass(cached), StorageTypeMetadata::FinalClass(current)) => {
            compare_final_classes(cached, current)
        }
        (
            StorageTypeMetadata::AbstractClass(cached),
            StorageTypeMetadata::AbstractClass(current),
        ) => compare_abstract_classes(cached, current),
        _ => not_equal(format!(
            "`{}` changed from {} to {}",
            cached.fq_name(),
            cached.kind_name(),
            current.kind_name()
        )),
    }
}

fn compare_entities(cached: &EntityMetadata, current: &EntityMetadata) -> ComparisonResult {
    if cached.entity_data_fq_name != current.entity_data_fq_name {
        return not_equal(format!(
            "entity data type of `{}` changed from `{}` to `{}`",
            current.fq_name, cached.entity_data_fq_name, current.entity_data_fq_name
        ));
    }
    if cached.is_abstract != current.is_abstract {
        return not_equal(format!("abstractness of `{}` changed", current.fq_name));
    }
    compare_properties(&current.fq_name, &cached.properties, &current.properties)
}

fn compare_final_classes(
    cached: &FinalClassMetadata,
    current: &FinalClassMetadata,
) -> ComparisonResult {
    let fq_name = current.fq_name();
    match (cached, current) {
        (FinalClassMetadata::KnownClass { .. }, FinalClassMetadata::KnownClass { .. }) => {
            ComparisonResult::Equal
        }
        (FinalClassMetadata::Class { .. }, FinalClassMetadata::Class { .. })
        | (FinalClassMetadata::Object { .. }, FinalClassMetadata::Object { .. }) => {
            compare_properties(fq_name, cached.properties(), current.properties())
        }
        (
            FinalClassMetadata::Enum {
                values: cached_values,
                ..
            },
            FinalClassMetadata::Enum {
                values: current_values,
                ..
            },
        ) => {
            // Constants are persisted by position.
            if !current_values.starts_with(cached_values) {
                return not_equal(format!(
                    "enum `{fq_name}` constants changed from {cached_values:?} to {current_values:?}"
                ));
            }
            compare_properties(fq_name, cached.properties(), current.properties())
        }
        _ => not_equal(format!(
            "`{fq_name}` changed from {} to {}",
            StorageTypeMetadata::FinalClass(cached.clone()).kind_name(),
            StorageTypeMetadata::FinalClass(current.clone()).kind_name()
        )),
    }
}

fn compare_abstract_classes(
    cached: &AbstractClassMetadata,
    current: &AbstractClassMetadata,
) -> ComparisonResult {
    for cached_subclass in &cached.subclasses {
        let Some(current_subclass) = current
            .subclasses
            .iter()
            .find(|subclass| subclass.fq_name() == cached_subclass.fq_name())
        else {
            return not_equal(format!(
                "subclass `{}` of `{}` was removed",
                cached_subclass.fq_name(),
                current.fq_name
            ));
        };
        let result = compare_final_classes(cached_subclass, current_subclass);
        if !result.is_equal() {
            return result;
        }
    }
    compare_properties(&current.fq_name, &cached.properties, &current.properties)
}

fn compare_properties(
    owner: &str,
    cached: &[OwnPropertyMetadata],
    current: &[OwnPropertyMetadata],
) -> ComparisonResult {
    let cached: Vec<&OwnPropertyMetadata> =
        cached.iter().filter(|prop| !prop.is_computable).collect();
    let current: Vec<&OwnPropertyMetadata> =
        current.iter().filter(|prop| !prop.is_computable).collect();

    for cached_prop in &cached {
        let name = &cached_prop.name;
        let Some(current_prop) = current.iter().find(|prop| &prop.name == name) else {
            return not_equal(format!("property `{owner}.{name}` was removed"));
        };
        let result = compare_value_types(&cached_prop.value_type, &current_prop.value_type)
            .and_then(|| {
                if cached_prop.is_key != current_prop.is_key {
                    not_equal("key flag changed")
                } else {
                    ComparisonResult::Equal
                }
            });
        if let ComparisonResult::NotEqual(reason) = result {
            return not_equal(format!("property `{owner}.{name}`: {reason}"));
        }
    }

    for current_prop in &current {
        let name = &current_prop.name;
        let is_new = !cached.iter().any(|prop| &prop.name == name);
        if is_new && !current_prop.with_default {
            return not_equal(format!(
                "property `{owner}.{name}` was added without a default value"
            ));
        }
    }

    ComparisonResult::Equal
}

fn compare_value_types(cached: &ValueTypeMetadata, current: &ValueTypeMetadata) -> ComparisonResult {
    match (cached, current) {
        (
            ValueTypeMetadata::Primitive {
                type_name: cached_name,
                is_nullable: cached_nullable,
            },
            ValueTypeMetadata::Primitive {
                type_name: current_name,
                is_nullable: current_nullable,
            },
        ) => {
            if cached_name != current_name {
                not_equal(format!("type changed from `{cached_name}` to `{current_name}`"))
            } else if cached_nullable != current_nullable {
                not_equal("nullability changed")
            } else {
                ComparisonResult::Equal
            }
        }
        (
            ValueTypeMetadata::Custom {
                type_metadata: cached_type,
                is_nullable: cached_nullable,
            },
            ValueTypeMetadata::Custom {
                type_metadata: current_type,
                is_nullable: current_nullable,
            },
        ) => {
            if cached_nullable != current_nullable {
                return not_equal("nullability changed");
            }
            compare_metadata(cached_type, current_type)
        }
        (
            ValueTypeMetadata::EntityReference {
                connection_type: cached_connection,
                entity_fq_name: cached_target,
                is_child: cached_child,
                is_nullable: cached_nullable,
            },
            ValueTypeMetadata::EntityReference {
                connection_type: current_connection,
                entity_fq_name: current_target,
                is_child: current_child,
                is_nullable: current_nullable,
            },
        ) => {
            if cached_target != current_target {
                not_equal(format!(
                    "reference target changed from `{cached_target}` to `{current_target}`"
                ))
            } else if cached_connection != current_connection {
                not_equal(format!(
                    "connection changed from {cached_connection:?} to {current_connection:?}"
                ))
            } else if cached_child != current_child || cached_nullable != current_nullable {
                not_equal("reference ownership changed")
            } else {
                ComparisonResult::Equal
            }
        }
        (
            ValueTypeMetadata::Parameterized {
                generic: cached_generic,
                arguments: cached_arguments,
            },
            ValueTypeMetadata::Parameterized {
                generic: current_generic,
                arguments: current_arguments,
            },
        ) => {
            if cached_arguments.len() != current_arguments.len() {
                return not_equal("type arguments changed");
            }
            cached_arguments.iter().zip(current_arguments).fold(
                compare_value_types(cached_generic, current_generic),
                |acc, (cached, current)| acc.and_then(|| compare_value_types(cached, current)),
            )
        }
        _ => not_equal("value type kind changed"),
    }
}
