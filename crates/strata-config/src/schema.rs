use schemars::schema::{RootSchema, Schema};
use schemars::schema_for;
use serde_json::json;

use crate::StrataConfig;

/// JSON schema for `strata.toml`.
///
/// Intended for editor tooling and CI validation of checked-in config files.
#[must_use]
pub fn json_schema() -> RootSchema {
    let mut schema = schema_for!(StrataConfig);
    apply_semantic_constraints(&mut schema);
    schema
}

fn apply_semantic_constraints(schema: &mut RootSchema) {
    // JSON Schema does not apply defaults, so the rule only fires when both keys are explicit.
    // A registry that silently keeps the first descriptor must not stay open for later edits.
    push_all_of(
        schema,
        schema_from_json(json!({
            "if": {
                "required": ["metadata"],
                "properties": {
                    "metadata": {
                        "required": ["on_conflict"],
                        "properties": {
                            "on_conflict": { "const": "first_wins" }
                        }
                    }
                }
            },
            "then": {
                "properties": {
                    "metadata": {
                        "properties": {
                            "freeze_on_load": { "const": true }
                        }
                    }
                }
            }
        })),
    );
}

fn push_all_of(root: &mut RootSchema, schema: Schema) {
    let subschemas = root.schema.subschemas();
    subschemas.all_of.get_or_insert_with(Vec::new).push(schema);
}

fn schema_from_json(value: serde_json::Value) -> Schema {
    serde_json::from_value(value).expect("valid json schema")
}
