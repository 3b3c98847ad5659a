use strata_config::json_schema;

#[test]
fn schema_documents_every_section() {
    let value = serde_json::to_value(json_schema()).expect("schema serializes");

    for section in ["logging", "storage", "metadata", "workspace"] {
        assert!(
            value.pointer(&format!("/properties/{section}")).is_some(),
            "missing `{section}` section"
        );
    }
}

#[test]
fn schema_bounds_page_size() {
    let value = serde_json::to_value(json_schema()).expect("schema serializes");

    let page_size = value
        .pointer("/definitions/StorageConfig/properties/page_size")
        .expect("page_size property");
    assert_eq!(page_size.get("minimum").and_then(|v| v.as_f64()), Some(1.0));
    assert_eq!(page_size.get("maximum").and_then(|v| v.as_f64()), Some(65536.0));
}

#[test]
fn schema_ties_first_wins_to_frozen_registry() {
    let value = serde_json::to_value(json_schema()).expect("schema serializes");

    let all_of = value
        .pointer("/allOf")
        .and_then(|v| v.as_array())
        .expect("root schema should include semantic constraints");

    let found = all_of.iter().any(|rule| {
        rule.pointer("/if/properties/metadata/properties/on_conflict/const")
            .and_then(|v| v.as_str())
            == Some("first_wins")
    });
    assert!(found, "{all_of:?}");
}
