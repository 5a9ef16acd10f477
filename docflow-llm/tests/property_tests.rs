//! Property-based tests for docflow-llm
//!
//! Covers the round-trip/idempotence property named in the system design
//! doc: `parse_llm_json` is idempotent on any valid JSON — re-parsing the
//! serialized form of a successful parse returns the same value.

use docflow_llm::parse_llm_json;
use proptest::prelude::*;
use serde_json::Value;

fn arb_json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,20}".prop_map(Value::from),
    ]
}

fn arb_json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9_]{0,10}", arb_json_scalar(), 0..6)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

fn arb_json_array() -> impl Strategy<Value = Value> {
    prop::collection::vec(arb_json_scalar(), 0..6).prop_map(Value::Array)
}

proptest! {
    #[test]
    fn parse_llm_json_roundtrips_clean_objects(value in arb_json_object()) {
        let rendered = serde_json::to_string(&value).unwrap();
        let parsed = parse_llm_json(&rendered).expect("clean JSON object parses");
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn parse_llm_json_roundtrips_clean_arrays(value in arb_json_array()) {
        let rendered = serde_json::to_string(&value).unwrap();
        let parsed = parse_llm_json(&rendered).expect("clean JSON array parses");
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn parse_llm_json_is_idempotent_on_valid_json(value in arb_json_object()) {
        let rendered = serde_json::to_string(&value).unwrap();
        let first = parse_llm_json(&rendered).expect("first parse succeeds");
        let reserialized = serde_json::to_string(&first).unwrap();
        let second = parse_llm_json(&reserialized).expect("second parse succeeds");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn parse_llm_json_tolerates_surrounding_prose(
        value in arb_json_object(),
        prefix in "[a-zA-Z0-9 ]{0,30}",
        suffix in "[a-zA-Z0-9 ]{0,30}",
    ) {
        let rendered = serde_json::to_string(&value).unwrap();
        let wrapped = format!("{prefix} {rendered} {suffix}");
        let parsed = parse_llm_json(&wrapped).expect("object surrounded by prose still parses");
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn parse_llm_json_tolerates_trailing_commas(value in arb_json_array()) {
        prop_assume!(!value.as_array().unwrap().is_empty());
        let rendered = serde_json::to_string(&value).unwrap();
        let with_trailing_comma = rendered.replacen(']', ",]", 1);
        let parsed = parse_llm_json(&with_trailing_comma).expect("trailing comma is repaired");
        prop_assert_eq!(parsed, value);
    }
}
