//! End-to-end tests for the curation pipeline.
//!
//! Each test goes from a rule-set document to a curated table and its report.

use std::sync::Arc;

use proptest::prelude::*;
use remedy_curation::{
    apply_rules, lint, lint_or_raise, report, CurationAgent, CurationEvent, RuleEngine, RuleSet,
    Table, Value,
};
use remedy_types::{RecordingSink, RemedyError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rules(json: &str) -> RuleSet {
    RuleSet::from_json_str(json).expect("rule set should parse")
}

fn recording_engine(set: &RuleSet) -> (RuleEngine, Arc<RecordingSink<CurationEvent>>) {
    let sink = Arc::new(RecordingSink::<CurationEvent>::new());
    (RuleEngine::from_rule_set(set).with_sink(sink.clone()), sink)
}

fn ids(table: &Table) -> Vec<i64> {
    table
        .column("id")
        .expect("id column")
        .iter()
        .map(|v| match v {
            Value::Int(i) => *i,
            other => panic!("non-int id {other:?}"),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Test 1: Deduplicate on a subset keeps the first occurrence
// ---------------------------------------------------------------------------

#[test]
fn dedup_subset_keep_first() {
    let table = Table::from_json_str(
        r#"[{"id": 1, "name": "A"}, {"id": 1, "name": "A'"}, {"id": 2, "name": "B"}]"#,
    )
    .unwrap();
    let set = rules(
        r#"{"name": "d", "rules": [{"type": "deduplicate", "subset": ["id"], "keep": "first"}]}"#,
    );

    let out = RuleEngine::from_rule_set(&set).apply(&table);
    assert_eq!(
        out.to_json_records(),
        serde_json::json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}])
    );
}

// ---------------------------------------------------------------------------
// Test 2: Filter keeps exactly the matching rows
// ---------------------------------------------------------------------------

#[test]
fn filter_id_greater_than_two() {
    let table = Table::new(vec![("id", (1..=5).map(Value::Int).collect())]).unwrap();
    let set = rules(r#"{"name": "f", "rules": [{"type": "filter", "condition": "id > 2"}]}"#);
    assert_eq!(ids(&RuleEngine::from_rule_set(&set).apply(&table)), vec![3, 4, 5]);
}

#[test]
fn filter_compound_condition() {
    let table = Table::from_json_str(
        r#"[
            {"id": 1, "status": "active"},
            {"id": 3, "status": "inactive"},
            {"id": 4, "status": "active"},
            {"id": 5, "status": null}
        ]"#,
    )
    .unwrap();
    let set = rules(
        r#"{"name": "f", "rules": [
            {"type": "filter", "condition": "id > 2 and status == 'active'"}
        ]}"#,
    );
    assert_eq!(ids(&RuleEngine::from_rule_set(&set).apply(&table)), vec![4]);
}

// ---------------------------------------------------------------------------
// Test 3: Transform lowercases; unknown operations warn and skip
// ---------------------------------------------------------------------------

#[test]
fn transform_lowercase_and_unknown_operation() {
    let table = Table::from_json_str(
        r#"[{"email": "Ann@X.COM", "name": "Ann"}, {"email": "BOB@x.com", "name": "Bob"}]"#,
    )
    .unwrap();
    let set = rules(
        r#"{"name": "t", "rules": [{"type": "transform", "transforms": [
            {"column": "email", "operation": "lowercase"},
            {"column": "name", "operation": "reverse"}
        ]}]}"#,
    );
    let (engine, sink) = recording_engine(&set);
    let out = engine.apply(&table);

    for value in out.column("email").unwrap() {
        let text = value.as_str().unwrap();
        assert_eq!(text, text.to_lowercase());
    }
    assert_eq!(out.column("name"), table.column("name"));
    assert!(sink.events().iter().any(|e| matches!(
        e,
        CurationEvent::UnknownOperation { operation, .. } if operation == "reverse"
    )));
}

// ---------------------------------------------------------------------------
// Test 4: Report on five rows with one missing email
// ---------------------------------------------------------------------------

#[test]
fn report_counts_missing_email() {
    let table = Table::from_json_str(
        r#"[
            {"id": 1, "email": "a@x.com"},
            {"id": 2, "email": "b@x.com"},
            {"id": 3, "email": null},
            {"id": 4, "email": "d@x.com"},
            {"id": 5, "email": "e@x.com"}
        ]"#,
    )
    .unwrap();
    let report = report(&table);
    assert_eq!(report.total_records, 5);
    assert_eq!(report.missing_values["email"], 1);
    assert_eq!(report.dtypes["id"], "int64");
}

// ---------------------------------------------------------------------------
// Test 5: Unknown rule types change nothing and never raise
// ---------------------------------------------------------------------------

#[test]
fn unknown_rule_type_is_noop() {
    let table = Table::new(vec![("id", vec![Value::Int(1), Value::Int(2)])]).unwrap();
    let set = rules(
        r#"{"name": "u", "rules": [
            {"type": "pivot", "name": "p"},
            {"type": "filter", "condition": "id >= 2"}
        ]}"#,
    );
    let (engine, sink) = recording_engine(&set);
    assert_eq!(ids(&engine.apply(&table)), vec![2]);
    assert!(matches!(
        sink.events().first(),
        Some(CurationEvent::RuleSkipped { rule_type, .. }) if rule_type == "pivot"
    ));
    assert_eq!(lint(&set).len(), 1);
}

// ---------------------------------------------------------------------------
// Test 6: Per-rule failures are isolated
// ---------------------------------------------------------------------------

#[test]
fn failing_rule_does_not_stop_pipeline() {
    let table = Table::from_json_str(r#"[{"id": 1, "tag": " x "}, {"id": 2, "tag": " y "}]"#)
        .unwrap();
    let set = rules(
        r#"{"name": "iso", "rules": [
            {"type": "filter", "condition": "missing_column == 1"},
            {"type": "transform", "transforms": [{"column": "tag", "operation": "strip"}]},
            {"type": "filter", "condition": "tag == 'y'"}
        ]}"#,
    );
    let (engine, sink) = recording_engine(&set);
    let out = engine.apply(&table);
    assert_eq!(ids(&out), vec![2]);
    assert_eq!(
        sink.events()
            .iter()
            .filter(|e| matches!(e, CurationEvent::FilterFailed { .. }))
            .count(),
        1
    );
}

// ---------------------------------------------------------------------------
// Test 7: Configuration errors are fatal at load time
// ---------------------------------------------------------------------------

#[test]
fn config_errors_are_fatal() {
    for (doc, expected) in [
        (r#"{"rules": []}"#, "name"),
        (r#"{"name": "x"}"#, "rules"),
        (r#"{"name": "x", "rules": "filter"}"#, "rules"),
    ] {
        match RuleSet::from_json_str(doc).unwrap_err() {
            RemedyError::MissingKey(key) => assert_eq!(key, expected),
            RemedyError::InvalidConfig { field, .. } => assert_eq!(field, expected),
            other => panic!("unexpected error for {doc}: {other:?}"),
        }
    }
}

#[test]
fn lint_rejects_non_string_keep() {
    let set = rules(
        r#"{"name": "k", "rules": [{"type": "deduplicate", "subset": ["id"], "keep": false}]}"#,
    );
    match lint_or_raise(&set).unwrap_err() {
        RemedyError::InvalidConfig { field, message } => {
            assert_eq!(field, "rules");
            assert!(message.contains("'false'"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let table = Table::new(vec![("id", vec![Value::Int(1), Value::Int(1), Value::Int(2)])])
        .unwrap();
    let (engine, sink) = recording_engine(&set);
    assert_eq!(engine.apply(&table), table);
    assert!(matches!(
        sink.events().as_slice(),
        [CurationEvent::DeduplicateFailed { .. }]
    ));
}

// ---------------------------------------------------------------------------
// Test 8: TOML rule file through the agent
// ---------------------------------------------------------------------------

#[test]
fn toml_rule_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("users.toml");
    std::fs::write(
        &rules_path,
        r#"
name = "users"
version = "1.0"

[[rules]]
type = "deduplicate"
subset = ["email"]
keep = "last"

[[rules]]
type = "validate"
checks = [{ column = "email", type = "not_null" }]
"#,
    )
    .unwrap();
    let input = dir.path().join("users.json");
    std::fs::write(
        &input,
        r#"[{"id": 1, "email": "a"}, {"id": 2, "email": "a"}, {"id": 3, "email": "b"}]"#,
    )
    .unwrap();
    let output = dir.path().join("curated.json");

    let agent = CurationAgent::from_path(&rules_path).unwrap();
    assert_eq!(agent.rule_set().version.as_deref(), Some("1.0"));
    let report = agent.curate_file(&input, &output).unwrap();
    assert_eq!(report.total_records, 2);
    assert_eq!(ids(&Table::read_json(&output).unwrap()), vec![2, 3]);
}

// ---------------------------------------------------------------------------
// Test 9: Splitting a rule list never changes the result
// ---------------------------------------------------------------------------

fn rule_pool() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({"type": "filter", "condition": "id > 2"}),
        serde_json::json!({"type": "filter", "condition": "tag != 'b'"}),
        serde_json::json!({"type": "filter", "condition": "nope > 1"}),
        serde_json::json!({"type": "transform", "transforms": [{"column": "tag", "operation": "uppercase"}]}),
        serde_json::json!({"type": "transform", "transforms": [{"column": "tag", "operation": "lowercase"}]}),
        serde_json::json!({"type": "deduplicate", "subset": ["tag"]}),
        serde_json::json!({"type": "deduplicate", "subset": ["tag"], "keep": "last"}),
        serde_json::json!({"type": "validate", "checks": [{"column": "tag", "type": "not_null"}]}),
        serde_json::json!({"type": "unknown"}),
    ]
}

proptest! {
    #[test]
    fn split_application_matches_whole(
        picks in prop::collection::vec(0usize..9, 0..8),
        split in 0usize..8,
        data in prop::collection::vec((0i64..6, prop::option::of(0usize..3)), 0..12),
    ) {
        let pool = rule_pool();
        let rules: Vec<_> = picks
            .iter()
            .map(|&i| remedy_curation::Rule::from_value(&pool[i]))
            .collect();
        let split = split.min(rules.len());

        let tags = ["a", "b", "C"];
        let table = Table::new(vec![
            ("id", data.iter().map(|(id, _)| Value::Int(*id)).collect()),
            ("tag", data.iter().map(|(_, t)| Value::from(t.map(|i| tags[i]))).collect()),
        ])
        .unwrap();

        let whole = apply_rules(&table, &rules);
        let staged = apply_rules(&apply_rules(&table, &rules[..split]), &rules[split..]);
        prop_assert_eq!(whole, staged);
    }
}
