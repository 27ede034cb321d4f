//! Curation rules as a closed set of variants.
//!
//! Rules are built leniently from configuration values: a rule with an
//! unknown or missing `type` becomes [`Rule::Unsupported`] and a filter whose
//! condition does not parse keeps the error for the engine to report. Only
//! the rule-set envelope is validated strictly (see [`crate::config`]).

use std::fmt;

use serde_json::Value as Json;

use crate::predicate::Predicate;
use crate::table::Keep;

pub const UNNAMED: &str = "unnamed";

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Missing,
    Invalid { source: String, error: String },
    Parsed(Predicate),
}

impl Condition {
    pub fn parse(source: Option<&str>) -> Self {
        match source.map(str::trim) {
            None | Some("") => Condition::Missing,
            Some(text) => match Predicate::parse(text) {
                Ok(predicate) => Condition::Parsed(predicate),
                Err(e) => Condition::Invalid {
                    source: text.to_string(),
                    error: e.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    pub name: String,
    pub condition: Condition,
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOp {
    Lowercase,
    Uppercase,
    Strip,
}

impl TransformOp {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "lowercase" => Some(TransformOp::Lowercase),
            "uppercase" => Some(TransformOp::Uppercase),
            "strip" => Some(TransformOp::Strip),
            _ => None,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            TransformOp::Lowercase => text.to_lowercase(),
            TransformOp::Uppercase => text.to_uppercase(),
            TransformOp::Strip => text.trim().to_string(),
        }
    }
}

/// One `{column, operation}` pair. The operation is kept as written so an
/// unknown name can be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformStep {
    pub column: String,
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformRule {
    pub name: String,
    pub steps: Vec<TransformStep>,
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub column: String,
    pub check_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidateRule {
    pub name: String,
    pub checks: Vec<Check>,
}

// ---------------------------------------------------------------------------
// Deduplicate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicateRule {
    pub name: String,
    /// `None` compares whole rows.
    pub subset: Option<Vec<String>>,
    pub keep: String,
}

impl DeduplicateRule {
    pub fn keep_policy(&self) -> Option<Keep> {
        Keep::parse(&self.keep)
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Filter(FilterRule),
    Transform(TransformRule),
    Validate(ValidateRule),
    Deduplicate(DeduplicateRule),
    Unsupported {
        name: String,
        rule_type: Option<String>,
    },
}

fn str_field(value: &Json, key: &str) -> Option<String> {
    value.get(key).and_then(Json::as_str).map(str::to_string)
}

fn objects<'a>(value: &'a Json, key: &str) -> impl Iterator<Item = &'a Json> {
    value
        .get(key)
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
        .filter(|item| item.is_object())
}

impl Rule {
    pub fn from_value(value: &Json) -> Rule {
        let name = str_field(value, "name").unwrap_or_else(|| UNNAMED.to_string());
        let rule_type = str_field(value, "type");

        match rule_type.as_deref() {
            Some("filter") => Rule::Filter(FilterRule {
                name,
                condition: Condition::parse(value.get("condition").and_then(Json::as_str)),
            }),
            Some("transform") => Rule::Transform(TransformRule {
                name,
                steps: objects(value, "transforms")
                    .map(|t| TransformStep {
                        column: str_field(t, "column").unwrap_or_default(),
                        operation: str_field(t, "operation").unwrap_or_default(),
                    })
                    .collect(),
            }),
            Some("validate") => Rule::Validate(ValidateRule {
                name,
                checks: objects(value, "checks")
                    .map(|c| Check {
                        column: str_field(c, "column").unwrap_or_default(),
                        check_type: str_field(c, "type").unwrap_or_default(),
                    })
                    .collect(),
            }),
            Some("deduplicate") => {
                let subset = value
                    .get("subset")
                    .and_then(Json::as_array)
                    .map(|cols| {
                        cols.iter()
                            .filter_map(Json::as_str)
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .filter(|cols| !cols.is_empty());
                Rule::Deduplicate(DeduplicateRule {
                    name,
                    subset,
                    keep: value
                        .get("keep")
                        .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                        .unwrap_or_else(|| "first".to_string()),
                })
            }
            _ => Rule::Unsupported { name, rule_type },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::Filter(r) => &r.name,
            Rule::Transform(r) => &r.name,
            Rule::Validate(r) => &r.name,
            Rule::Deduplicate(r) => &r.name,
            Rule::Unsupported { name, .. } => name,
        }
    }

    /// The `type` string this rule was declared with.
    pub fn kind(&self) -> &str {
        match self {
            Rule::Filter(_) => "filter",
            Rule::Transform(_) => "transform",
            Rule::Validate(_) => "validate",
            Rule::Deduplicate(_) => "deduplicate",
            Rule::Unsupported { rule_type, .. } => rule_type.as_deref().unwrap_or("<missing>"),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rule '{}'", self.kind(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_condition_parsed_at_build() {
        let rule = Rule::from_value(&json!({"type": "filter", "name": "f", "condition": "id > 2"}));
        match rule {
            Rule::Filter(FilterRule {
                condition: Condition::Parsed(_),
                ..
            }) => {}
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn filter_condition_missing_or_invalid() {
        let missing = Rule::from_value(&json!({"type": "filter"}));
        assert!(matches!(
            missing,
            Rule::Filter(FilterRule {
                condition: Condition::Missing,
                ..
            })
        ));

        let invalid = Rule::from_value(&json!({"type": "filter", "condition": "id >> 2"}));
        match invalid {
            Rule::Filter(FilterRule {
                condition: Condition::Invalid { source, error },
                ..
            }) => {
                assert_eq!(source, "id >> 2");
                assert!(error.contains("offset"));
            }
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn default_name() {
        let rule = Rule::from_value(&json!({"type": "validate", "checks": []}));
        assert_eq!(rule.name(), "unnamed");
        assert_eq!(rule.to_string(), "validate rule 'unnamed'");
    }

    #[test]
    fn transform_steps_in_order() {
        let rule = Rule::from_value(&json!({
            "type": "transform",
            "transforms": [
                {"column": "email", "operation": "lowercase"},
                "not an object",
                {"column": "name", "operation": "titlecase"}
            ]
        }));
        let Rule::Transform(t) = rule else {
            panic!("expected transform");
        };
        assert_eq!(t.steps.len(), 2);
        assert_eq!(t.steps[1].operation, "titlecase");
        assert_eq!(TransformOp::parse(&t.steps[1].operation), None);
    }

    #[test]
    fn deduplicate_defaults() {
        let Rule::Deduplicate(d) = Rule::from_value(&json!({"type": "deduplicate", "subset": []}))
        else {
            panic!("expected deduplicate");
        };
        assert_eq!(d.subset, None);
        assert_eq!(d.keep_policy(), Some(Keep::First));

        let Rule::Deduplicate(d) = Rule::from_value(&json!({
            "type": "deduplicate", "subset": ["id"], "keep": "last"
        })) else {
            panic!("expected deduplicate");
        };
        assert_eq!(d.subset, Some(vec!["id".to_string()]));
        assert_eq!(d.keep_policy(), Some(Keep::Last));
    }

    #[test]
    fn non_string_keep_is_kept_verbatim() {
        let Rule::Deduplicate(d) = Rule::from_value(&json!({"type": "deduplicate", "keep": false}))
        else {
            panic!("expected deduplicate");
        };
        assert_eq!(d.keep, "false");
        assert_eq!(d.keep_policy(), None);
    }

    #[test]
    fn unknown_and_missing_types() {
        let unknown = Rule::from_value(&json!({"type": "sample", "name": "s"}));
        assert_eq!(unknown.kind(), "sample");
        let missing = Rule::from_value(&json!({"name": "m"}));
        assert_eq!(missing.kind(), "<missing>");
        assert!(matches!(Rule::from_value(&json!(42)), Rule::Unsupported { .. }));
    }

    #[test]
    fn transform_ops() {
        assert_eq!(TransformOp::Lowercase.apply("A@X.Com"), "a@x.com");
        assert_eq!(TransformOp::Uppercase.apply("abc"), "ABC");
        assert_eq!(TransformOp::Strip.apply("  x \n"), "x");
    }
}
