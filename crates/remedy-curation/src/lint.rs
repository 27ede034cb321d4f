//! Rule-set validation: lint rules and diagnostics.
//!
//! Each lint flags a rule the engine would skip or run as a no-op. Call
//! [`lint`] for advisory diagnostics or [`lint_or_raise`] to fail on the
//! first `Error`-severity issue.

use crate::config::RuleSet;
use crate::rules::{Condition, Rule, TransformOp};
use crate::table::Keep;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub lint: String,
    pub severity: Severity,
    pub message: String,
    /// Position of the offending rule in the rule list.
    pub rule_index: Option<usize>,
    pub rule_name: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, rule_set: &RuleSet) -> Vec<Diagnostic>;
}

fn diagnostic(
    lint: &dyn LintRule,
    severity: Severity,
    index: usize,
    rule: &Rule,
    message: String,
    fix: Option<&str>,
) -> Diagnostic {
    Diagnostic {
        lint: lint.name().into(),
        severity,
        message,
        rule_index: Some(index),
        rule_name: Some(rule.name().to_string()),
        fix: fix.map(Into::into),
    }
}

// ---------------------------------------------------------------------------
// Lints
// ---------------------------------------------------------------------------

struct SupportedTypeLint;
impl LintRule for SupportedTypeLint {
    fn name(&self) -> &str { "supported_type" }
    fn apply(&self, rule_set: &RuleSet) -> Vec<Diagnostic> {
        rule_set
            .rules
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| match rule {
                Rule::Unsupported { rule_type, .. } => Some(diagnostic(
                    self,
                    Severity::Error,
                    i,
                    rule,
                    match rule_type {
                        Some(t) => format!("Rule {i} has unsupported type '{t}'"),
                        None => format!("Rule {i} has no type"),
                    },
                    Some("Use one of: filter, transform, validate, deduplicate"),
                )),
                _ => None,
            })
            .collect()
    }
}

struct FilterConditionLint;
impl LintRule for FilterConditionLint {
    fn name(&self) -> &str { "filter_condition" }
    fn apply(&self, rule_set: &RuleSet) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, rule) in rule_set.rules.iter().enumerate() {
            let Rule::Filter(filter) = rule else { continue };
            match &filter.condition {
                Condition::Parsed(_) => {}
                Condition::Missing => out.push(diagnostic(
                    self,
                    Severity::Error,
                    i,
                    rule,
                    format!("Filter '{}' has no condition", filter.name),
                    Some("Add a condition such as \"id > 2\""),
                )),
                Condition::Invalid { source, error } => out.push(diagnostic(
                    self,
                    Severity::Error,
                    i,
                    rule,
                    format!("Filter '{}' condition '{source}' does not parse: {error}", filter.name),
                    None,
                )),
            }
        }
        out
    }
}

struct TransformOperationLint;
impl LintRule for TransformOperationLint {
    fn name(&self) -> &str { "transform_operation" }
    fn apply(&self, rule_set: &RuleSet) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (i, rule) in rule_set.rules.iter().enumerate() {
            let Rule::Transform(transform) = rule else { continue };
            for step in &transform.steps {
                if step.column.is_empty() {
                    out.push(diagnostic(
                        self,
                        Severity::Warning,
                        i,
                        rule,
                        format!("Transform '{}' has a step without a column", transform.name),
                        None,
                    ));
                }
                if TransformOp::parse(&step.operation).is_none() {
                    out.push(diagnostic(
                        self,
                        Severity::Warning,
                        i,
                        rule,
                        format!(
                            "Transform '{}' uses unknown operation '{}' on column '{}'",
                            transform.name, step.operation, step.column
                        ),
                        Some("Use one of: lowercase, uppercase, strip"),
                    ));
                }
            }
        }
        out
    }
}

struct EmptyRuleLint;
impl LintRule for EmptyRuleLint {
    fn name(&self) -> &str { "empty_rule" }
    fn apply(&self, rule_set: &RuleSet) -> Vec<Diagnostic> {
        rule_set
            .rules
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| {
                let what = match rule {
                    Rule::Transform(t) if t.steps.is_empty() => "transforms",
                    Rule::Validate(v) if v.checks.is_empty() => "checks",
                    _ => return None,
                };
                Some(diagnostic(
                    self,
                    Severity::Warning,
                    i,
                    rule,
                    format!("{rule} has no {what}; it does nothing"),
                    None,
                ))
            })
            .collect()
    }
}

struct KeepPolicyLint;
impl LintRule for KeepPolicyLint {
    fn name(&self) -> &str { "keep_policy" }
    fn apply(&self, rule_set: &RuleSet) -> Vec<Diagnostic> {
        rule_set
            .rules
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| match rule {
                Rule::Deduplicate(d) if Keep::parse(&d.keep).is_none() => Some(diagnostic(
                    self,
                    Severity::Error,
                    i,
                    rule,
                    format!("Deduplicate '{}' has invalid keep policy '{}'", d.name, d.keep),
                    Some("Use keep = \"first\" or keep = \"last\""),
                )),
                _ => None,
            })
            .collect()
    }
}

/// Run all lints against a rule set.
pub fn lint(rule_set: &RuleSet) -> Vec<Diagnostic> {
    let lints: Vec<Box<dyn LintRule>> = vec![
        Box::new(SupportedTypeLint),
        Box::new(FilterConditionLint),
        Box::new(TransformOperationLint),
        Box::new(EmptyRuleLint),
        Box::new(KeepPolicyLint),
    ];

    let mut diagnostics = Vec::new();
    for l in &lints {
        diagnostics.extend(l.apply(rule_set));
    }
    diagnostics
}

/// Run all lints; return `Err` if any `Error`-severity diagnostic found.
pub fn lint_or_raise(rule_set: &RuleSet) -> remedy_types::Result<Vec<Diagnostic>> {
    let diagnostics = lint(rule_set);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(remedy_types::RemedyError::InvalidConfig {
            field: "rules".into(),
            message: messages.join("; "),
        });
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
