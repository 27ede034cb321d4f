//! Rule engine: reduces an ordered rule list over a table.
//!
//! Each rule sees the output of the one before it. A rule that cannot be
//! applied (bad predicate, missing column, unknown type) leaves the table as
//! it was and the pipeline moves on.

use std::sync::Arc;

use remedy_types::{EventSink, RemedyError, TracingSink};

use crate::config::RuleSet;
use crate::events::CurationEvent;
use crate::rules::{
    Condition, DeduplicateRule, FilterRule, Rule, TransformOp, TransformRule, ValidateRule,
};
use crate::table::{Table, Value};

pub struct RuleEngine {
    rules: Vec<Rule>,
    sink: Arc<dyn EventSink<CurationEvent>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn from_rule_set(rule_set: &RuleSet) -> Self {
        Self::new(rule_set.rules.clone())
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink<CurationEvent>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Apply every rule in order. The input table is not modified.
    pub fn apply(&self, table: &Table) -> Table {
        self.rules
            .iter()
            .fold(table.clone(), |current, rule| self.apply_rule(&current, rule))
    }

    pub fn apply_rule(&self, table: &Table, rule: &Rule) -> Table {
        let result = match rule {
            Rule::Filter(r) => self.filter(table, r),
            Rule::Transform(r) => Some(self.transform(table, r)),
            Rule::Validate(r) => {
                self.validate(table, r);
                Some(table.clone())
            }
            Rule::Deduplicate(r) => self.deduplicate(table, r),
            Rule::Unsupported { name, rule_type } => {
                self.sink.record(CurationEvent::RuleSkipped {
                    rule: name.clone(),
                    rule_type: rule_type.clone().unwrap_or_else(|| "<missing>".to_string()),
                });
                None
            }
        };

        match result {
            Some(out) => {
                self.sink.record(CurationEvent::RuleApplied {
                    rule: rule.name().to_string(),
                    kind: rule.kind().to_string(),
                    rows_before: table.len(),
                    rows_after: out.len(),
                });
                out
            }
            None => table.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    fn filter(&self, table: &Table, rule: &FilterRule) -> Option<Table> {
        let outcome = match &rule.condition {
            Condition::Parsed(predicate) => table.filter(predicate).map_err(|e| e.to_string()),
            Condition::Missing => Err("filter rule missing condition".to_string()),
            Condition::Invalid { source, error } => Err(format!("'{source}': {error}")),
        };
        match outcome {
            Ok(out) => Some(out),
            Err(error) => {
                self.sink.record(CurationEvent::FilterFailed {
                    rule: rule.name.clone(),
                    error,
                });
                None
            }
        }
    }

    fn transform(&self, table: &Table, rule: &TransformRule) -> Table {
        let mut current = table.clone();
        for step in &rule.steps {
            if !current.has_column(&step.column) {
                self.sink.record(CurationEvent::ColumnNotFound {
                    rule: rule.name.clone(),
                    column: step.column.clone(),
                });
                continue;
            }
            let Some(op) = TransformOp::parse(&step.operation) else {
                self.sink.record(CurationEvent::UnknownOperation {
                    rule: rule.name.clone(),
                    column: step.column.clone(),
                    operation: step.operation.clone(),
                });
                continue;
            };

            let mapped = current.map_column(&step.column, |value| match value {
                Value::Str(s) => Ok(Value::Str(op.apply(s))),
                v if v.is_null() => Ok(v.clone()),
                other => Err(RemedyError::Other(format!(
                    "cannot apply string operation to {} value {other}",
                    other.type_name()
                ))),
            });
            match mapped {
                Ok(out) => current = out,
                Err(e) => self.sink.record(CurationEvent::TransformFailed {
                    rule: rule.name.clone(),
                    column: step.column.clone(),
                    error: e.to_string(),
                }),
            }
        }
        current
    }

    fn validate(&self, table: &Table, rule: &ValidateRule) {
        for check in &rule.checks {
            match table.null_count(&check.column) {
                Some(nulls) => self.sink.record(CurationEvent::ValidationChecked {
                    rule: rule.name.clone(),
                    column: check.column.clone(),
                    check_type: check.check_type.clone(),
                    valid: table.len() - nulls,
                    total: table.len(),
                }),
                None => self.sink.record(CurationEvent::ColumnNotFound {
                    rule: rule.name.clone(),
                    column: check.column.clone(),
                }),
            }
        }
    }

    fn deduplicate(&self, table: &Table, rule: &DeduplicateRule) -> Option<Table> {
        let outcome = match rule.keep_policy() {
            Some(keep) => table
                .drop_duplicates(rule.subset.as_deref(), keep)
                .map_err(|e| e.to_string()),
            None => Err(format!("invalid keep policy '{}'", rule.keep)),
        };
        match outcome {
            Ok(out) => Some(out),
            Err(error) => {
                self.sink.record(CurationEvent::DeduplicateFailed {
                    rule: rule.name.clone(),
                    error,
                });
                None
            }
        }
    }
}

/// Apply `rules` to `table` with events forwarded to `tracing`.
pub fn apply_rules(table: &Table, rules: &[Rule]) -> Table {
    RuleEngine::new(rules.to_vec()).apply(table)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
