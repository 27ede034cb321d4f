//! Events recorded while curating a table.

use remedy_types::{EventLevel, Observable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CurationEvent {
    RuleSetLoaded {
        name: String,
        rules: usize,
    },
    RuleApplied {
        rule: String,
        kind: String,
        rows_before: usize,
        rows_after: usize,
    },
    RuleSkipped {
        rule: String,
        rule_type: String,
    },
    FilterFailed {
        rule: String,
        error: String,
    },
    ColumnNotFound {
        rule: String,
        column: String,
    },
    UnknownOperation {
        rule: String,
        column: String,
        operation: String,
    },
    TransformFailed {
        rule: String,
        column: String,
        error: String,
    },
    ValidationChecked {
        rule: String,
        column: String,
        check_type: String,
        valid: usize,
        total: usize,
    },
    DeduplicateFailed {
        rule: String,
        error: String,
    },
    MissingColumns {
        columns: Vec<String>,
    },
    NullRatioExceeded {
        column: String,
        ratio: f64,
        max_ratio: f64,
    },
    DuplicatesFound {
        count: usize,
    },
}

impl Observable for CurationEvent {
    fn level(&self) -> EventLevel {
        match self {
            CurationEvent::RuleSetLoaded { .. }
            | CurationEvent::RuleApplied { .. }
            | CurationEvent::ValidationChecked { .. } => EventLevel::Info,
            CurationEvent::RuleSkipped { .. }
            | CurationEvent::ColumnNotFound { .. }
            | CurationEvent::UnknownOperation { .. }
            | CurationEvent::NullRatioExceeded { .. }
            | CurationEvent::DuplicatesFound { .. } => EventLevel::Warn,
            CurationEvent::FilterFailed { .. }
            | CurationEvent::TransformFailed { .. }
            | CurationEvent::DeduplicateFailed { .. }
            | CurationEvent::MissingColumns { .. } => EventLevel::Error,
        }
    }

    fn message(&self) -> String {
        match self {
            CurationEvent::RuleSetLoaded { name, rules } => {
                format!("Loaded rule set '{name}' with {rules} rules")
            }
            CurationEvent::RuleApplied {
                rule,
                kind,
                rows_before,
                rows_after,
            } => format!("Applied {kind} rule: {rule} ({rows_before} -> {rows_after} rows)"),
            CurationEvent::RuleSkipped { rule, rule_type } => {
                format!("Unknown rule type: {rule_type} (rule '{rule}' skipped)")
            }
            CurationEvent::FilterFailed { rule, error } => {
                format!("Error applying filter '{rule}': {error}")
            }
            CurationEvent::ColumnNotFound { rule, column } => {
                format!("Column not found: {column} (rule '{rule}')")
            }
            CurationEvent::UnknownOperation {
                rule, operation, ..
            } => format!("Unknown operation: {operation} (rule '{rule}')"),
            CurationEvent::TransformFailed {
                rule,
                column,
                error,
            } => format!("Error applying transform to {column} (rule '{rule}'): {error}"),
            CurationEvent::ValidationChecked {
                column,
                check_type,
                valid,
                total,
                ..
            } => format!("Validation {check_type} on {column}: {valid}/{total} valid"),
            CurationEvent::DeduplicateFailed { rule, error } => {
                format!("Error applying deduplication '{rule}': {error}")
            }
            CurationEvent::MissingColumns { columns } => {
                format!("Missing required columns: {}", columns.join(", "))
            }
            CurationEvent::NullRatioExceeded { column, ratio, .. } => {
                format!("Column {column} has {:.1}% null values", ratio * 100.0)
            }
            CurationEvent::DuplicatesFound { count } => format!("Found {count} duplicate rows"),
        }
    }
}
