//! Declarative curation of tabular data.
//!
//! A [`RuleSet`] loaded from JSON or TOML drives a [`RuleEngine`] that
//! reduces filter, transform, validate and deduplicate rules over a
//! [`Table`]. [`report`] summarizes the result.

pub mod agent;
pub mod config;
pub mod engine;
pub mod events;
pub mod lint;
pub mod predicate;
pub mod report;
pub mod rules;
pub mod table;
pub mod validators;

pub use agent::CurationAgent;
pub use config::RuleSet;
pub use engine::{apply_rules, RuleEngine};
pub use events::CurationEvent;
pub use lint::{lint, lint_or_raise, Diagnostic, LintRule, Severity};
pub use predicate::{CompareOp, Predicate};
pub use report::{report, ValidationReport};
pub use rules::{
    Check, Condition, DeduplicateRule, FilterRule, Rule, TransformOp, TransformRule,
    TransformStep, ValidateRule,
};
pub use table::{Keep, Row, Table, Value};
pub use validators::DataValidator;
