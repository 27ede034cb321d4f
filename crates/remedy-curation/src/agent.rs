//! Loads a rule set and runs it over tables.

use std::path::Path;
use std::sync::Arc;

use remedy_types::{EventSink, Result, TracingSink};

use crate::config::RuleSet;
use crate::engine::RuleEngine;
use crate::events::CurationEvent;
use crate::lint::{lint, Diagnostic};
use crate::report::{report, ValidationReport};
use crate::table::Table;

pub struct CurationAgent {
    rule_set: RuleSet,
    engine: RuleEngine,
}

impl CurationAgent {
    pub fn new(rule_set: RuleSet, sink: Arc<dyn EventSink<CurationEvent>>) -> Self {
        sink.record(CurationEvent::RuleSetLoaded {
            name: rule_set.name.clone(),
            rules: rule_set.rules.len(),
        });
        let engine = RuleEngine::from_rule_set(&rule_set).with_sink(sink);
        Self { rule_set, engine }
    }

    /// Load the rule set at `path`. Configuration errors are fatal here.
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(RuleSet::load(path)?, Arc::new(TracingSink)))
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        lint(&self.rule_set)
    }

    pub fn curate(&self, table: &Table) -> Table {
        tracing::info!(rule_set = %self.rule_set.name, rows = table.len(), "Starting curation");
        let out = self.engine.apply(table);
        tracing::info!(rows = out.len(), "Curation complete");
        out
    }

    pub fn validate(&self, table: &Table) -> ValidationReport {
        report(table)
    }

    /// Curate the records in `input` into `output`.
    pub fn curate_file(&self, input: &Path, output: &Path) -> Result<ValidationReport> {
        let table = Table::read_json(input)?;
        let curated = self.curate(&table);
        curated.write_json(output)?;
        Ok(report(&curated))
    }
}
