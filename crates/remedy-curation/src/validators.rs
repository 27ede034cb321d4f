//! Data-quality checks that report rather than transform.

use std::collections::BTreeMap;
use std::sync::Arc;

use remedy_types::{EventSink, TracingSink};

use crate::events::CurationEvent;
use crate::report::dtype;
use crate::table::{Keep, Table};

pub const DEFAULT_MAX_NULL_RATIO: f64 = 0.1;

pub struct DataValidator {
    sink: Arc<dyn EventSink<CurationEvent>>,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataValidator {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink<CurationEvent>>) -> Self {
        self.sink = sink;
        self
    }

    /// Names in `required` that are not columns of `table`, in the order given.
    pub fn missing_columns(&self, table: &Table, required: &[&str]) -> Vec<String> {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !table.has_column(name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            self.sink.record(CurationEvent::MissingColumns {
                columns: missing.clone(),
            });
        }
        missing
    }

    /// Per-column result of matching the expected dtype. The expected name
    /// may be a prefix, so `"int"` accepts `int64`. Missing columns fail.
    pub fn data_types(&self, table: &Table, expected: &[(&str, &str)]) -> BTreeMap<String, bool> {
        expected
            .iter()
            .map(|(column, wanted)| {
                let ok = table
                    .column(column)
                    .is_some_and(|values| dtype(values).contains(wanted));
                (column.to_string(), ok)
            })
            .collect()
    }

    /// Null ratio of every column. Columns above `max_ratio` are reported.
    /// An empty table has ratio 0 everywhere.
    pub fn null_ratios(&self, table: &Table, max_ratio: f64) -> BTreeMap<String, f64> {
        let mut ratios = BTreeMap::new();
        for name in table.column_names() {
            let nulls = table.null_count(name).unwrap_or(0);
            let ratio = if table.is_empty() {
                0.0
            } else {
                nulls as f64 / table.len() as f64
            };
            if ratio > max_ratio {
                self.sink.record(CurationEvent::NullRatioExceeded {
                    column: name.to_string(),
                    ratio,
                    max_ratio,
                });
            }
            ratios.insert(name.to_string(), ratio);
        }
        ratios
    }

    /// Number of rows that repeat an earlier row on `subset` (all columns
    /// when `None`). Unknown subset columns count as no duplicates.
    pub fn duplicates(&self, table: &Table, subset: Option<&[String]>) -> usize {
        let count = match table.drop_duplicates(subset, Keep::First) {
            Ok(unique) => table.len() - unique.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Duplicate check skipped");
                0
            }
        };
        if count > 0 {
            self.sink.record(CurationEvent::DuplicatesFound { count });
        }
        count
    }
}
