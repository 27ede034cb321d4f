//! Structural and quality summary of a table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::table::{Table, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_records: usize,
    pub columns: Vec<String>,
    pub missing_values: BTreeMap<String, usize>,
    pub dtypes: BTreeMap<String, String>,
}

/// Dtype name for a column: `int64`, `float64`, `bool`, or `object`.
/// An all-null column is `object`. Ints widen to `float64` when mixed with
/// floats or nulls, and bools with nulls become `object`.
pub fn dtype(values: &[Value]) -> &'static str {
    let nulls = values.iter().any(Value::is_null);
    let mut ints = false;
    let mut floats = false;
    let mut bools = false;
    let mut other = false;
    for value in values.iter().filter(|v| !v.is_null()) {
        match value {
            Value::Int(_) => ints = true,
            Value::Float(_) => floats = true,
            Value::Bool(_) => bools = true,
            _ => other = true,
        }
    }

    match (ints, floats, bools, other) {
        (true, false, false, false) if !nulls => "int64",
        (true, false, false, false) | (_, true, false, false) => "float64",
        (false, false, true, false) if !nulls => "bool",
        _ => "object",
    }
}

/// Never fails; a table with no columns yields an empty report.
pub fn report(table: &Table) -> ValidationReport {
    let columns: Vec<String> = table.column_names().into_iter().map(String::from).collect();
    let mut missing_values = BTreeMap::new();
    let mut dtypes = BTreeMap::new();
    for name in &columns {
        let values = table.column(name).unwrap_or_default();
        missing_values.insert(name.clone(), values.iter().filter(|v| v.is_null()).count());
        dtypes.insert(name.clone(), dtype(values).to_string());
    }

    ValidationReport {
        total_records: table.len(),
        columns,
        missing_values,
        dtypes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_names() {
        assert_eq!(dtype(&[Value::Int(1), Value::Int(2)]), "int64");
        assert_eq!(dtype(&[Value::Int(1), Value::Float(2.5)]), "float64");
        assert_eq!(dtype(&[Value::Float(1.0), Value::Null]), "float64");
        assert_eq!(dtype(&[Value::Bool(true)]), "bool");
        assert_eq!(dtype(&[Value::from("a"), Value::Int(1)]), "object");
        assert_eq!(dtype(&[Value::Bool(true), Value::Int(1)]), "object");
        assert_eq!(dtype(&[Value::Null, Value::Null]), "object");
        assert_eq!(dtype(&[]), "object");
    }

    #[test]
    fn nulls_widen_ints_and_bools() {
        assert_eq!(dtype(&[Value::Int(1), Value::Null]), "float64");
        assert_eq!(dtype(&[Value::Int(1), Value::Float(f64::NAN)]), "float64");
        assert_eq!(dtype(&[Value::Bool(true), Value::Null]), "object");

        let table = Table::from_json_str(r#"[{"age": 30}, {"age": null}]"#).unwrap();
        assert_eq!(report(&table).dtypes["age"], "float64");
    }

    #[test]
    fn five_rows_one_null() {
        let table = Table::new(vec![
            ("id", (1..=5).map(Value::Int).collect()),
            (
                "email",
                vec![
                    "a@x.com".into(),
                    "b@x.com".into(),
                    Value::Null,
                    "d@x.com".into(),
                    "e@x.com".into(),
                ],
            ),
        ])
        .unwrap();

        let report = report(&table);
        assert_eq!(report.total_records, 5);
        assert_eq!(report.columns, vec!["id", "email"]);
        assert_eq!(report.missing_values["email"], 1);
        assert_eq!(report.missing_values["id"], 0);
        assert_eq!(report.dtypes["id"], "int64");
        assert_eq!(report.dtypes["email"], "object");
    }

    #[test]
    fn empty_table() {
        let report = report(&Table::default());
        assert_eq!(report.total_records, 0);
        assert!(report.columns.is_empty());
    }
}
