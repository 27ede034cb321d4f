//! In-memory columnar table.
//!
//! Every operation returns a new [`Table`]; the receiver is never modified.
//! Rows are addressed by position and survivors of a filter or
//! deduplication keep their relative order.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use remedy_types::{RemedyError, Result};
use serde_json::{Map, Number};

use crate::predicate::Predicate;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// `NaN` counts as missing.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    /// Predicate equality. Ints and floats compare numerically; nulls equal
    /// nothing.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            _ => self == other,
        }
    }

    /// Ordering used by predicates. `None` when the two values cannot be
    /// ordered against each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Lenient conversion from JSON. Nested arrays and objects are kept as
    /// their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn dedup_key(&self) -> CellKey<'_> {
        match self {
            v if v.is_null() => CellKey::Null,
            Value::Bool(b) => CellKey::Bool(*b),
            Value::Int(i) => CellKey::Int(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                CellKey::Int(*f as i64)
            }
            Value::Float(f) => CellKey::Float(f.to_bits()),
            Value::Str(s) => CellKey::Str(s),
            Value::Null => CellKey::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Hashable identity of a cell for duplicate detection. Nulls are equal to
/// each other here, unlike in predicates.
#[derive(PartialEq, Eq, Hash)]
enum CellKey<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(&'a str),
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Which occurrence of a duplicated row survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Keep {
    #[default]
    First,
    Last,
}

impl Keep {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "first" => Some(Keep::First),
            "last" => Some(Keep::Last),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.table.column(column).map(|values| &values[self.index])
    }
}

impl Table {
    /// Build a table from named columns. All columns must have the same length.
    pub fn new<N: Into<String>>(columns: Vec<(N, Vec<Value>)>) -> Result<Self> {
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(name, values)| Column {
                name: name.into(),
                values,
            })
            .collect();
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(RemedyError::Other(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
            if column.values.len() != rows {
                return Err(RemedyError::Other(format!(
                    "column '{}' has {} values, expected {rows}",
                    column.name,
                    column.values.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Build a table from row-major data. Every row must match the header width.
    pub fn from_rows<N: Into<String>>(header: Vec<N>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let names: Vec<String> = header.into_iter().map(Into::into).collect();
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(RemedyError::Other(format!(
                    "row {i} has {} values, expected {}",
                    row.len(),
                    names.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Self::new(names.into_iter().zip(columns).collect())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows).then_some(Row { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows).map(move |index| Row { table: self, index })
    }

    /// Number of missing cells in `column`, or `None` if there is no such column.
    pub fn null_count(&self, column: &str) -> Option<usize> {
        self.column(column)
            .map(|values| values.iter().filter(|v| v.is_null()).count())
    }

    fn select(&self, keep: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: keep.iter().map(|&i| c.values[i].clone()).collect(),
                })
                .collect(),
            rows: keep.len(),
        }
    }

    /// Rows for which `predicate` holds. Fails on the first unknown column
    /// or evaluation error, leaving no partial result.
    pub fn filter(&self, predicate: &Predicate) -> Result<Table> {
        if let Some(missing) = predicate.columns().into_iter().find(|c| !self.has_column(c)) {
            return Err(RemedyError::PredicateEval(format!("unknown column '{missing}'")));
        }
        let mut keep = Vec::new();
        for row in self.rows() {
            if predicate.evaluate(&row)? {
                keep.push(row.index());
            }
        }
        Ok(self.select(&keep))
    }

    /// Replace every value of `column` with `f(value)`.
    pub fn map_column<F>(&self, column: &str, mut f: F) -> Result<Table>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        let position = self
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| RemedyError::Other(format!("column not found: {column}")))?;
        let values = self.columns[position]
            .values
            .iter()
            .map(&mut f)
            .collect::<Result<Vec<_>>>()?;

        let mut out = self.clone();
        out.columns[position].values = values;
        Ok(out)
    }

    /// Drop rows that repeat an earlier (or later, for [`Keep::Last`]) row on
    /// `subset`, or on every column when `subset` is `None`.
    pub fn drop_duplicates(&self, subset: Option<&[String]>, keep: Keep) -> Result<Table> {
        let positions: Vec<usize> = match subset {
            Some(names) => names
                .iter()
                .map(|name| {
                    self.columns
                        .iter()
                        .position(|c| &c.name == name)
                        .ok_or_else(|| RemedyError::Other(format!("column not found: {name}")))
                })
                .collect::<Result<_>>()?,
            None => (0..self.columns.len()).collect(),
        };

        let key = |row: usize| {
            positions
                .iter()
                .map(|&c| self.columns[c].values[row].dedup_key())
                .collect::<Vec<_>>()
        };

        let mut seen = HashSet::new();
        let mut keep_rows: Vec<usize> = match keep {
            Keep::First => (0..self.rows).filter(|&row| seen.insert(key(row))).collect(),
            Keep::Last => (0..self.rows)
                .rev()
                .filter(|&row| seen.insert(key(row)))
                .collect(),
        };
        keep_rows.sort_unstable();
        Ok(self.select(&keep_rows))
    }

    // -----------------------------------------------------------------------
    // JSON records
    // -----------------------------------------------------------------------

    /// Parse an array of objects. Columns appear in order of first
    /// appearance; keys absent from a record become nulls.
    pub fn from_json_records(value: &serde_json::Value) -> Result<Table> {
        let records = value.as_array().ok_or_else(|| {
            RemedyError::Other("expected a JSON array of records".to_string())
        })?;

        let mut names: Vec<String> = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let object = record.as_object().ok_or_else(|| {
                RemedyError::Other(format!("record {i} is not a JSON object"))
            })?;
            for key in object.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }

        let columns: Vec<(String, Vec<Value>)> = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).map(Value::from_json).unwrap_or(Value::Null))
                    .collect();
                (name, values)
            })
            .collect();
        Table::new(columns)
    }

    pub fn from_json_str(text: &str) -> Result<Table> {
        Self::from_json_records(&serde_json::from_str(text)?)
    }

    pub fn read_json(path: &Path) -> Result<Table> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_records(&self) -> serde_json::Value {
        let records = self
            .rows()
            .map(|row| {
                let mut object = Map::new();
                for column in &self.columns {
                    object.insert(column.name.clone(), column.values[row.index()].to_json());
                }
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(records)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_json_records())?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people() -> Table {
        Table::from_rows(
            vec!["id", "name"],
            vec![
                vec![Value::Int(1), "A".into()],
                vec![Value::Int(1), "A".into()],
                vec![Value::Int(2), "B".into()],
                vec![Value::Int(1), "C".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Table::new(vec![
            ("a", vec![Value::Int(1)]),
            ("b", vec![Value::Int(1), Value::Int(2)]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("column 'b'"));
    }

    #[test]
    fn rejects_duplicate_names() {
        assert!(Table::new(vec![("a", vec![]), ("a", vec![])]).is_err());
    }

    #[test]
    fn dedup_all_columns_keep_first() {
        let out = people().drop_duplicates(None, Keep::First).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.column("name").unwrap()[2], Value::from("C"));
    }

    #[test]
    fn dedup_subset_keep_last_preserves_order() {
        let subset = vec!["id".to_string()];
        let out = people().drop_duplicates(Some(&subset), Keep::Last).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.column("name").unwrap(), &[Value::from("B"), Value::from("C")]);
    }

    #[test]
    fn dedup_unknown_subset_column() {
        let subset = vec!["missing".to_string()];
        assert!(people().drop_duplicates(Some(&subset), Keep::First).is_err());
    }

    #[test]
    fn dedup_treats_nulls_and_equal_numbers_alike() {
        let table = Table::new(vec![(
            "x",
            vec![Value::Null, Value::Null, Value::Int(2), Value::Float(2.0)],
        )])
        .unwrap();
        assert_eq!(table.drop_duplicates(None, Keep::First).unwrap().len(), 2);
    }

    #[test]
    fn map_column_leaves_source_untouched() {
        let source = people();
        let out = source
            .map_column("name", |v| Ok(Value::from(format!("{}!", v.as_str().unwrap_or("")))))
            .unwrap();
        assert_eq!(out.column("name").unwrap()[0], Value::from("A!"));
        assert_eq!(source.column("name").unwrap()[0], Value::from("A"));
    }

    #[test]
    fn null_count_counts_nan() {
        let table = Table::new(vec![(
            "x",
            vec![Value::Null, Value::Float(f64::NAN), Value::Int(1)],
        )])
        .unwrap();
        assert_eq!(table.null_count("x"), Some(2));
        assert_eq!(table.null_count("y"), None);
    }

    #[test]
    fn loose_equality_and_ordering() {
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert!(!Value::Null.loose_eq(&Value::Null));
        assert!(!Value::from("2").loose_eq(&Value::Int(2)));
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn json_records_keep_first_appearance_order() {
        let table = Table::from_json_records(&json!([
            {"id": 1, "email": "A@X.COM"},
            {"id": 2, "status": "active"},
            {"email": null, "id": 3.5}
        ]))
        .unwrap();
        assert_eq!(table.column_names(), vec!["id", "email", "status"]);
        assert_eq!(table.column("id").unwrap()[2], Value::Float(3.5));
        assert_eq!(table.null_count("status"), Some(2));

        let back = table.to_json_records();
        assert_eq!(back[1]["email"], json!(null));
        assert_eq!(back[0]["email"], json!("A@X.COM"));
    }

    #[test]
    fn json_records_must_be_objects() {
        assert!(Table::from_json_records(&json!([1, 2])).is_err());
        assert!(Table::from_json_records(&json!({"id": 1})).is_err());
    }

    #[test]
    fn json_file_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        people().write_json(&path).unwrap();
        assert_eq!(Table::read_json(&path).unwrap(), people());
    }
}
