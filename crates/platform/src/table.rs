//! Tabular query results.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A single SQL-style value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view of the value; text and null yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(v) => Some(*v as f64),
            CellValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Ordering between two non-null values of comparable kinds. Numbers
    /// compare with numbers and text with text; anything else is `None`.
    pub fn compare(&self, other: &CellValue) -> Option<Ordering> {
        match (self, other) {
            (CellValue::Text(a), CellValue::Text(b)) => Some(a.cmp(b)),
            (CellValue::Integer(a), CellValue::Integer(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }
}

impl core::fmt::Display for CellValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Integer(v) => write!(f, "{v}"),
            CellValue::Real(v) => write!(f, "{v}"),
            CellValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Integer(i64::from(v))
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Real(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Column names plus row-major values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Every value of a column, nulls included. Empty for unknown columns.
    pub fn column(&self, name: &str) -> Vec<&CellValue> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().filter_map(|row| row.get(idx)).collect(),
            None => Vec::new(),
        }
    }

    /// Numeric values of a column, skipping nulls and text.
    pub fn column_f64(&self, name: &str) -> Vec<f64> {
        self.column(name).into_iter().filter_map(CellValue::as_f64).collect()
    }

    /// First cell of the first row (typical for aggregate queries).
    pub fn scalar(&self) -> Option<&CellValue> {
        self.rows.first()?.first()
    }

    pub fn scalar_f64(&self) -> Option<f64> {
        self.scalar().and_then(CellValue::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::with_rows(
            vec!["region".into(), "price".into()],
            vec![
                vec!["Downtown".into(), CellValue::Integer(400_000)],
                vec!["Suburbs".into(), CellValue::Null],
                vec!["Waterfront".into(), CellValue::Real(550_000.5)],
            ],
        )
    }

    #[test]
    fn numeric_column_skips_nulls() {
        let table = sample();
        assert_eq!(table.column_f64("price"), vec![400_000.0, 550_000.5]);
        assert!(table.column_f64("missing").is_empty());
        assert_eq!(table.get(1, "region").and_then(CellValue::as_str), Some("Suburbs"));
    }

    #[test]
    fn compare_mixes_integers_and_reals_only() {
        assert_eq!(
            CellValue::Integer(2).compare(&CellValue::Real(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(CellValue::from("a").compare(&CellValue::Integer(1)), None);
        assert_eq!(CellValue::Null.compare(&CellValue::Null), None);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(CellValue::from(None::<i64>), CellValue::Null);
        assert_eq!(CellValue::from(Some(3.5)), CellValue::Real(3.5));
    }
}
