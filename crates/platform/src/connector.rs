//! Synchronous adapters that fetch whole tables from non-database sources.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PlatformError, PlatformResult};
use crate::source::DataSource;
use crate::table::{CellValue, Table};

/// Fetches a table from a file or api source. Implementations may block; the
/// platform calls them off the async executor.
pub trait Connector: Send + Sync {
    fn fetch(&self, source: &DataSource, table: &str) -> PlatformResult<Table>;
}

/// Reads CSV files. The connection is either a `.csv` file (served for any
/// table name) or a directory holding `<table>.csv`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvConnector;

impl CsvConnector {
    fn resolve(connection: &str, table: &str) -> PathBuf {
        let path = Path::new(connection);
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
            path.to_path_buf()
        } else {
            path.join(format!("{table}.csv"))
        }
    }
}

impl Connector for CsvConnector {
    fn fetch(&self, source: &DataSource, table: &str) -> PlatformResult<Table> {
        let path = Self::resolve(source.connection(), table);
        if !path.exists() {
            return Err(PlatformError::connector(format!(
                "source '{}' has no file for table '{table}' at {}",
                source.name(),
                path.display()
            )));
        }

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(&path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(infer_cell).collect());
        }

        debug!(source = source.name(), table, rows = rows.len(), "csv table loaded");
        Ok(Table::with_rows(columns, rows))
    }
}

/// Empty fields are NULL; otherwise the narrowest of integer, real, text.
pub fn infer_cell(raw: &str) -> CellValue {
    if raw.is_empty() {
        CellValue::Null
    } else if let Ok(v) = raw.parse::<i64>() {
        CellValue::Integer(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        CellValue::Real(v)
    } else {
        CellValue::Text(raw.to_string())
    }
}
