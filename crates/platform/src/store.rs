//! Sqlite-backed local store.
//!
//! The store owns one connection pool for its lifetime. Statements are
//! generated from [`QuerySpec`] with identifiers validated and values bound as
//! parameters; rows are decoded by their runtime storage class.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info, instrument};

use crate::config::is_memory_url;
use crate::error::PlatformResult;
use crate::query::{QuerySpec, ensure_identifier};
use crate::table::{CellValue, Table};

/// Tables created by [`LocalStore::migrate`].
pub const SCHEMA_TABLES: [&str; 6] = [
    "properties",
    "transactions",
    "rental_properties",
    "market_data",
    "kpi_tracking",
    "experiment_results",
];

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS properties (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        address TEXT NOT NULL,
        property_type TEXT,
        bedrooms INTEGER,
        bathrooms INTEGER,
        square_feet REAL,
        lot_size REAL,
        year_built INTEGER,
        listing_price REAL,
        sale_price REAL,
        listing_date TEXT,
        sale_date TEXT,
        days_on_market INTEGER,
        agent_id TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        property_id INTEGER,
        transaction_type TEXT,
        amount REAL,
        transaction_date TEXT,
        agent_id TEXT,
        commission REAL,
        status TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (property_id) REFERENCES properties (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rental_properties (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        property_id INTEGER,
        monthly_rent REAL,
        lease_start TEXT,
        lease_end TEXT,
        tenant_id TEXT,
        occupancy_status TEXT,
        last_maintenance TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (property_id) REFERENCES properties (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS market_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT,
        region TEXT,
        median_price REAL,
        average_days_on_market INTEGER,
        inventory_count INTEGER,
        price_per_sqft REAL,
        rental_yield REAL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS kpi_tracking (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT,
        kpi_name TEXT,
        kpi_value REAL,
        target_value REAL,
        category TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS experiment_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        experiment_id TEXT NOT NULL,
        experiment_name TEXT,
        status TEXT,
        confidence_level REAL,
        variant TEXT,
        is_control INTEGER,
        visitors INTEGER,
        conversions INTEGER,
        conversion_rate REAL,
        average_value REAL,
        relative_lift REAL,
        p_value REAL,
        significant INTEGER,
        recorded_at TEXT
    )
    "#,
];

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    url: String,
}

impl LocalStore {
    /// Open a pool for `url`, creating the database file (and its directory)
    /// when missing.
    ///
    /// In-memory databases live inside a single connection, so the pool is
    /// pinned to exactly one connection that is never recycled.
    #[instrument(err)]
    pub async fn connect(url: &str) -> PlatformResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = if is_memory_url(url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = database_path(url).and_then(|p| Path::new(p).parent()) {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await?
        };

        debug!(url, "local store connected");
        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create the platform schema. Idempotent.
    pub async fn migrate(&self) -> PlatformResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!(tables = SCHEMA_TABLES.len(), "local store schema ready");
        Ok(())
    }

    /// Run a structured query.
    pub async fn run(&self, spec: &QuerySpec) -> PlatformResult<Table> {
        let (sql, params) = spec.to_sql()?;
        let mut table = self.fetch(&sql, &params).await?;

        // sqlite reports no columns for an empty result set.
        if table.columns.is_empty() {
            table.columns = match spec.output_columns() {
                Some(columns) => columns,
                None => self.table_columns(&spec.table).await?,
            };
        }
        Ok(table)
    }

    /// Run raw SQL with positional parameters.
    pub async fn fetch(&self, sql: &str, params: &[CellValue]) -> PlatformResult<Table> {
        debug!(sql, params = params.len(), "fetch");
        let rows = bind_all(sqlx::query(sql), params).fetch_all(&self.pool).await?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;

        Ok(Table::with_rows(columns, rows))
    }

    /// Column names of a table, in declaration order.
    pub async fn table_columns(&self, table: &str) -> PlatformResult<Vec<String>> {
        ensure_identifier(table)?;
        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Into::into))
            .collect()
    }

    /// Insert rows inside one transaction. Returns the number of rows written.
    pub async fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<CellValue>],
    ) -> PlatformResult<u64> {
        let sql = insert_statement(table, columns, rows)?;

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for row in rows {
            written += bind_all(sqlx::query(&sql), row)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        debug!(table, rows = written, "rows inserted");
        Ok(written)
    }

    /// Swap the contents of several tables in one transaction: either every
    /// table ends up holding its new rows or none of them changes. Returns
    /// how many old rows each table lost, in input order.
    pub async fn replace_tables(&self, tables: &[(&str, &Table)]) -> PlatformResult<Vec<u64>> {
        let statements = tables
            .iter()
            .map(|(name, table)| insert_statement(name, &table.columns, &table.rows))
            .collect::<PlatformResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        let mut cleared = Vec::with_capacity(tables.len());
        for ((name, table), sql) in tables.iter().zip(&statements) {
            let removed = sqlx::query(&format!("DELETE FROM {name}"))
                .execute(&mut *tx)
                .await?
                .rows_affected();
            for row in &table.rows {
                bind_all(sqlx::query(sql), row).execute(&mut *tx).await?;
            }
            cleared.push(removed);
        }
        tx.commit().await?;

        debug!(tables = tables.len(), "tables replaced");
        Ok(cleared)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Validated `INSERT` for `columns`; every row must match their count.
fn insert_statement(table: &str, columns: &[String], rows: &[Vec<CellValue>]) -> PlatformResult<String> {
    ensure_identifier(table)?;
    for column in columns {
        ensure_identifier(column)?;
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
        return Err(realty_core::DomainError::validation(format!(
            "row for '{table}' has {} values but {} columns were given",
            bad.len(),
            columns.len()
        ))
        .into());
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    ))
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &[CellValue]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            CellValue::Null => query.bind(None::<i64>),
            CellValue::Integer(v) => query.bind(*v),
            CellValue::Real(v) => query.bind(*v),
            CellValue::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Decode by the value's storage class rather than the declared column type.
fn decode_row(row: &SqliteRow) -> Result<Vec<CellValue>, sqlx::Error> {
    (0..row.columns().len())
        .map(|idx| {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                return Ok(CellValue::Null);
            }
            let storage = raw.type_info().name().to_ascii_uppercase();
            Ok(match storage.as_str() {
                "INTEGER" | "BOOLEAN" => CellValue::Integer(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" => CellValue::Real(row.try_get_unchecked::<f64, _>(idx)?),
                "BLOB" => CellValue::Text(String::from_utf8_lossy(
                    &row.try_get_unchecked::<Vec<u8>, _>(idx)?,
                ).into_owned()),
                _ => CellValue::Text(row.try_get_unchecked::<String, _>(idx)?),
            })
        })
        .collect()
}

/// Filesystem path of a sqlite URL, without scheme or query string.
fn database_path(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty()).then_some(path)
}
