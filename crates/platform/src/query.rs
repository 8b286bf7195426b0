//! Structured queries: SQL rendering for database sources and in-memory
//! evaluation for connector-backed sources, with the same semantics.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use realty_core::{DomainError, DomainResult};

use crate::table::{CellValue, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
        }
    }

    fn takes_value(&self) -> bool {
        !matches!(self, FilterOp::IsNull | FilterOp::IsNotNull)
    }
}

/// `column op value`; filters in a spec are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: CellValue,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<CellValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(column, FilterOp::Ne, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(column, FilterOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(column, FilterOp::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(column, FilterOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(column, FilterOp::Lte, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOp::IsNull, CellValue::Null)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOp::IsNotNull, CellValue::Null)
    }

    /// SQL three-valued logic: comparisons against NULL never match.
    fn matches(&self, cell: &CellValue) -> bool {
        match self.op {
            FilterOp::IsNull => cell.is_null(),
            FilterOp::IsNotNull => !cell.is_null(),
            op => match cell.compare(&self.value) {
                None => false,
                Some(ord) => match op {
                    FilterOp::Eq => ord == Ordering::Equal,
                    FilterOp::Ne => ord != Ordering::Equal,
                    FilterOp::Gt => ord == Ordering::Greater,
                    FilterOp::Gte => ord != Ordering::Less,
                    FilterOp::Lt => ord == Ordering::Less,
                    FilterOp::Lte => ord != Ordering::Greater,
                    FilterOp::IsNull | FilterOp::IsNotNull => false,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl AggregateFn {
    fn sql(&self) -> &'static str {
        match self {
            AggregateFn::Avg => "AVG",
            AggregateFn::Sum => "SUM",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
            AggregateFn::Count => "COUNT",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            AggregateFn::Avg => "avg",
            AggregateFn::Sum => "sum",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Count => "count",
        }
    }
}

/// An aggregate over one column (or over rows, for `COUNT(*)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregation {
    pub func: AggregateFn,
    /// `None` only for `COUNT(*)`.
    pub column: Option<String>,
    pub alias: String,
}

impl Aggregation {
    fn of(func: AggregateFn, column: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            func,
            alias: format!("{}_{}", func.prefix(), column),
            column: Some(column),
        }
    }

    pub fn avg(column: impl Into<String>) -> Self {
        Self::of(AggregateFn::Avg, column)
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::of(AggregateFn::Sum, column)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::of(AggregateFn::Min, column)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::of(AggregateFn::Max, column)
    }

    /// `COUNT(column)`: non-null values only.
    pub fn count_of(column: impl Into<String>) -> Self {
        Self::of(AggregateFn::Count, column)
    }

    /// `COUNT(*)`.
    pub fn count() -> Self {
        Self {
            func: AggregateFn::Count,
            column: None,
            alias: "count".to_string(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    fn sql(&self) -> String {
        let arg = self.column.as_deref().unwrap_or("*");
        format!("{}({}) AS {}", self.func.sql(), arg, self.alias)
    }

    fn evaluate(&self, table: &Table, rows: &[&Vec<CellValue>]) -> DomainResult<CellValue> {
        let Some(column) = &self.column else {
            return Ok(CellValue::Integer(rows.len() as i64));
        };
        let idx = column_index(table, column)?;
        let values: Vec<&CellValue> = rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter(|v| !v.is_null())
            .collect();

        Ok(match self.func {
            AggregateFn::Count => CellValue::Integer(values.len() as i64),
            AggregateFn::Avg => {
                let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                if nums.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::Real(nums.iter().sum::<f64>() / nums.len() as f64)
                }
            }
            AggregateFn::Sum => {
                if values.is_empty() {
                    CellValue::Null
                } else if values.iter().all(|v| matches!(v, CellValue::Integer(_))) {
                    CellValue::Integer(values.iter().filter_map(|v| v.as_i64()).sum())
                } else {
                    CellValue::Real(values.iter().filter_map(|v| v.as_f64()).sum())
                }
            }
            AggregateFn::Min => extreme(&values, Ordering::Less),
            AggregateFn::Max => extreme(&values, Ordering::Greater),
        })
    }
}

fn extreme(values: &[&CellValue], want: Ordering) -> CellValue {
    let mut best: Option<&CellValue> = None;
    for value in values {
        best = match best {
            Some(current) if value.compare(current) != Some(want) => Some(current),
            _ => Some(value),
        };
    }
    best.cloned().unwrap_or(CellValue::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A structured read over one table of a source.
///
/// Without aggregations the result holds `columns` (all columns when empty).
/// With aggregations it holds the `group_by` columns followed by one column
/// per aggregation, named by its alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub aggregations: Vec<Aggregation>,
    pub group_by: Vec<String>,
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_aggregate(&self) -> bool {
        !self.aggregations.is_empty()
    }

    /// Output column names, when known without looking at the data.
    pub fn output_columns(&self) -> Option<Vec<String>> {
        if self.is_aggregate() {
            let mut cols = self.group_by.clone();
            cols.extend(self.aggregations.iter().map(|a| a.alias.clone()));
            Some(cols)
        } else if self.columns.is_empty() {
            None
        } else {
            Some(self.columns.clone())
        }
    }

    /// Check identifiers and structural rules before running anywhere.
    pub fn validate(&self) -> DomainResult<()> {
        ensure_identifier(&self.table)?;
        for name in self
            .columns
            .iter()
            .chain(self.group_by.iter())
            .chain(self.filters.iter().map(|f| &f.column))
            .chain(self.order_by.iter().map(|(c, _)| c))
        {
            ensure_identifier(name)?;
        }
        for agg in &self.aggregations {
            ensure_identifier(&agg.alias)?;
            match (&agg.column, agg.func) {
                (Some(column), _) => ensure_identifier(column)?,
                (None, AggregateFn::Count) => {}
                (None, func) => {
                    return Err(DomainError::validation(format!(
                        "{} requires a column",
                        func.sql()
                    )));
                }
            }
        }

        if !self.group_by.is_empty() && !self.is_aggregate() {
            return Err(DomainError::validation("group_by requires at least one aggregation"));
        }
        if self.is_aggregate() {
            if let Some(col) = self.columns.iter().find(|c| !self.group_by.contains(c)) {
                return Err(DomainError::validation(format!(
                    "column '{col}' must appear in group_by when aggregating"
                )));
            }
        }
        if let Some(output) = self.output_columns() {
            if let Some((col, _)) = self.order_by.iter().find(|(c, _)| !output.contains(c)) {
                return Err(DomainError::validation(format!(
                    "order_by column '{col}' is not part of the result"
                )));
            }
        }
        Ok(())
    }

    /// Render as a parameterized sqlite statement.
    pub fn to_sql(&self) -> DomainResult<(String, Vec<CellValue>)> {
        self.validate()?;

        let select = if self.is_aggregate() {
            self.group_by
                .iter()
                .cloned()
                .chain(self.aggregations.iter().map(Aggregation::sql))
                .collect::<Vec<_>>()
                .join(", ")
        } else if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };

        let mut sql = format!("SELECT {select} FROM {}", self.table);
        let mut params = Vec::new();

        if !self.filters.is_empty() {
            let clauses: Vec<String> = self
                .filters
                .iter()
                .map(|f| {
                    if f.op.takes_value() {
                        params.push(f.value.clone());
                        format!("{} {} ?", f.column, f.op.sql())
                    } else {
                        format!("{} {}", f.column, f.op.sql())
                    }
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, o)| match o {
                    SortOrder::Asc => format!("{c} ASC"),
                    SortOrder::Desc => format!("{c} DESC"),
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok((sql, params))
    }

    /// Evaluate against a fully fetched table.
    pub fn evaluate(&self, table: &Table) -> DomainResult<Table> {
        self.validate()?;
        let width = table.columns.len();
        if let Some(pos) = table.rows.iter().position(|row| row.len() != width) {
            return Err(DomainError::validation(format!(
                "table '{}' row {pos} has {} cells, expected {width}",
                self.table,
                table.rows[pos].len()
            )));
        }

        let filter_idx: Vec<(usize, &Filter)> = self
            .filters
            .iter()
            .map(|f| column_index(table, &f.column).map(|i| (i, f)))
            .collect::<DomainResult<_>>()?;

        let matching: Vec<&Vec<CellValue>> = table
            .rows
            .iter()
            .filter(|row| {
                filter_idx
                    .iter()
                    .all(|(i, f)| row.get(*i).is_some_and(|cell| f.matches(cell)))
            })
            .collect();

        let mut result = if self.is_aggregate() {
            self.aggregate_rows(table, &matching)?
        } else {
            let columns = if self.columns.is_empty() {
                table.columns.clone()
            } else {
                self.columns.clone()
            };
            let idx: Vec<usize> = columns
                .iter()
                .map(|c| column_index(table, c))
                .collect::<DomainResult<_>>()?;
            let rows = matching
                .iter()
                .map(|row| idx.iter().map(|i| row[*i].clone()).collect())
                .collect();
            Table::with_rows(columns, rows)
        };

        if !self.order_by.is_empty() {
            let keys: Vec<(usize, SortOrder)> = self
                .order_by
                .iter()
                .map(|(c, o)| column_index(&result, c).map(|i| (i, *o)))
                .collect::<DomainResult<_>>()?;
            result.rows.sort_by(|a, b| {
                for (i, order) in &keys {
                    let ord = sql_order(&a[*i], &b[*i]);
                    let ord = match order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        if let Some(limit) = self.limit {
            result.rows.truncate(limit);
        }

        Ok(result)
    }

    fn aggregate_rows(&self, table: &Table, rows: &[&Vec<CellValue>]) -> DomainResult<Table> {
        let columns = self.output_columns().unwrap_or_default();

        if self.group_by.is_empty() {
            let row = self
                .aggregations
                .iter()
                .map(|a| a.evaluate(table, rows))
                .collect::<DomainResult<Vec<_>>>()?;
            return Ok(Table::with_rows(columns, vec![row]));
        }

        let key_idx: Vec<usize> = self
            .group_by
            .iter()
            .map(|c| column_index(table, c))
            .collect::<DomainResult<_>>()?;

        // Groups in first-seen order.
        let mut groups: Vec<(Vec<CellValue>, Vec<&Vec<CellValue>>)> = Vec::new();
        for row in rows {
            let key: Vec<CellValue> = key_idx.iter().map(|i| row[*i].clone()).collect();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(row),
                None => groups.push((key, vec![row])),
            }
        }

        let mut out = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let mut row = key;
            for agg in &self.aggregations {
                row.push(agg.evaluate(table, &members)?);
            }
            out.push(row);
        }
        Ok(Table::with_rows(columns, out))
    }
}

/// NULLs first, then numbers, then text (sqlite ordering).
fn sql_order(a: &CellValue, b: &CellValue) -> Ordering {
    fn rank(v: &CellValue) -> u8 {
        match v {
            CellValue::Null => 0,
            CellValue::Integer(_) | CellValue::Real(_) => 1,
            CellValue::Text(_) => 2,
        }
    }
    a.compare(b).unwrap_or_else(|| rank(a).cmp(&rank(b)))
}

fn column_index(table: &Table, column: &str) -> DomainResult<usize> {
    table
        .column_index(column)
        .ok_or_else(|| DomainError::validation(format!("unknown column '{column}'")))
}

/// Identifiers are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*`.
pub fn ensure_identifier(name: &str) -> DomainResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DomainError::validation(format!("invalid identifier '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listings() -> Table {
        Table::with_rows(
            vec!["property_type".into(), "sale_price".into(), "days_on_market".into()],
            vec![
                vec!["Condo".into(), CellValue::Real(300_000.0), CellValue::Integer(20)],
                vec!["Condo".into(), CellValue::Null, CellValue::Null],
                vec!["Townhouse".into(), CellValue::Real(450_000.0), CellValue::Integer(40)],
                vec!["Condo".into(), CellValue::Real(320_000.0), CellValue::Integer(35)],
            ],
        )
    }

    #[test]
    fn sql_binds_values_and_validates_identifiers() {
        let spec = QuerySpec::table("properties")
            .filter(Filter::eq("property_type", "Condo"))
            .filter(Filter::is_not_null("sale_date"))
            .aggregate(Aggregation::avg("sale_price"))
            .aggregate(Aggregation::count());
        let (sql, params) = spec.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT AVG(sale_price) AS avg_sale_price, COUNT(*) AS count FROM properties \
             WHERE property_type = ? AND sale_date IS NOT NULL"
        );
        assert_eq!(params, vec![CellValue::from("Condo")]);

        let bad = QuerySpec::table("properties; DROP TABLE properties");
        assert!(matches!(bad.to_sql().unwrap_err(), DomainError::Validation(_)));
    }

    #[test]
    fn grouped_sql_orders_and_limits() {
        let spec = QuerySpec::table("market_data")
            .group_by("region")
            .aggregate(Aggregation::max("median_price").alias("top"))
            .order_by("top", SortOrder::Desc)
            .limit(2);
        let (sql, params) = spec.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT region, MAX(median_price) AS top FROM market_data GROUP BY region \
             ORDER BY top DESC LIMIT 2"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn structural_rules_are_enforced() {
        let group_without_agg = QuerySpec::table("t").group_by("a");
        assert!(group_without_agg.validate().is_err());

        let stray_column = QuerySpec::table("t").columns(["a"]).aggregate(Aggregation::count());
        assert!(stray_column.validate().is_err());

        let order_outside = QuerySpec::table("t").columns(["a"]).order_by("b", SortOrder::Asc);
        assert!(order_outside.validate().is_err());
    }

    #[test]
    fn evaluate_filters_with_null_semantics() {
        let spec = QuerySpec::table("properties").filter(Filter::lt("sale_price", 400_000.0));
        let result = spec.evaluate(&listings()).unwrap();
        assert_eq!(result.len(), 2);

        let spec = QuerySpec::table("properties")
            .columns(["property_type"])
            .filter(Filter::is_null("sale_price"));
        let result = spec.evaluate(&listings()).unwrap();
        assert_eq!(result.columns, vec!["property_type".to_string()]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn evaluate_aggregates_over_no_rows_yield_null_and_zero() {
        let spec = QuerySpec::table("properties")
            .filter(Filter::eq("property_type", "Castle"))
            .aggregate(Aggregation::avg("sale_price"))
            .aggregate(Aggregation::sum("days_on_market"))
            .aggregate(Aggregation::count());
        let result = spec.evaluate(&listings()).unwrap();
        assert_eq!(
            result.rows,
            vec![vec![CellValue::Null, CellValue::Null, CellValue::Integer(0)]]
        );
    }

    #[test]
    fn evaluate_groups_in_first_seen_order() {
        let spec = QuerySpec::table("properties")
            .group_by("property_type")
            .aggregate(Aggregation::avg("sale_price"))
            .aggregate(Aggregation::count_of("sale_price"))
            .aggregate(Aggregation::sum("days_on_market"));
        let result = spec.evaluate(&listings()).unwrap();

        assert_eq!(
            result.columns,
            vec!["property_type", "avg_sale_price", "count_sale_price", "sum_days_on_market"]
        );
        assert_eq!(
            result.rows[0],
            vec![
                CellValue::from("Condo"),
                CellValue::Real(310_000.0),
                CellValue::Integer(2),
                CellValue::Integer(55),
            ]
        );
        assert_eq!(result.rows[1][0], CellValue::from("Townhouse"));
    }

    #[test]
    fn evaluate_orders_nulls_first_and_limits() {
        let spec = QuerySpec::table("properties")
            .columns(["sale_price"])
            .order_by("sale_price", SortOrder::Asc)
            .limit(2);
        let result = spec.evaluate(&listings()).unwrap();
        assert_eq!(
            result.rows,
            vec![vec![CellValue::Null], vec![CellValue::Real(300_000.0)]]
        );

        let spec = QuerySpec::table("properties")
            .aggregate(Aggregation::min("property_type"))
            .aggregate(Aggregation::max("sale_price"));
        let result = spec.evaluate(&listings()).unwrap();
        assert_eq!(
            result.rows[0],
            vec![CellValue::from("Condo"), CellValue::Real(450_000.0)]
        );
    }

    #[test]
    fn unknown_filter_column_is_a_validation_error() {
        let spec = QuerySpec::table("properties").filter(Filter::eq("color", "red"));
        assert!(matches!(
            spec.evaluate(&listings()).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: null and non-null counts partition COUNT(*), and SUM
            /// over integers is exact.
            #[test]
            fn counts_partition_rows(values in prop::collection::vec(prop::option::of(-1000i64..1000), 0..40)) {
                let table = Table::with_rows(
                    vec!["v".into()],
                    values.iter().map(|v| vec![CellValue::from(*v)]).collect(),
                );
                let spec = QuerySpec::table("t")
                    .aggregate(Aggregation::count())
                    .aggregate(Aggregation::count_of("v"))
                    .aggregate(Aggregation::sum("v"));
                let row = spec.evaluate(&table).unwrap().rows.remove(0);

                let present: Vec<i64> = values.iter().flatten().copied().collect();
                prop_assert_eq!(&row[0], &CellValue::Integer(values.len() as i64));
                prop_assert_eq!(&row[1], &CellValue::Integer(present.len() as i64));
                let expected_sum = if present.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::Integer(present.iter().sum())
                };
                prop_assert_eq!(&row[2], &expected_sum);
            }
        }
    }
}
