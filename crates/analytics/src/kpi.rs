//! KPI definitions and the manager that recomputes them from the data
//! platform.
//!
//! A KPI's value only changes on an explicit refresh
//! ([`KpiManager::calculate_kpi`] / [`KpiManager::calculate_all_kpis`]);
//! [`KpiManager::get_kpi_dashboard`] is a pure read.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use realty_core::{DomainError, DomainResult};
use realty_platform::{
    Aggregation, CellValue, DEFAULT_SOURCE, DataPlatform, Filter, PlatformResult, QuerySpec,
};

/// Samples kept per KPI; older ones are dropped first.
pub const KPI_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KpiCategory {
    Sales,
    Rental,
    Market,
    Financial,
    Operational,
    Customer,
}

impl KpiCategory {
    pub fn label(&self) -> &'static str {
        match self {
            KpiCategory::Sales => "Sales Performance",
            KpiCategory::Rental => "Rental Performance",
            KpiCategory::Market => "Market Analysis",
            KpiCategory::Financial => "Financial Metrics",
            KpiCategory::Operational => "Operational Efficiency",
            KpiCategory::Customer => "Customer Satisfaction",
        }
    }
}

/// Direction of the latest change, by sign of `new - previous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Flat,
}

impl Trend {
    pub fn between(previous: Option<f64>, current: Option<f64>) -> Self {
        match (previous, current) {
            (Some(p), Some(c)) if c > p => Trend::Up,
            (Some(p), Some(c)) if c < p => Trend::Down,
            _ => Trend::Flat,
        }
    }
}

/// Current value relative to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Exceeding,
    Meeting,
    Below,
    Poor,
    NoTarget,
}

impl PerformanceStatus {
    pub fn evaluate(current: Option<f64>, target: Option<f64>) -> Self {
        let (Some(current), Some(target)) = (current, target) else {
            return PerformanceStatus::NoTarget;
        };
        if target == 0.0 {
            return PerformanceStatus::NoTarget;
        }
        let ratio = current / target;
        if ratio >= 1.0 {
            PerformanceStatus::Exceeding
        } else if ratio >= 0.9 {
            PerformanceStatus::Meeting
        } else if ratio >= 0.7 {
            PerformanceStatus::Below
        } else {
            PerformanceStatus::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiExpr {
    /// First cell of the result.
    Scalar(QuerySpec),
    /// `numerator / denominator`, each taken as a scalar. A zero or missing
    /// denominator yields no value.
    Ratio {
        numerator: QuerySpec,
        denominator: QuerySpec,
    },
}

/// Where a KPI's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiQuery {
    pub source: String,
    pub expr: KpiExpr,
    /// Multiplier applied to the raw result (e.g. percent to fraction).
    pub scale: f64,
}

impl KpiQuery {
    pub fn scalar(source: impl Into<String>, spec: QuerySpec) -> Self {
        Self {
            source: source.into(),
            expr: KpiExpr::Scalar(spec),
            scale: 1.0,
        }
    }

    pub fn ratio(source: impl Into<String>, numerator: QuerySpec, denominator: QuerySpec) -> Self {
        Self {
            source: source.into(),
            expr: KpiExpr::Ratio {
                numerator,
                denominator,
            },
            scale: 1.0,
        }
    }

    /// `AVG(column)` over non-null values of `table`.
    pub fn average(source: impl Into<String>, table: &str, column: &str) -> Self {
        Self::scalar(
            source,
            QuerySpec::table(table)
                .filter(Filter::is_not_null(column))
                .aggregate(Aggregation::avg(column)),
        )
    }

    pub fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub async fn evaluate(&self, platform: &DataPlatform) -> PlatformResult<Option<f64>> {
        let value = match &self.expr {
            KpiExpr::Scalar(spec) => scalar(platform, &self.source, spec).await?,
            KpiExpr::Ratio {
                numerator,
                denominator,
            } => {
                let den = scalar(platform, &self.source, denominator).await?;
                match den {
                    Some(den) if den != 0.0 => scalar(platform, &self.source, numerator)
                        .await?
                        .map(|num| num / den),
                    _ => None,
                }
            }
        };
        Ok(value.map(|v| v * self.scale).filter(|v| v.is_finite()))
    }
}

async fn scalar(platform: &DataPlatform, source: &str, spec: &QuerySpec) -> PlatformResult<Option<f64>> {
    let table = platform.query(source, spec).await?;
    Ok(table.scalar_f64())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiSample {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Everything needed to register a KPI.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiDefinition {
    pub name: String,
    pub category: KpiCategory,
    pub description: String,
    pub target: Option<f64>,
    pub unit: String,
    pub query: KpiQuery,
}

impl KpiDefinition {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<Option<f64>>,
        unit: impl Into<String>,
        query: KpiQuery,
    ) -> Self {
        Self {
            name: name.into(),
            category: KpiCategory::Operational,
            description: String::new(),
            target: target.into(),
            unit: unit.into(),
            query,
        }
    }

    pub fn category(mut self, category: KpiCategory) -> Self {
        self.category = category;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    name: String,
    category: KpiCategory,
    description: String,
    unit: String,
    target: Option<f64>,
    query: KpiQuery,
    current_value: Option<f64>,
    previous_value: Option<f64>,
    trend: Trend,
    history: Vec<KpiSample>,
    created_at: DateTime<Utc>,
    last_calculated: Option<DateTime<Utc>>,
    active: bool,
}

impl Kpi {
    fn new(def: KpiDefinition) -> Self {
        Self {
            name: def.name,
            category: def.category,
            description: def.description,
            unit: def.unit,
            target: def.target,
            query: def.query,
            current_value: None,
            previous_value: None,
            trend: Trend::Flat,
            history: Vec::new(),
            created_at: Utc::now(),
            last_calculated: None,
            active: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> KpiCategory {
        self.category
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    pub fn query(&self) -> &KpiQuery {
        &self.query
    }

    pub fn current_value(&self) -> Option<f64> {
        self.current_value
    }

    pub fn previous_value(&self) -> Option<f64> {
        self.previous_value
    }

    pub fn trend(&self) -> Trend {
        self.trend
    }

    /// Oldest first; at most [`KPI_HISTORY_LIMIT`] samples.
    pub fn history(&self) -> &[KpiSample] {
        &self.history
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn performance_status(&self) -> PerformanceStatus {
        PerformanceStatus::evaluate(self.current_value, self.target)
    }

    /// Shift the current value into `previous_value` and take the new one.
    fn record(&mut self, value: Option<f64>, at: DateTime<Utc>) {
        self.previous_value = self.current_value;
        self.trend = Trend::between(self.previous_value, value);
        self.current_value = value;
        self.last_calculated = Some(at);
        if let Some(value) = value {
            if self.history.len() == KPI_HISTORY_LIMIT {
                self.history.remove(0);
            }
            self.history.push(KpiSample { at, value });
        }
    }

    fn snapshot(&self) -> KpiSnapshot {
        KpiSnapshot {
            name: self.name.clone(),
            category: self.category,
            description: self.description.clone(),
            unit: self.unit.clone(),
            target: self.target,
            current_value: self.current_value,
            previous_value: self.previous_value,
            trend: self.trend,
            performance_status: self.performance_status(),
            last_calculated: self.last_calculated,
            history_len: self.history.len(),
        }
    }
}

/// Read-only view of one KPI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub name: String,
    pub category: KpiCategory,
    pub description: String,
    pub unit: String,
    pub target: Option<f64>,
    pub current_value: Option<f64>,
    pub previous_value: Option<f64>,
    pub trend: Trend,
    pub performance_status: PerformanceStatus,
    pub last_calculated: Option<DateTime<Utc>>,
    pub history_len: usize,
}

/// Active KPIs in registration order, plus a per-category grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDashboard {
    pub generated_at: DateTime<Utc>,
    pub total_kpis: usize,
    pub active_kpis: usize,
    pub categories: BTreeMap<String, Vec<String>>,
    pub kpis: Vec<KpiSnapshot>,
}

impl KpiDashboard {
    pub fn kpi(&self, name: &str) -> Option<&KpiSnapshot> {
        self.kpis.iter().find(|k| k.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
struct KpiExport<'a> {
    export_date: DateTime<Utc>,
    kpis: Vec<KpiSnapshot>,
    historical_data: BTreeMap<&'a str, &'a [KpiSample]>,
}

pub struct KpiManager {
    platform: Arc<DataPlatform>,
    kpis: Vec<Kpi>,
}

impl KpiManager {
    pub fn new(platform: Arc<DataPlatform>) -> Self {
        Self {
            platform,
            kpis: Vec::new(),
        }
    }

    /// Manager preloaded with the standard real estate KPIs, all computed from
    /// the platform's local store.
    pub fn with_default_kpis(platform: Arc<DataPlatform>) -> Self {
        let mut manager = Self::new(platform);
        for def in default_kpis() {
            // Names in the default set are distinct.
            let _ = manager.register(def);
        }
        manager
    }

    pub fn register_kpi(
        &mut self,
        name: impl Into<String>,
        target: f64,
        unit: impl Into<String>,
        query: KpiQuery,
    ) -> DomainResult<()> {
        self.register(KpiDefinition::new(name, target, unit, query))
    }

    pub fn register(&mut self, def: KpiDefinition) -> DomainResult<()> {
        if def.name.trim().is_empty() {
            return Err(DomainError::validation("KPI name cannot be empty"));
        }
        if self.kpis.iter().any(|k| k.name == def.name) {
            return Err(DomainError::conflict(format!("KPI '{}' already registered", def.name)));
        }
        if !def.query.scale.is_finite() {
            return Err(DomainError::validation(format!("KPI '{}' has a non-finite scale", def.name)));
        }

        info!(kpi = %def.name, source = %def.query.source, "kpi registered");
        self.kpis.push(Kpi::new(def));
        Ok(())
    }

    pub fn kpi(&self, name: &str) -> DomainResult<&Kpi> {
        self.kpis
            .iter()
            .find(|k| k.name == name)
            .ok_or_else(|| DomainError::not_found(format!("KPI '{name}'")))
    }

    pub fn kpis(&self) -> &[Kpi] {
        &self.kpis
    }

    /// Stop computing a KPI. It remains in exports but leaves the dashboard.
    pub fn deactivate_kpi(&mut self, name: &str) -> DomainResult<()> {
        let idx = self.position(name)?;
        self.kpis[idx].active = false;
        info!(kpi = name, "kpi deactivated");
        Ok(())
    }

    /// Recompute one KPI. Data access failures are logged and recorded as a
    /// missing value.
    pub async fn calculate_kpi(&mut self, name: &str) -> DomainResult<Option<f64>> {
        let idx = self.position(name)?;
        if !self.kpis[idx].active {
            return Err(DomainError::invalid_state(format!("KPI '{name}' is inactive")));
        }
        let value = self.refresh(idx, Utc::now()).await;
        self.track(&[idx]).await;
        Ok(value)
    }

    /// Recompute every active KPI. Returns the new value per KPI name.
    pub async fn calculate_all_kpis(&mut self) -> BTreeMap<String, Option<f64>> {
        let now = Utc::now();
        let mut results = BTreeMap::new();
        let mut refreshed = Vec::new();

        for idx in 0..self.kpis.len() {
            if !self.kpis[idx].active {
                continue;
            }
            let value = self.refresh(idx, now).await;
            results.insert(self.kpis[idx].name.clone(), value);
            refreshed.push(idx);
        }

        self.track(&refreshed).await;
        info!(
            computed = results.values().filter(|v| v.is_some()).count(),
            missing = results.values().filter(|v| v.is_none()).count(),
            "kpis recalculated"
        );
        results
    }

    pub fn get_kpi_dashboard(&self) -> KpiDashboard {
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut kpis = Vec::new();
        for kpi in self.kpis.iter().filter(|k| k.active) {
            categories
                .entry(kpi.category.label().to_string())
                .or_default()
                .push(kpi.name.clone());
            kpis.push(kpi.snapshot());
        }

        KpiDashboard {
            generated_at: Utc::now(),
            total_kpis: self.kpis.len(),
            active_kpis: kpis.len(),
            categories,
            kpis,
        }
    }

    /// All KPIs (active or not) with their full history, as pretty JSON.
    pub fn export_kpi_data(&self) -> PlatformResult<String> {
        let export = KpiExport {
            export_date: Utc::now(),
            kpis: self.kpis.iter().map(Kpi::snapshot).collect(),
            historical_data: self
                .kpis
                .iter()
                .map(|k| (k.name.as_str(), k.history.as_slice()))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    fn position(&self, name: &str) -> DomainResult<usize> {
        self.kpis
            .iter()
            .position(|k| k.name == name)
            .ok_or_else(|| DomainError::not_found(format!("KPI '{name}'")))
    }

    async fn refresh(&mut self, idx: usize, at: DateTime<Utc>) -> Option<f64> {
        let value = match self.kpis[idx].query.evaluate(&self.platform).await {
            Ok(value) => value,
            Err(err) => {
                warn!(kpi = %self.kpis[idx].name, error = %err, "kpi query failed; treating as missing data");
                None
            }
        };

        let kpi = &mut self.kpis[idx];
        kpi.record(value, at);
        debug!(kpi = %kpi.name, value = ?value, trend = ?kpi.trend, "kpi recomputed");
        value
    }

    /// Append computed values to the store's `kpi_tracking` table.
    async fn track(&self, indices: &[usize]) {
        let rows: Vec<Vec<CellValue>> = indices
            .iter()
            .map(|&i| &self.kpis[i])
            .filter_map(|kpi| {
                let value = kpi.current_value?;
                let at = kpi.last_calculated?;
                Some(vec![
                    at.date_naive().format("%Y-%m-%d").to_string().into(),
                    kpi.name.clone().into(),
                    value.into(),
                    kpi.target.into(),
                    kpi.category.label().into(),
                ])
            })
            .collect();
        if rows.is_empty() {
            return;
        }

        let columns: Vec<String> = ["date", "kpi_name", "kpi_value", "target_value", "category"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        if let Err(err) = self.platform.insert_rows("kpi_tracking", &columns, &rows).await {
            warn!(error = %err, "failed to persist kpi history");
        }
    }
}

/// The standard real estate KPI set.
pub fn default_kpis() -> Vec<KpiDefinition> {
    let sold = || QuerySpec::table("properties").filter(Filter::is_not_null("sale_date"));
    let all_properties = QuerySpec::table("properties").aggregate(Aggregation::count());
    let all_rentals = QuerySpec::table("rental_properties").aggregate(Aggregation::count());
    let occupied = QuerySpec::table("rental_properties")
        .filter(Filter::eq("occupancy_status", "Occupied"))
        .aggregate(Aggregation::count());

    vec![
        KpiDefinition::new(
            "Average Days on Market",
            45.0,
            "days",
            KpiQuery::scalar(
                DEFAULT_SOURCE,
                sold()
                    .filter(Filter::is_not_null("days_on_market"))
                    .aggregate(Aggregation::avg("days_on_market")),
            ),
        )
        .category(KpiCategory::Sales)
        .description("Average number of days properties stay on the market before selling"),
        KpiDefinition::new(
            "Sales Conversion Rate",
            0.75,
            "%",
            KpiQuery::ratio(DEFAULT_SOURCE, sold().aggregate(Aggregation::count()), all_properties),
        )
        .category(KpiCategory::Sales)
        .description("Share of listings that result in sales"),
        KpiDefinition::new(
            "Average Sale Price",
            500_000.0,
            "$",
            KpiQuery::average(DEFAULT_SOURCE, "properties", "sale_price"),
        )
        .category(KpiCategory::Sales)
        .description("Average sale price of properties"),
        KpiDefinition::new(
            "Occupancy Rate",
            0.95,
            "%",
            KpiQuery::ratio(DEFAULT_SOURCE, occupied, all_rentals),
        )
        .category(KpiCategory::Rental)
        .description("Share of rental properties that are occupied"),
        KpiDefinition::new(
            "Average Rental Yield",
            0.06,
            "%",
            KpiQuery::average(DEFAULT_SOURCE, "market_data", "rental_yield").scaled(0.01),
        )
        .category(KpiCategory::Rental)
        .description("Average rental yield across regions"),
        KpiDefinition::new(
            "Price per Square Foot",
            250.0,
            "$/sqft",
            KpiQuery::average(DEFAULT_SOURCE, "market_data", "price_per_sqft"),
        )
        .category(KpiCategory::Market)
        .description("Average price per square foot in the market"),
        KpiDefinition::new(
            "Market Inventory",
            150.0,
            "properties",
            KpiQuery::average(DEFAULT_SOURCE, "market_data", "inventory_count"),
        )
        .category(KpiCategory::Market)
        .description("Average number of properties available in the market"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_follows_sign_of_change() {
        assert_eq!(Trend::between(Some(1.0), Some(2.0)), Trend::Up);
        assert_eq!(Trend::between(Some(2.0), Some(1.0)), Trend::Down);
        assert_eq!(Trend::between(Some(2.0), Some(2.0)), Trend::Flat);
        assert_eq!(Trend::between(None, Some(2.0)), Trend::Flat);
        assert_eq!(Trend::between(Some(2.0), None), Trend::Flat);
    }

    #[test]
    fn performance_thresholds() {
        let status = |c| PerformanceStatus::evaluate(Some(c), Some(100.0));
        assert_eq!(status(100.0), PerformanceStatus::Exceeding);
        assert_eq!(status(90.0), PerformanceStatus::Meeting);
        assert_eq!(status(70.0), PerformanceStatus::Below);
        assert_eq!(status(69.9), PerformanceStatus::Poor);
        assert_eq!(
            PerformanceStatus::evaluate(None, Some(1.0)),
            PerformanceStatus::NoTarget
        );
    }

    #[test]
    fn record_keeps_previous_and_history() {
        let mut kpi = Kpi::new(KpiDefinition::new(
            "Occupancy Rate",
            0.95,
            "%",
            KpiQuery::average(DEFAULT_SOURCE, "rental_properties", "monthly_rent"),
        ));
        let now = Utc::now();
        kpi.record(Some(0.8), now);
        kpi.record(Some(0.9), now);
        assert_eq!(kpi.previous_value(), Some(0.8));
        assert_eq!(kpi.trend(), Trend::Up);

        kpi.record(None, now);
        assert_eq!(kpi.current_value(), None);
        assert_eq!(kpi.trend(), Trend::Flat);
        assert_eq!(kpi.history().len(), 2);
    }

    #[test]
    fn history_keeps_only_the_newest_samples() {
        let mut kpi = Kpi::new(KpiDefinition::new(
            "Average Sale Price",
            450_000.0,
            "$",
            KpiQuery::average(DEFAULT_SOURCE, "properties", "sale_price"),
        ));
        let now = Utc::now();
        for i in 0..KPI_HISTORY_LIMIT + 5 {
            kpi.record(Some(i as f64), now);
        }
        assert_eq!(kpi.history().len(), KPI_HISTORY_LIMIT);
        assert_eq!(kpi.history()[0].value, 5.0);
        assert_eq!(
            kpi.history().last().map(|s| s.value),
            Some((KPI_HISTORY_LIMIT + 4) as f64)
        );
    }

    #[test]
    fn default_set_has_distinct_names() {
        let defs = default_kpis();
        assert_eq!(defs.len(), 7);
        let mut names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 7);
        for def in &defs {
            let specs = match &def.query.expr {
                KpiExpr::Scalar(spec) => vec![spec],
                KpiExpr::Ratio { numerator, denominator } => vec![numerator, denominator],
            };
            for spec in specs {
                spec.validate().unwrap();
            }
        }
    }
}
