//! Read-only dashboard snapshots: metric cards plus chart specifications
//! for a presentation layer to draw.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use realty_core::DomainError;
use realty_platform::{
    Aggregation, DEFAULT_SOURCE, DataPlatform, Filter, PlatformResult, QuerySpec, SortOrder, Table,
};

use crate::analyzer::{DataAnalyzer, window_start};
use crate::kpi::{KpiDashboard, PerformanceStatus, Trend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardView {
    Executive,
    Property,
    Rental,
}

impl DashboardView {
    pub const ALL: [DashboardView; 3] = [
        DashboardView::Executive,
        DashboardView::Property,
        DashboardView::Rental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardView::Executive => "executive",
            DashboardView::Property => "property",
            DashboardView::Rental => "rental",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DashboardView::Executive => "Real Estate Executive Dashboard",
            DashboardView::Property => "Property Analysis Dashboard",
            DashboardView::Rental => "Rental Property Dashboard",
        }
    }
}

impl FromStr for DashboardView {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "executive" => Ok(DashboardView::Executive),
            "property" => Ok(DashboardView::Property),
            "rental" => Ok(DashboardView::Rental),
            other => Err(DomainError::validation(format!(
                "unknown dashboard view '{other}' (expected executive, property or rental)"
            ))),
        }
    }
}

impl core::fmt::Display for DashboardView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<ChartPoint>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
        }
    }

    pub fn point(mut self, label: impl Into<String>, value: f64) -> Self {
        self.points.push(ChartPoint {
            label: label.into(),
            value,
        });
        self
    }

    /// Pairs a label column with a numeric column, skipping rows where
    /// either is missing.
    fn from_table(name: impl Into<String>, table: &Table, label_col: &str, value_col: &str) -> Self {
        let points = (0..table.len())
            .filter_map(|row| {
                let label = table.get(row, label_col)?.to_string();
                let value = table.get(row, value_col)?.as_f64()?;
                Some(ChartPoint { label, value })
            })
            .collect();
        Self {
            name: name.into(),
            points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub x_axis: String,
    pub y_axis: String,
    pub series: Vec<Series>,
}

impl ChartSpec {
    pub fn new(title: impl Into<String>, kind: ChartKind) -> Self {
        Self {
            title: title.into(),
            kind,
            x_axis: String::new(),
            y_axis: String::new(),
            series: Vec::new(),
        }
    }

    pub fn axes(mut self, x: impl Into<String>, y: impl Into<String>) -> Self {
        self.x_axis = x.into();
        self.y_axis = y.into();
        self
    }

    pub fn series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    /// True when there is nothing to plot.
    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCard {
    pub title: String,
    pub value: Option<f64>,
    pub unit: String,
    pub target: Option<f64>,
    pub trend: Option<Trend>,
    pub status: PerformanceStatus,
}

impl MetricCard {
    fn plain(title: impl Into<String>, value: Option<f64>, unit: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value,
            unit: unit.into(),
            target: None,
            trend: None,
            status: PerformanceStatus::NoTarget,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub view: DashboardView,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub data_sources: Vec<String>,
    pub metrics: Vec<MetricCard>,
    pub charts: Vec<ChartSpec>,
}

impl DashboardSnapshot {
    pub fn chart(&self, title: &str) -> Option<&ChartSpec> {
        self.charts.iter().find(|c| c.title == title)
    }

    pub fn metric(&self, title: &str) -> Option<&MetricCard> {
        self.metrics.iter().find(|m| m.title == title)
    }
}

/// Builds snapshots from the platform's default source. Nothing here
/// mutates KPIs or stored data.
pub struct DashboardBuilder {
    platform: Arc<DataPlatform>,
    analyzer: DataAnalyzer,
}

impl DashboardBuilder {
    pub fn new(platform: Arc<DataPlatform>) -> Self {
        let analyzer = DataAnalyzer::new(Arc::clone(&platform));
        Self { platform, analyzer }
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.analyzer = self.analyzer.with_as_of(as_of);
        self
    }

    pub async fn snapshot(
        &self,
        view: DashboardView,
        kpis: &KpiDashboard,
    ) -> PlatformResult<DashboardSnapshot> {
        let (metrics, charts) = match view {
            DashboardView::Executive => (kpi_cards(kpis), self.executive_charts().await?),
            DashboardView::Property => self.property_view().await?,
            DashboardView::Rental => self.rental_view().await?,
        };
        debug!(view = %view, charts = charts.len(), "dashboard snapshot built");

        Ok(DashboardSnapshot {
            view,
            title: view.title().to_string(),
            generated_at: Utc::now(),
            data_sources: self
                .platform
                .catalog()
                .iter()
                .map(|s| s.name().to_string())
                .collect(),
            metrics,
            charts,
        })
    }

    /// Average of a market column per date over the trailing window.
    async fn market_series(&self, column: &str, days: i64) -> PlatformResult<Table> {
        let cutoff = window_start(self.analyzer.as_of(), days)?;
        let spec = QuerySpec::table("market_data")
            .filter(Filter::gte("date", cutoff))
            .group_by("date")
            .aggregate(Aggregation::avg(column).alias("value"))
            .order_by("date", SortOrder::Asc);
        self.platform.query(DEFAULT_SOURCE, &spec).await
    }

    async fn executive_charts(&self) -> PlatformResult<Vec<ChartSpec>> {
        let prices = self.market_series("median_price", 365).await?;
        let inventory = self.market_series("inventory_count", 180).await?;
        let by_type = self
            .platform
            .query(
                DEFAULT_SOURCE,
                &QuerySpec::table("properties")
                    .filter(Filter::is_not_null("sale_date"))
                    .group_by("property_type")
                    .aggregate(Aggregation::count())
                    .order_by("property_type", SortOrder::Asc),
            )
            .await?;

        let mut sales = ChartSpec::new("Sales Performance Over Time", ChartKind::Bar)
            .axes("Month", "Number of Sales");
        if let Some(perf) = self.analyzer.analyze_property_performance(None).await? {
            let mut count = Series::new("Sales Count");
            let mut days = Series::new("Avg Days on Market");
            for (month, stats) in &perf.monthly_trends {
                count = count.point(month.to_string(), stats.sales_count as f64);
                if let Some(d) = stats.avg_days_on_market {
                    days = days.point(month.to_string(), d);
                }
            }
            sales = sales.series(count).series(days);
        }

        Ok(vec![
            ChartSpec::new("Price Trends Over Time", ChartKind::Line)
                .axes("Date", "Average Price ($)")
                .series(Series::from_table("Median Price", &prices, "date", "value")),
            sales,
            ChartSpec::new("Property Type Distribution", ChartKind::Pie)
                .series(Series::from_table("Sold Properties", &by_type, "property_type", "count")),
            ChartSpec::new("Market Inventory Levels", ChartKind::Line)
                .axes("Date", "Average Inventory Count")
                .series(Series::from_table("Market Inventory", &inventory, "date", "value")),
        ])
    }

    async fn property_view(&self) -> PlatformResult<(Vec<MetricCard>, Vec<ChartSpec>)> {
        let perf = self.analyzer.analyze_property_performance(None).await?;

        let metrics = vec![
            MetricCard::plain(
                "Total Sales",
                perf.as_ref().map(|p| p.total_sales as f64),
                "sales",
            ),
            MetricCard::plain(
                "Avg Sale Price",
                perf.as_ref().map(|p| p.overall.avg_sale_price),
                "$",
            ),
            MetricCard::plain(
                "Median Sale Price",
                perf.as_ref().map(|p| p.overall.median_sale_price),
                "$",
            ),
            MetricCard::plain(
                "Avg Days on Market",
                perf.as_ref().and_then(|p| p.overall.avg_days_on_market),
                "days",
            ),
            MetricCard::plain(
                "Avg Price/SqFt",
                perf.as_ref().and_then(|p| p.overall.avg_price_per_sqft),
                "$/sqft",
            ),
        ];

        let mut price = Series::new("Avg Sale Price");
        let mut days = Series::new("Avg Days on Market");
        let mut correlations = Series::new("Correlation with Sale Price");
        if let Some(perf) = &perf {
            for (kind, sales) in &perf.by_type {
                price = price.point(kind.as_str(), sales.avg_sale_price);
                if let Some(d) = sales.avg_days_on_market {
                    days = days.point(kind.as_str(), d);
                }
            }
            for (feature, r) in &perf.price_correlations {
                correlations = correlations.point(feature.as_str(), *r);
            }
        }

        let charts = vec![
            ChartSpec::new("Price Distribution by Property Type", ChartKind::Bar)
                .axes("Property Type", "Average Sale Price ($)")
                .series(price),
            ChartSpec::new("Days on Market by Property Type", ChartKind::Bar)
                .axes("Property Type", "Average Days on Market")
                .series(days),
            ChartSpec::new("Price vs Features", ChartKind::Bar)
                .axes("Feature", "Pearson r")
                .series(correlations),
        ];
        Ok((metrics, charts))
    }

    async fn rental_view(&self) -> PlatformResult<(Vec<MetricCard>, Vec<ChartSpec>)> {
        let rentals = self.analyzer.analyze_rental_performance().await?;
        let yields = self.market_series("rental_yield", 365).await?;

        let metrics = vec![
            MetricCard::plain(
                "Avg Monthly Rent",
                rentals.as_ref().map(|r| r.avg_monthly_rent),
                "$",
            ),
            MetricCard::plain(
                "Occupancy Rate",
                rentals.as_ref().map(|r| r.occupancy_rate * 100.0),
                "%",
            ),
            MetricCard::plain(
                "Avg Rent/SqFt",
                rentals.as_ref().and_then(|r| r.avg_rent_per_sqft),
                "$/sqft",
            ),
            MetricCard::plain(
                "Avg Lease Duration",
                rentals.as_ref().and_then(|r| r.avg_lease_duration_days),
                "days",
            ),
        ];

        let mut occupancy = Series::new("Occupancy Rate");
        let mut rent = Series::new("Avg Rent");
        if let Some(rentals) = &rentals {
            for (kind, stats) in &rentals.by_type {
                occupancy = occupancy.point(kind.as_str(), stats.occupancy_rate * 100.0);
                rent = rent.point(kind.as_str(), stats.avg_rent);
            }
        }

        let charts = vec![
            ChartSpec::new("Occupancy Rate by Property Type", ChartKind::Bar)
                .axes("Property Type", "Occupancy (%)")
                .series(occupancy),
            ChartSpec::new("Rental Yield Trend", ChartKind::Line)
                .axes("Date", "Rental Yield (%)")
                .series(Series::from_table("Rental Yield", &yields, "date", "value")),
            ChartSpec::new("Rent by Property Type", ChartKind::Bar)
                .axes("Property Type", "Average Monthly Rent ($)")
                .series(rent),
        ];
        Ok((metrics, charts))
    }
}

fn kpi_cards(kpis: &KpiDashboard) -> Vec<MetricCard> {
    kpis.kpis
        .iter()
        .map(|kpi| MetricCard {
            title: kpi.name.clone(),
            value: kpi.current_value,
            unit: kpi.unit.clone(),
            target: kpi.target,
            trend: Some(kpi.trend),
            status: kpi.performance_status,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_names_parse_case_insensitively() {
        assert_eq!("Executive".parse::<DashboardView>().unwrap(), DashboardView::Executive);
        assert_eq!(" rental ".parse::<DashboardView>().unwrap(), DashboardView::Rental);
        for view in DashboardView::ALL {
            assert_eq!(view.as_str().parse::<DashboardView>().unwrap(), view);
        }
        assert!(matches!(
            "sales".parse::<DashboardView>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn series_from_table_skips_missing_values() {
        let table = Table::with_rows(
            vec!["date".into(), "value".into()],
            vec![
                vec!["2026-01-05".into(), 410_000.0.into()],
                vec!["2026-01-12".into(), realty_platform::CellValue::Null],
            ],
        );
        let series = Series::from_table("Median Price", &table, "date", "value");
        assert_eq!(series.points.len(), 1);
        assert_eq!(series.points[0].label, "2026-01-05");

        let chart = ChartSpec::new("Empty", ChartKind::Pie).series(Series::new("none"));
        assert!(chart.is_empty());
    }
}
