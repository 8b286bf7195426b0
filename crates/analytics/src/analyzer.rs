//! Descriptive analyses over the platform's property, rental and market
//! tables, plus a pure investment calculator.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use realty_core::{DomainError, DomainResult};
use realty_platform::{
    Aggregation, DEFAULT_SOURCE, DataPlatform, Filter, PlatformResult, QuerySpec, SortOrder, Table,
};

use crate::report::MarketReport;
use crate::stats;

pub const MARKET_COLUMNS: [&str; 5] = [
    "median_price",
    "average_days_on_market",
    "inventory_count",
    "price_per_sqft",
    "rental_yield",
];

const PRICE_FEATURES: [&str; 3] = ["bedrooms", "bathrooms", "square_feet"];

/// Comparable properties are those within this fraction of the target's size.
const COMPARABLE_SQFT_RANGE: f64 = 0.2;

pub const MAX_LOAN_TERM_YEARS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    fn of_slope(slope: f64) -> Self {
        if slope > 0.0 {
            TrendDirection::Increasing
        } else if slope < 0.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTrend {
    pub current_value: f64,
    pub slope: f64,
    pub direction: TrendDirection,
    pub correlation: Option<f64>,
    /// Change from the first to the last observation, in percent.
    pub percentage_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub avg_median_price: Option<f64>,
    pub avg_days_on_market: Option<f64>,
    pub avg_inventory: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrends {
    pub region: Option<String>,
    pub period_days: i64,
    pub data_points: usize,
    /// Keyed by market column. Across all regions the series is the weekly
    /// average over regions.
    pub trends: BTreeMap<String, ColumnTrend>,
    /// Per-region averages; only filled when no region was requested.
    pub regional_summary: BTreeMap<String, RegionSummary>,
    pub analysis_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    pub avg_sale_price: f64,
    pub median_sale_price: f64,
    pub avg_days_on_market: Option<f64>,
    pub median_days_on_market: Option<f64>,
    pub price_variance: Option<f64>,
    pub avg_price_per_sqft: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSales {
    pub count: usize,
    pub avg_sale_price: f64,
    pub avg_days_on_market: Option<f64>,
    pub avg_price_per_sqft: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySales {
    pub sales_count: usize,
    pub avg_sale_price: f64,
    pub avg_days_on_market: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPerformance {
    pub property_type: Option<String>,
    pub total_sales: usize,
    pub overall: SalesMetrics,
    /// Only filled when no property type was requested.
    pub by_type: BTreeMap<String, TypeSales>,
    /// Pearson correlation of each feature with sale price.
    pub price_correlations: BTreeMap<String, f64>,
    /// Keyed by listing month (1-12).
    pub monthly_trends: BTreeMap<u32, MonthlySales>,
    pub analysis_date: DateTime<Utc>,
}

/// The property being priced against its comparables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyProfile {
    pub property_type: String,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub square_feet: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingStrategy {
    pub target: PropertyProfile,
    pub comparable_count: usize,
    pub price_per_sqft_median: f64,
    pub price_per_sqft_mean: f64,
    pub estimated_market_value: f64,
    pub conservative_price: f64,
    pub aggressive_price: f64,
    pub avg_days_on_market: Option<f64>,
    pub median_days_on_market: Option<f64>,
    pub quick_sale_threshold: Option<f64>,
    pub slow_sale_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRentals {
    pub count: usize,
    pub avg_rent: f64,
    pub avg_rent_per_sqft: Option<f64>,
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalPerformance {
    pub total_rentals: usize,
    pub avg_monthly_rent: f64,
    pub median_monthly_rent: f64,
    pub avg_rent_per_sqft: Option<f64>,
    pub occupancy_rate: f64,
    pub avg_lease_duration_days: Option<f64>,
    pub by_type: BTreeMap<String, TypeRentals>,
    pub rent_correlations: BTreeMap<String, f64>,
    pub analysis_date: DateTime<Utc>,
}

/// Financing assumptions for [`generate_investment_analysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentInputs {
    pub purchase_price: f64,
    pub monthly_rent: f64,
    /// Defaults to 2% of the purchase price.
    pub annual_expenses: Option<f64>,
    pub down_payment_percent: f64,
    pub interest_rate: f64,
    pub loan_term_years: u32,
}

impl InvestmentInputs {
    pub fn new(purchase_price: f64, monthly_rent: f64) -> Self {
        Self {
            purchase_price,
            monthly_rent,
            annual_expenses: None,
            down_payment_percent: 0.20,
            interest_rate: 0.06,
            loan_term_years: 30,
        }
    }

    pub fn annual_expenses(mut self, expenses: f64) -> Self {
        self.annual_expenses = Some(expenses);
        self
    }

    pub fn down_payment_percent(mut self, percent: f64) -> Self {
        self.down_payment_percent = percent;
        self
    }

    pub fn interest_rate(mut self, rate: f64) -> Self {
        self.interest_rate = rate;
        self
    }

    pub fn loan_term_years(mut self, years: u32) -> Self {
        self.loan_term_years = years;
        self
    }

    fn validate(&self) -> DomainResult<()> {
        if !(self.purchase_price.is_finite() && self.purchase_price > 0.0) {
            return Err(DomainError::validation("purchase price must be positive"));
        }
        if !(self.monthly_rent.is_finite() && self.monthly_rent >= 0.0) {
            return Err(DomainError::validation("monthly rent cannot be negative"));
        }
        if self.annual_expenses.is_some_and(|e| !e.is_finite() || e < 0.0) {
            return Err(DomainError::validation("annual expenses cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.down_payment_percent) {
            return Err(DomainError::validation("down payment percent must lie in [0, 1]"));
        }
        if !(self.interest_rate.is_finite() && self.interest_rate >= 0.0) {
            return Err(DomainError::validation("interest rate cannot be negative"));
        }
        if !(1..=MAX_LOAN_TERM_YEARS).contains(&self.loan_term_years) {
            return Err(DomainError::validation(format!(
                "loan term must lie in [1, {MAX_LOAN_TERM_YEARS}] years"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InvestmentGrade {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl InvestmentGrade {
    /// Points for cap rate (up to 3), cash-on-cash return (up to 3) and
    /// annual cash flow (up to 2).
    pub fn score(cap_rate: f64, cash_on_cash_return: f64, annual_cash_flow: f64) -> u32 {
        let cap = match cap_rate {
            r if r >= 0.08 => 3,
            r if r >= 0.06 => 2,
            r if r >= 0.04 => 1,
            _ => 0,
        };
        let coc = match cash_on_cash_return {
            r if r >= 0.12 => 3,
            r if r >= 0.08 => 2,
            r if r >= 0.04 => 1,
            _ => 0,
        };
        let flow = match annual_cash_flow {
            f if f >= 5000.0 => 2,
            f if f >= 0.0 => 1,
            _ => 0,
        };
        cap + coc + flow
    }

    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 7 => InvestmentGrade::Excellent,
            s if s >= 5 => InvestmentGrade::Good,
            s if s >= 3 => InvestmentGrade::Fair,
            _ => InvestmentGrade::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentGrade::Excellent => "Excellent",
            InvestmentGrade::Good => "Good",
            InvestmentGrade::Fair => "Fair",
            InvestmentGrade::Poor => "Poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentAnalysis {
    pub inputs: InvestmentInputs,
    pub down_payment: f64,
    pub loan_amount: f64,
    pub monthly_payment: f64,
    pub annual_rent: f64,
    pub annual_expenses: f64,
    pub annual_mortgage_payments: f64,
    pub annual_cash_flow: f64,
    pub monthly_cash_flow: f64,
    pub cap_rate: f64,
    pub cash_on_cash_return: f64,
    pub gross_rental_yield: f64,
    /// Debt service plus expenses over rent; `None` without rent.
    pub break_even_ratio: Option<f64>,
    pub score: u32,
    pub grade: InvestmentGrade,
}

/// Amortized mortgage, cash flow and return metrics for one property.
pub fn generate_investment_analysis(inputs: &InvestmentInputs) -> DomainResult<InvestmentAnalysis> {
    inputs.validate()?;

    let price = inputs.purchase_price;
    let annual_expenses = inputs.annual_expenses.unwrap_or(price * 0.02);
    let down_payment = price * inputs.down_payment_percent;
    let loan_amount = price - down_payment;

    let monthly_rate = inputs.interest_rate / 12.0;
    let payments = f64::from(inputs.loan_term_years) * 12.0;
    let monthly_payment = if monthly_rate > 0.0 {
        let growth = (1.0 + monthly_rate).powf(payments);
        loan_amount * monthly_rate * growth / (growth - 1.0)
    } else {
        loan_amount / payments
    };

    let annual_rent = inputs.monthly_rent * 12.0;
    let annual_mortgage_payments = monthly_payment * 12.0;
    let annual_cash_flow = annual_rent - annual_mortgage_payments - annual_expenses;

    let cap_rate = (annual_rent - annual_expenses) / price;
    let cash_on_cash_return = if down_payment > 0.0 {
        annual_cash_flow / down_payment
    } else {
        0.0
    };
    let score = InvestmentGrade::score(cap_rate, cash_on_cash_return, annual_cash_flow);

    Ok(InvestmentAnalysis {
        inputs: inputs.clone(),
        down_payment,
        loan_amount,
        monthly_payment,
        annual_rent,
        annual_expenses,
        annual_mortgage_payments,
        annual_cash_flow,
        monthly_cash_flow: annual_cash_flow / 12.0,
        cap_rate,
        cash_on_cash_return,
        gross_rental_yield: annual_rent / price,
        break_even_ratio: (annual_rent > 0.0)
            .then(|| (annual_mortgage_payments + annual_expenses) / annual_rent),
        score,
        grade: InvestmentGrade::from_score(score),
    })
}

/// Runs analyses against one platform source (the local store by default).
///
/// Date windows are measured back from `as_of`, which defaults to today.
pub struct DataAnalyzer {
    platform: Arc<DataPlatform>,
    source: String,
    as_of: NaiveDate,
}

impl DataAnalyzer {
    pub fn new(platform: Arc<DataPlatform>) -> Self {
        Self {
            platform,
            source: DEFAULT_SOURCE.to_string(),
            as_of: Utc::now().date_naive(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    async fn fetch(&self, spec: &QuerySpec) -> PlatformResult<Table> {
        self.platform.query(&self.source, spec).await
    }

    #[instrument(skip(self), err)]
    pub async fn analyze_market_trends(
        &self,
        region: Option<&str>,
        period_days: i64,
    ) -> PlatformResult<Option<MarketTrends>> {
        if period_days <= 0 {
            return Err(DomainError::validation("period must be at least one day").into());
        }

        let cutoff = window_start(self.as_of, period_days)?;
        let mut base = QuerySpec::table("market_data").filter(Filter::gte("date", cutoff));
        if let Some(region) = region {
            base = base.filter(Filter::eq("region", region));
        }

        let data_points = self
            .fetch(&base.clone().aggregate(Aggregation::count()))
            .await?
            .scalar()
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as usize;
        if data_points == 0 {
            return Ok(None);
        }

        // One point per date: the raw row for a single region, the average
        // over regions otherwise.
        let mut series = base.clone().group_by("date");
        for column in MARKET_COLUMNS {
            series = series.aggregate(Aggregation::avg(column).alias(column));
        }
        let series = self.fetch(&series.order_by("date", SortOrder::Asc)).await?;

        let trends = MARKET_COLUMNS
            .iter()
            .filter_map(|column| {
                let values = series.column_f64(column);
                let fit = stats::trend_line(&values)?;
                let (first, last) = (*values.first()?, *values.last()?);
                Some((
                    column.to_string(),
                    ColumnTrend {
                        current_value: last,
                        slope: fit.slope,
                        direction: TrendDirection::of_slope(fit.slope),
                        correlation: fit.r,
                        percentage_change: stats::percent_change(first, last),
                    },
                ))
            })
            .collect();

        let mut regional_summary = BTreeMap::new();
        if region.is_none() {
            let spec = base
                .group_by("region")
                .aggregate(Aggregation::avg("median_price"))
                .aggregate(Aggregation::avg("average_days_on_market"))
                .aggregate(Aggregation::avg("inventory_count"))
                .order_by("region", SortOrder::Asc);
            let table = self.fetch(&spec).await?;
            for row in 0..table.len() {
                let Some(name) = table.get(row, "region").and_then(|v| v.as_str()) else {
                    continue;
                };
                let avg = |col: &str| table.get(row, col).and_then(|v| v.as_f64());
                regional_summary.insert(
                    name.to_string(),
                    RegionSummary {
                        avg_median_price: avg("avg_median_price"),
                        avg_days_on_market: avg("avg_average_days_on_market"),
                        avg_inventory: avg("avg_inventory_count"),
                    },
                );
            }
        }

        debug!(data_points, "market trends analyzed");
        Ok(Some(MarketTrends {
            region: region.map(str::to_string),
            period_days,
            data_points,
            trends,
            regional_summary,
            analysis_date: Utc::now(),
        }))
    }

    #[instrument(skip(self), err)]
    pub async fn analyze_property_performance(
        &self,
        property_type: Option<&str>,
    ) -> PlatformResult<Option<PropertyPerformance>> {
        let mut spec = QuerySpec::table("properties")
            .columns([
                "property_type",
                "bedrooms",
                "bathrooms",
                "square_feet",
                "sale_price",
                "days_on_market",
                "listing_date",
            ])
            .filter(Filter::is_not_null("sale_date"))
            .filter(Filter::is_not_null("sale_price"));
        if let Some(property_type) = property_type {
            spec = spec.filter(Filter::eq("property_type", property_type));
        }
        let sales = SaleRecord::from_table(&self.fetch(&spec).await?);

        let Some(overall) = sales_metrics(&sales) else {
            return Ok(None);
        };

        let mut by_type = BTreeMap::new();
        if property_type.is_none() {
            for (kind, group) in group_by(&sales, |s| s.property_type.clone()) {
                let prices: Vec<f64> = group.iter().map(|s| s.sale_price).collect();
                by_type.insert(
                    kind,
                    TypeSales {
                        count: group.len(),
                        avg_sale_price: stats::mean(&prices).unwrap_or_default(),
                        avg_days_on_market: stats::mean(&days_on_market(&group)),
                        avg_price_per_sqft: stats::mean(&price_per_sqft(&group)),
                    },
                );
            }
        }

        let mut monthly_trends = BTreeMap::new();
        let dated: Vec<&SaleRecord> = sales.iter().filter(|s| s.listing_month.is_some()).collect();
        for (month, group) in group_by(&dated, |s| s.listing_month.unwrap_or_default()) {
            let prices: Vec<f64> = group.iter().map(|s| s.sale_price).collect();
            let days: Vec<f64> = group.iter().filter_map(|s| s.days_on_market).collect();
            monthly_trends.insert(
                month,
                MonthlySales {
                    sales_count: group.len(),
                    avg_sale_price: stats::mean(&prices).unwrap_or_default(),
                    avg_days_on_market: stats::mean(&days),
                },
            );
        }

        let price_correlations = feature_correlations(&sales, |s| Some(s.sale_price));

        Ok(Some(PropertyPerformance {
            property_type: property_type.map(str::to_string),
            total_sales: sales.len(),
            overall,
            by_type,
            price_correlations,
            monthly_trends,
            analysis_date: Utc::now(),
        }))
    }

    /// Price a property from sold comparables of the same type and layout
    /// within 20% of its size.
    #[instrument(skip(self), err)]
    pub async fn analyze_pricing_strategy(
        &self,
        target: &PropertyProfile,
    ) -> PlatformResult<Option<PricingStrategy>> {
        if !(target.square_feet.is_finite() && target.square_feet > 0.0) {
            return Err(DomainError::validation("square footage must be positive").into());
        }

        let spec = QuerySpec::table("properties")
            .columns([
                "property_type",
                "bedrooms",
                "bathrooms",
                "square_feet",
                "sale_price",
                "days_on_market",
                "listing_date",
            ])
            .filter(Filter::is_not_null("sale_date"))
            .filter(Filter::is_not_null("sale_price"))
            .filter(Filter::eq("property_type", target.property_type.as_str()))
            .filter(Filter::eq("bedrooms", target.bedrooms))
            .filter(Filter::eq("bathrooms", target.bathrooms))
            .filter(Filter::gte("square_feet", target.square_feet * (1.0 - COMPARABLE_SQFT_RANGE)))
            .filter(Filter::lte("square_feet", target.square_feet * (1.0 + COMPARABLE_SQFT_RANGE)));
        let comps = SaleRecord::from_table(&self.fetch(&spec).await?);

        let ppsf = price_per_sqft(&comps);
        let (Some(median), Some(mean), Some(q25), Some(q75)) = (
            stats::median(&ppsf),
            stats::mean(&ppsf),
            stats::quantile(&ppsf, 0.25),
            stats::quantile(&ppsf, 0.75),
        ) else {
            return Ok(None);
        };
        let days = days_on_market(&comps);

        Ok(Some(PricingStrategy {
            target: target.clone(),
            comparable_count: comps.len(),
            price_per_sqft_median: median,
            price_per_sqft_mean: mean,
            estimated_market_value: median * target.square_feet,
            conservative_price: q25 * target.square_feet,
            aggressive_price: q75 * target.square_feet,
            avg_days_on_market: stats::mean(&days),
            median_days_on_market: stats::median(&days),
            quick_sale_threshold: stats::quantile(&days, 0.25),
            slow_sale_threshold: stats::quantile(&days, 0.75),
        }))
    }

    #[instrument(skip(self), err)]
    pub async fn analyze_rental_performance(&self) -> PlatformResult<Option<RentalPerformance>> {
        let rentals = self
            .fetch(&QuerySpec::table("rental_properties").columns([
                "property_id",
                "monthly_rent",
                "lease_start",
                "lease_end",
                "occupancy_status",
            ]))
            .await?;
        if rentals.is_empty() {
            return Ok(None);
        }
        let properties = self
            .fetch(&QuerySpec::table("properties").columns([
                "id",
                "property_type",
                "bedrooms",
                "bathrooms",
                "square_feet",
            ]))
            .await?;
        let records = RentalRecord::join(&rentals, &properties);

        let rents: Vec<f64> = records.iter().map(|r| r.monthly_rent).collect();
        let (Some(avg_monthly_rent), Some(median_monthly_rent)) =
            (stats::mean(&rents), stats::median(&rents))
        else {
            return Ok(None);
        };

        let mut by_type = BTreeMap::new();
        for (kind, group) in group_by(&records, |r| r.property_type.clone()) {
            let rents: Vec<f64> = group.iter().map(|r| r.monthly_rent).collect();
            by_type.insert(
                kind,
                TypeRentals {
                    count: group.len(),
                    avg_rent: stats::mean(&rents).unwrap_or_default(),
                    avg_rent_per_sqft: stats::mean(&rent_per_sqft(&group)),
                    occupancy_rate: occupancy_rate(&group),
                },
            );
        }

        let durations: Vec<f64> = records.iter().filter_map(|r| r.lease_days).collect();
        let all: Vec<&RentalRecord> = records.iter().collect();

        Ok(Some(RentalPerformance {
            total_rentals: records.len(),
            avg_monthly_rent,
            median_monthly_rent,
            avg_rent_per_sqft: stats::mean(&rent_per_sqft(&all)),
            occupancy_rate: occupancy_rate(&all),
            avg_lease_duration_days: stats::mean(&durations),
            by_type,
            rent_correlations: feature_correlations(&records, |r| Some(r.monthly_rent)),
            analysis_date: Utc::now(),
        }))
    }

    pub fn generate_investment_analysis(
        &self,
        inputs: &InvestmentInputs,
    ) -> DomainResult<InvestmentAnalysis> {
        generate_investment_analysis(inputs)
    }

    /// Market trends over the last year plus the sales and rental analyses,
    /// summarized.
    pub async fn create_market_report(&self, region: Option<&str>) -> PlatformResult<MarketReport> {
        let market_trends = self.analyze_market_trends(region, 365).await?;
        let property_performance = self.analyze_property_performance(None).await?;
        let rental_performance = self.analyze_rental_performance().await?;
        Ok(MarketReport::new(
            region.map(str::to_string),
            market_trends,
            property_performance,
            rental_performance,
        ))
    }
}

/// Feature lookup shared by sale and rental rows.
trait Features {
    fn feature(&self, name: &str) -> Option<f64>;
}

struct SaleRecord {
    property_type: String,
    bedrooms: Option<f64>,
    bathrooms: Option<f64>,
    square_feet: Option<f64>,
    sale_price: f64,
    days_on_market: Option<f64>,
    listing_month: Option<u32>,
}

impl SaleRecord {
    fn from_table(table: &Table) -> Vec<Self> {
        (0..table.len())
            .filter_map(|row| {
                let num = |col: &str| table.get(row, col).and_then(|v| v.as_f64());
                Some(SaleRecord {
                    property_type: text_or_unknown(table, row, "property_type"),
                    bedrooms: num("bedrooms"),
                    bathrooms: num("bathrooms"),
                    square_feet: num("square_feet"),
                    sale_price: num("sale_price")?,
                    days_on_market: num("days_on_market"),
                    listing_month: table
                        .get(row, "listing_date")
                        .and_then(|v| v.as_str())
                        .and_then(parse_date)
                        .map(|d| d.month()),
                })
            })
            .collect()
    }
}

impl Features for SaleRecord {
    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "bedrooms" => self.bedrooms,
            "bathrooms" => self.bathrooms,
            "square_feet" => self.square_feet,
            _ => None,
        }
    }
}

struct RentalRecord {
    property_type: String,
    bedrooms: Option<f64>,
    bathrooms: Option<f64>,
    square_feet: Option<f64>,
    monthly_rent: f64,
    occupied: bool,
    lease_days: Option<f64>,
}

impl RentalRecord {
    /// Left join of rentals onto properties by `property_id = id`.
    fn join(rentals: &Table, properties: &Table) -> Vec<Self> {
        let by_id: HashMap<i64, usize> = (0..properties.len())
            .filter_map(|row| Some((properties.get(row, "id")?.as_i64()?, row)))
            .collect();

        (0..rentals.len())
            .filter_map(|row| {
                let monthly_rent = rentals.get(row, "monthly_rent")?.as_f64()?;
                let property = rentals
                    .get(row, "property_id")
                    .and_then(|v| v.as_i64())
                    .and_then(|id| by_id.get(&id).copied());
                let prop_num = |col: &str| {
                    property.and_then(|p| properties.get(p, col)).and_then(|v| v.as_f64())
                };
                let date = |col: &str| rentals.get(row, col).and_then(|v| v.as_str()).and_then(parse_date);

                Some(RentalRecord {
                    property_type: property
                        .map(|p| text_or_unknown(properties, p, "property_type"))
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    bedrooms: prop_num("bedrooms"),
                    bathrooms: prop_num("bathrooms"),
                    square_feet: prop_num("square_feet"),
                    monthly_rent,
                    occupied: rentals
                        .get(row, "occupancy_status")
                        .and_then(|v| v.as_str())
                        .is_some_and(|s| s.eq_ignore_ascii_case("occupied")),
                    lease_days: match (date("lease_start"), date("lease_end")) {
                        (Some(start), Some(end)) => Some((end - start).num_days() as f64),
                        _ => None,
                    },
                })
            })
            .collect()
    }
}

impl Features for RentalRecord {
    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "bedrooms" => self.bedrooms,
            "bathrooms" => self.bathrooms,
            "square_feet" => self.square_feet,
            _ => None,
        }
    }
}

const UNKNOWN: &str = "Unknown";

fn text_or_unknown(table: &Table, row: usize, column: &str) -> String {
    table
        .get(row, column)
        .and_then(|v| v.as_str())
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok()
}

/// Groups in key order.
fn group_by<'a, T: 'a, K: Ord>(
    items: impl IntoIterator<Item = &'a T>,
    key: impl Fn(&T) -> K,
) -> BTreeMap<K, Vec<&'a T>> {
    let mut groups: BTreeMap<K, Vec<&T>> = BTreeMap::new();
    for item in items {
        groups.entry(key(item)).or_default().push(item);
    }
    groups
}

fn sales_metrics(sales: &[SaleRecord]) -> Option<SalesMetrics> {
    let prices: Vec<f64> = sales.iter().map(|s| s.sale_price).collect();
    let days = days_on_market(sales);
    Some(SalesMetrics {
        avg_sale_price: stats::mean(&prices)?,
        median_sale_price: stats::median(&prices)?,
        avg_days_on_market: stats::mean(&days),
        median_days_on_market: stats::median(&days),
        price_variance: stats::variance(&prices),
        avg_price_per_sqft: stats::mean(&price_per_sqft(sales)),
    })
}

fn days_on_market<S: Borrow<SaleRecord>>(sales: &[S]) -> Vec<f64> {
    sales.iter().filter_map(|s| s.borrow().days_on_market).collect()
}

fn price_per_sqft<S: Borrow<SaleRecord>>(sales: &[S]) -> Vec<f64> {
    sales
        .iter()
        .map(|s| s.borrow())
        .filter_map(|s| s.square_feet.filter(|sqft| *sqft > 0.0).map(|sqft| s.sale_price / sqft))
        .collect()
}

fn rent_per_sqft(rentals: &[&RentalRecord]) -> Vec<f64> {
    rentals
        .iter()
        .filter_map(|r| r.square_feet.filter(|sqft| *sqft > 0.0).map(|sqft| r.monthly_rent / sqft))
        .collect()
}

fn occupancy_rate(rentals: &[&RentalRecord]) -> f64 {
    if rentals.is_empty() {
        return 0.0;
    }
    rentals.iter().filter(|r| r.occupied).count() as f64 / rentals.len() as f64
}

/// Pearson correlation of each price feature with `target`, over rows where
/// both are present. Undefined correlations are omitted.
fn feature_correlations<T: Features>(
    rows: &[T],
    target: impl Fn(&T) -> Option<f64>,
) -> BTreeMap<String, f64> {
    PRICE_FEATURES
        .iter()
        .filter_map(|feature| {
            let (x, y): (Vec<f64>, Vec<f64>) = rows
                .iter()
                .filter_map(|row| Some((row.feature(feature)?, target(row)?)))
                .unzip();
            stats::pearson(&x, &y).map(|r| (feature.to_string(), r))
        })
        .collect()
}

/// First date (inclusive, `%Y-%m-%d`) of a trailing window of `days` ending
/// at `as_of`.
pub(crate) fn window_start(as_of: NaiveDate, days: i64) -> DomainResult<String> {
    Duration::try_days(days)
        .and_then(|span| as_of.checked_sub_signed(span))
        .map(|start| start.format("%Y-%m-%d").to_string())
        .ok_or_else(|| DomainError::validation(format!("a {days}-day window is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mortgage_and_grade_for_a_typical_rental() {
        let analysis =
            generate_investment_analysis(&InvestmentInputs::new(300_000.0, 2_500.0)).unwrap();

        assert!((analysis.down_payment - 60_000.0).abs() < 1e-9);
        assert!((analysis.loan_amount - 240_000.0).abs() < 1e-9);
        // 240k over 30 years at 6%.
        assert!((analysis.monthly_payment - 1438.92).abs() < 0.01);
        assert!((analysis.cap_rate - 0.08).abs() < 1e-9);
        // 30,000 rent - 6,000 expenses - 17,267 mortgage.
        assert!((analysis.annual_cash_flow - 6_732.96).abs() < 0.5);
        assert!((analysis.cash_on_cash_return - 0.1122).abs() < 1e-3);
        // cap 3 + cash-on-cash 2 + cash flow 2.
        assert_eq!(analysis.score, 7);
        assert_eq!(analysis.grade, InvestmentGrade::Excellent);
    }

    #[test]
    fn thin_cash_flow_grades_fair() {
        let analysis =
            generate_investment_analysis(&InvestmentInputs::new(300_000.0, 2_000.0)).unwrap();

        assert!((analysis.cap_rate - 0.06).abs() < 1e-9);
        assert!(analysis.annual_cash_flow > 0.0 && analysis.annual_cash_flow < 5_000.0);
        assert!(analysis.cash_on_cash_return < 0.04);
        // cap 2 + cash-on-cash 0 + cash flow 1.
        assert_eq!(analysis.score, 3);
        assert_eq!(analysis.grade, InvestmentGrade::Fair);
    }

    #[test]
    fn loan_term_outside_range_is_rejected() {
        let err = generate_investment_analysis(
            &InvestmentInputs::new(300_000.0, 2_500.0).loan_term_years(u32::MAX),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(
            generate_investment_analysis(
                &InvestmentInputs::new(300_000.0, 2_500.0).loan_term_years(MAX_LOAN_TERM_YEARS)
            )
            .is_ok()
        );
    }

    #[test]
    fn window_start_rejects_spans_past_the_calendar() {
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        assert_eq!(window_start(as_of, 30).unwrap(), "2026-05-31");
        assert!(matches!(window_start(as_of, 10_000_000_000), Err(DomainError::Validation(_))));
        assert!(window_start(as_of, i64::MAX).is_err());
    }

    #[test]
    fn zero_interest_divides_evenly() {
        let analysis = generate_investment_analysis(
            &InvestmentInputs::new(120_000.0, 0.0)
                .interest_rate(0.0)
                .down_payment_percent(0.0)
                .loan_term_years(10),
        )
        .unwrap();
        assert!((analysis.monthly_payment - 1_000.0).abs() < 1e-9);
        assert_eq!(analysis.cash_on_cash_return, 0.0);
        assert_eq!(analysis.break_even_ratio, None);
        assert_eq!(analysis.grade, InvestmentGrade::Poor);
    }

    #[test]
    fn bad_inputs_are_rejected() {
        assert!(generate_investment_analysis(&InvestmentInputs::new(0.0, 1_000.0)).is_err());
        assert!(
            generate_investment_analysis(
                &InvestmentInputs::new(100_000.0, 1_000.0).down_payment_percent(1.5)
            )
            .is_err()
        );
    }

    #[test]
    fn grade_boundaries() {
        assert_eq!(InvestmentGrade::score(0.08, 0.12, 5_000.0), 8);
        assert_eq!(InvestmentGrade::from_score(7), InvestmentGrade::Excellent);
        assert_eq!(InvestmentGrade::from_score(5), InvestmentGrade::Good);
        assert_eq!(InvestmentGrade::from_score(3), InvestmentGrade::Fair);
        assert_eq!(InvestmentGrade::from_score(2), InvestmentGrade::Poor);
        assert_eq!(InvestmentGrade::score(0.039, 0.039, -1.0), 0);
    }

    #[test]
    fn rentals_left_join_properties() {
        let rentals = Table::with_rows(
            vec!["property_id".into(), "monthly_rent".into(), "lease_start".into(), "lease_end".into(), "occupancy_status".into()],
            vec![
                vec![1.into(), 2_000.0.into(), "2026-01-01".into(), "2026-12-27".into(), "Occupied".into()],
                vec![9.into(), 1_500.0.into(), "2026-01-01".into(), realty_platform::CellValue::Null, "Vacant".into()],
            ],
        );
        let properties = Table::with_rows(
            vec!["id".into(), "property_type".into(), "bedrooms".into(), "bathrooms".into(), "square_feet".into()],
            vec![vec![1.into(), "Condo".into(), 2.into(), 1.into(), 1_000.0.into()]],
        );

        let records = RentalRecord::join(&rentals, &properties);
        assert_eq!(records[0].property_type, "Condo");
        assert_eq!(records[0].lease_days, Some(360.0));
        assert_eq!(records[1].property_type, UNKNOWN);
        assert_eq!(records[1].lease_days, None);

        let all: Vec<&RentalRecord> = records.iter().collect();
        assert_eq!(occupancy_rate(&all), 0.5);
        assert_eq!(rent_per_sqft(&all), vec![2.0]);
    }
}
