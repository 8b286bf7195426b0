//! `realty-analytics`: KPIs, market analyses, reports and dashboard
//! snapshots computed over a shared [`realty_platform::DataPlatform`].
//!
//! Every component takes the platform as an `Arc` at construction; none of
//! them reaches for global state.

pub mod analyzer;
pub mod archive;
pub mod dashboard;
pub mod kpi;
pub mod report;
pub mod stats;

pub use analyzer::{
    ColumnTrend, DataAnalyzer, InvestmentAnalysis, InvestmentGrade, InvestmentInputs,
    MarketTrends, PricingStrategy, PropertyPerformance, PropertyProfile, RentalPerformance,
    TrendDirection, generate_investment_analysis,
};
pub use archive::ExperimentArchive;
pub use dashboard::{
    ChartKind, ChartPoint, ChartSpec, DashboardBuilder, DashboardSnapshot, DashboardView,
    MetricCard, Series,
};
pub use kpi::{
    KPI_HISTORY_LIMIT, Kpi, KpiCategory, KpiDashboard, KpiDefinition, KpiExpr, KpiManager,
    KpiQuery, KpiSample, KpiSnapshot, PerformanceStatus, Trend, default_kpis,
};
pub use report::{ExecutiveSummary, MarketOutlook, MarketReport};
