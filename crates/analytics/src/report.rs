//! Market report assembly and its markdown rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::{MarketTrends, PropertyPerformance, RentalPerformance, TrendDirection};

/// Average days on market under which the market counts as hot.
pub const HOT_MARKET_DAYS: f64 = 30.0;
/// Average days on market above which listings count as slow.
pub const SLOW_MARKET_DAYS: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketOutlook {
    Bullish,
    Bearish,
    Neutral,
}

impl MarketOutlook {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketOutlook::Bullish => "bullish",
            MarketOutlook::Bearish => "bearish",
            MarketOutlook::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub market_outlook: MarketOutlook,
}

impl ExecutiveSummary {
    pub fn from_analyses(
        trends: Option<&MarketTrends>,
        performance: Option<&PropertyPerformance>,
    ) -> Self {
        let mut key_findings = Vec::new();
        let mut recommendations = Vec::new();
        let mut market_outlook = MarketOutlook::Neutral;

        let price_direction = trends
            .and_then(|t| t.trends.get("median_price"))
            .map(|trend| trend.direction);
        match price_direction {
            Some(TrendDirection::Increasing) => {
                key_findings.push("Property prices are trending upward".to_string());
                market_outlook = MarketOutlook::Bullish;
            }
            Some(TrendDirection::Decreasing) => {
                key_findings.push("Property prices are declining".to_string());
                market_outlook = MarketOutlook::Bearish;
            }
            _ => {}
        }

        if let Some(days) = performance.and_then(|p| p.overall.avg_days_on_market) {
            if days < HOT_MARKET_DAYS {
                key_findings.push("Properties are selling quickly (hot market)".to_string());
                recommendations.push("Consider pricing competitively for quick sales".to_string());
            } else if days > SLOW_MARKET_DAYS {
                key_findings.push("Properties are taking longer to sell".to_string());
                recommendations.push("Review pricing strategy and marketing approach".to_string());
            }
        }

        recommendations.extend(
            [
                "Monitor market trends regularly",
                "Adjust pricing strategies based on market conditions",
                "Focus on properties with strong fundamentals",
            ]
            .map(String::from),
        );

        Self {
            key_findings,
            recommendations,
            market_outlook,
        }
    }
}

/// Analyses bundled for one region (or the whole market) at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketReport {
    pub region: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub market_trends: Option<MarketTrends>,
    pub property_performance: Option<PropertyPerformance>,
    pub rental_performance: Option<RentalPerformance>,
    pub executive_summary: ExecutiveSummary,
}

impl MarketReport {
    pub fn new(
        region: Option<String>,
        market_trends: Option<MarketTrends>,
        property_performance: Option<PropertyPerformance>,
        rental_performance: Option<RentalPerformance>,
    ) -> Self {
        let executive_summary = ExecutiveSummary::from_analyses(
            market_trends.as_ref(),
            property_performance.as_ref(),
        );
        Self {
            region,
            generated_at: Utc::now(),
            market_trends,
            property_performance,
            rental_performance,
            executive_summary,
        }
    }

    pub fn region_label(&self) -> &str {
        self.region.as_deref().unwrap_or("All Regions")
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "# Market Report: {}", self.region_label());
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Generated {}",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        let _ = writeln!(output);

        let summary = &self.executive_summary;
        let _ = writeln!(output, "## Executive Summary");
        let _ = writeln!(output);
        let _ = writeln!(output, "**Outlook:** {}", summary.market_outlook.as_str());
        let _ = writeln!(output);
        if !summary.key_findings.is_empty() {
            let _ = writeln!(output, "### Key Findings");
            for finding in &summary.key_findings {
                let _ = writeln!(output, "- {finding}");
            }
            let _ = writeln!(output);
        }
        let _ = writeln!(output, "### Recommendations");
        for recommendation in &summary.recommendations {
            let _ = writeln!(output, "- {recommendation}");
        }
        let _ = writeln!(output);

        let _ = writeln!(output, "## Market Trends");
        let _ = writeln!(output);
        match &self.market_trends {
            Some(trends) => {
                let _ = writeln!(
                    output,
                    "{} observations over the last {} days.",
                    trends.data_points, trends.period_days
                );
                let _ = writeln!(output);
                let _ = writeln!(output, "| Metric | Current | Direction | Change |");
                let _ = writeln!(output, "|--------|---------|-----------|--------|");
                for (metric, trend) in &trends.trends {
                    let change = trend
                        .percentage_change
                        .map(|c| format!("{c:+.1}%"))
                        .unwrap_or_else(|| "-".to_string());
                    let _ = writeln!(
                        output,
                        "| {metric} | {:.2} | {:?} | {change} |",
                        trend.current_value, trend.direction
                    );
                }
                if !trends.regional_summary.is_empty() {
                    let _ = writeln!(output);
                    let _ = writeln!(output, "| Region | Avg Median Price | Avg Days on Market | Avg Inventory |");
                    let _ = writeln!(output, "|--------|------------------|--------------------|---------------|");
                    for (region, summary) in &trends.regional_summary {
                        let _ = writeln!(
                            output,
                            "| {region} | {} | {} | {} |",
                            number(summary.avg_median_price, 0),
                            number(summary.avg_days_on_market, 1),
                            number(summary.avg_inventory, 1)
                        );
                    }
                }
            }
            None => {
                let _ = writeln!(output, "No market data in range.");
            }
        }
        let _ = writeln!(output);

        let _ = writeln!(output, "## Sales Performance");
        let _ = writeln!(output);
        match &self.property_performance {
            Some(perf) => {
                let overall = &perf.overall;
                let _ = writeln!(output, "- Total sales: {}", perf.total_sales);
                let _ = writeln!(output, "- Average sale price: ${:.0}", overall.avg_sale_price);
                let _ = writeln!(output, "- Median sale price: ${:.0}", overall.median_sale_price);
                let _ = writeln!(
                    output,
                    "- Average days on market: {}",
                    number(overall.avg_days_on_market, 1)
                );
                let _ = writeln!(
                    output,
                    "- Average price per sqft: ${}",
                    number(overall.avg_price_per_sqft, 2)
                );
            }
            None => {
                let _ = writeln!(output, "No sales recorded.");
            }
        }
        let _ = writeln!(output);

        let _ = writeln!(output, "## Rental Performance");
        let _ = writeln!(output);
        match &self.rental_performance {
            Some(rentals) => {
                let _ = writeln!(output, "- Rentals tracked: {}", rentals.total_rentals);
                let _ = writeln!(output, "- Average monthly rent: ${:.0}", rentals.avg_monthly_rent);
                let _ = writeln!(
                    output,
                    "- Occupancy rate: {:.1}%",
                    rentals.occupancy_rate * 100.0
                );
                let _ = writeln!(
                    output,
                    "- Average lease length: {} days",
                    number(rentals.avg_lease_duration_days, 0)
                );
            }
            None => {
                let _ = writeln!(output, "No rentals recorded.");
            }
        }

        output
    }
}

fn number(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "-".to_string(),
    }
}
