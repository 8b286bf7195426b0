use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use realty_analytics::{
    DashboardBuilder, DashboardView, DataAnalyzer, ExperimentArchive, InvestmentInputs,
    KpiManager, generate_investment_analysis,
};
use realty_engagements::{
    AnalyticsExperience, Client, ContactInfo, Engagements, ServiceProvider, ServiceType,
};
use realty_experiments::{ABTestManager, ExperimentConfig};
use realty_platform::{
    Aggregation, CellValue, DEFAULT_SOURCE, DataPlatform, PlatformConfig, QuerySpec,
};

#[derive(Parser)]
#[command(name = "realty-demo")]
#[command(about = "Real estate analytics toolkit demo", long_about = None)]
struct Cli {
    /// sqlite URL of the local store (overrides REALTY_DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Use a throwaway in-memory store
    #[arg(long, global = true, conflicts_with = "database_url")]
    in_memory: bool,
    /// Seed for sample data and simulated traffic (overrides REALTY_SAMPLE_SEED)
    #[arg(long, global = true)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every component end to end
    Walkthrough,
    /// Replace the sample tables with generated rows
    Seed,
    /// Recalculate the standard KPIs
    Kpis {
        /// Print the full JSON export instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown market report
    Report {
        #[arg(long)]
        region: Option<String>,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Simulate an A/B test from a template and archive its results
    Experiment {
        #[arg(long, default_value = "pricing_strategy")]
        template: String,
        #[arg(long, default_value_t = 500)]
        visitors: u32,
    },
    /// Print a dashboard snapshot as JSON
    Dashboard {
        /// executive, property or rental
        #[arg(default_value = "executive")]
        view: DashboardView,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    realty_observability::init();
    let cli = Cli::parse();

    let mut config = PlatformConfig::from_env().context("invalid platform configuration")?;
    if cli.in_memory {
        config = PlatformConfig {
            sample_seed: config.sample_seed,
            ..PlatformConfig::in_memory()
        };
    }
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(seed) = cli.seed {
        config.sample_seed = Some(seed);
    }

    let platform = Arc::new(
        DataPlatform::open(config)
            .await
            .context("failed to open the data platform")?,
    );

    let outcome = match cli.command.unwrap_or(Commands::Walkthrough) {
        Commands::Walkthrough => walkthrough(&platform).await,
        Commands::Seed => seed(&platform).await,
        Commands::Kpis { json } => kpis(&platform, json).await,
        Commands::Report { region, out } => report(&platform, region.as_deref(), out).await,
        Commands::Experiment { template, visitors } => {
            experiment(&platform, &template, visitors).await
        }
        Commands::Dashboard { view } => dashboard(&platform, view).await,
    };

    platform.close().await;
    outcome
}

async fn seed(platform: &DataPlatform) -> anyhow::Result<()> {
    let data = platform
        .create_sample_data()
        .await
        .context("failed to create sample data")?;
    for (table, rows) in data.row_counts() {
        println!("{table:<18} {rows:>4} rows");
    }
    Ok(())
}

/// Seed the store on first use so analyses have something to read.
async fn ensure_sample_data(platform: &DataPlatform) -> anyhow::Result<()> {
    let existing = platform
        .query(
            DEFAULT_SOURCE,
            &QuerySpec::table("properties").aggregate(Aggregation::count()),
        )
        .await
        .context("failed to count properties")?;
    if existing.scalar() == Some(&CellValue::Integer(0)) {
        info!("store is empty; generating sample data");
        platform
            .create_sample_data()
            .await
            .context("failed to create sample data")?;
    }
    Ok(())
}

async fn kpis(platform: &Arc<DataPlatform>, json: bool) -> anyhow::Result<()> {
    ensure_sample_data(platform).await?;
    let mut manager = KpiManager::with_default_kpis(Arc::clone(platform));
    manager.calculate_all_kpis().await;

    if json {
        println!("{}", manager.export_kpi_data().context("failed to export KPIs")?);
        return Ok(());
    }

    let dashboard = manager.get_kpi_dashboard();
    println!("{:<26} {:>14} {:>12}  {:<6} Status", "KPI", "Current", "Target", "Trend");
    for kpi in &dashboard.kpis {
        let current = kpi
            .current_value
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "n/a".to_string());
        let target = kpi
            .target
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:>14} {:>12}  {:<6} {:?}",
            kpi.name,
            format!("{current} {}", kpi.unit),
            target,
            format!("{:?}", kpi.trend),
            kpi.performance_status
        );
    }
    Ok(())
}

async fn report(
    platform: &Arc<DataPlatform>,
    region: Option<&str>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    ensure_sample_data(platform).await?;
    let analyzer = DataAnalyzer::new(Arc::clone(platform));
    let report = analyzer
        .create_market_report(region)
        .await
        .context("failed to build the market report")?;
    let markdown = report.to_markdown();

    match out {
        Some(path) => {
            std::fs::write(&path, &markdown)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{markdown}"),
    }
    Ok(())
}

async fn experiment(
    platform: &Arc<DataPlatform>,
    template: &str,
    visitors: u32,
) -> anyhow::Result<()> {
    let config = ExperimentConfig::from_env().context("invalid experiment configuration")?;
    let mut manager = ABTestManager::new(config);
    let id = manager
        .create_test_from_template(template, None, "The treatment converts better than control")
        .with_context(|| format!("failed to create experiment from '{template}'"))?;
    manager.start_test(id)?;

    let mut rng = match platform.config().sample_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let labels: Vec<String> = manager
        .experiment(id)?
        .variants()
        .iter()
        .map(|v| v.label().to_string())
        .collect();
    // Later variants convert a little better so the demo has a story.
    for _ in 0..visitors {
        for (i, label) in labels.iter().enumerate() {
            let rate = 0.10 + 0.04 * i as f64;
            let converted = rng.gen_bool(rate);
            let value = if converted {
                rng.gen_range(250_000.0..650_000.0)
            } else {
                0.0
            };
            manager.add_data_point(id, label, converted, value)?;
        }
    }
    manager.complete_test(id)?;

    let results = manager
        .get_current_results(id)?
        .context("experiment recorded no visitors")?;
    for variant in &results.variants {
        let significance = variant
            .comparison
            .as_ref()
            .map(|c| {
                format!(
                    "lift {} p={:.4}{}",
                    c.relative_lift
                        .map(|l| format!("{:+.1}%", l * 100.0))
                        .unwrap_or_else(|| "n/a".to_string()),
                    c.p_value,
                    if c.significant { " (significant)" } else { "" }
                )
            })
            .unwrap_or_else(|| "control".to_string());
        println!(
            "{:<22} {:>5}/{:<5} {:>6.2}%  {significance}",
            variant.label,
            variant.conversions,
            variant.visitors,
            variant.conversion_rate * 100.0
        );
    }

    let archive = ExperimentArchive::new(Arc::clone(platform));
    let rows = archive
        .save(&results)
        .await
        .context("failed to archive experiment results")?;
    println!("Archived {rows} result rows for experiment {id}.");
    Ok(())
}

async fn dashboard(platform: &Arc<DataPlatform>, view: DashboardView) -> anyhow::Result<()> {
    ensure_sample_data(platform).await?;
    let mut kpis = KpiManager::with_default_kpis(Arc::clone(platform));
    kpis.calculate_all_kpis().await;

    let snapshot = DashboardBuilder::new(Arc::clone(platform))
        .snapshot(view, &kpis.get_kpi_dashboard())
        .await
        .with_context(|| format!("failed to build the {view} dashboard"))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?
    );
    Ok(())
}

async fn walkthrough(platform: &Arc<DataPlatform>) -> anyhow::Result<()> {
    println!("== Engagements");
    let mut engagements = Engagements::new();
    let client = Client::new("Harbor Realty Group", "Seattle, WA")?
        .with_company("Harbor Realty Group LLC")
        .with_contact(ContactInfo {
            email: Some("ops@harborrealty.example".into()),
            phone: None,
        })
        .with_experience(AnalyticsExperience::Intermediate);
    let client_id = engagements.add_client(client)?;
    let provider = ServiceProvider::builder("Dana Whitfield", "Lead Analyst", "Northwind Analytics")
        .experience_years(9)
        .service(ServiceType::KpiIdentification)
        .service(ServiceType::DashboardCreation)
        .hourly_rate(165.0)
        .build()?;
    let provider_id = engagements.add_provider(provider)?;

    let request_id = engagements.create_request(
        client_id,
        ServiceType::KpiIdentification,
        "Portfolio KPI baseline",
    )?;
    engagements.assign_provider(request_id, provider_id)?;
    engagements.update_progress(request_id, 40, "Data sources inventoried")?;
    engagements.update_progress(request_id, 100, "KPI set delivered")?;
    let summary = engagements.request_summary(request_id, Utc::now())?;
    println!(
        "{} for {} by {}: {:?} ({}%)",
        summary.title,
        summary.client_name,
        summary.provider_name.as_deref().unwrap_or("unassigned"),
        summary.status,
        summary.progress
    );

    println!("\n== Sample data");
    seed(platform).await?;

    println!("\n== KPIs");
    kpis(platform, false).await?;

    println!("\n== Market");
    let analyzer = DataAnalyzer::new(Arc::clone(platform));
    let report = analyzer.create_market_report(None).await?;
    println!("Outlook: {}", report.executive_summary.market_outlook.as_str());
    for finding in &report.executive_summary.key_findings {
        println!("- {finding}");
    }
    if let Some(rentals) = &report.rental_performance {
        println!(
            "Rentals: {} tracked, {:.0}% occupied, ${:.0} average rent",
            rentals.total_rentals,
            rentals.occupancy_rate * 100.0,
            rentals.avg_monthly_rent
        );
    }

    let investment = generate_investment_analysis(&InvestmentInputs::new(420_000.0, 3_100.0))?;
    println!(
        "Investment at $420k / $3,100 rent: cap {:.2}%, cash-on-cash {:.2}%, grade {}",
        investment.cap_rate * 100.0,
        investment.cash_on_cash_return * 100.0,
        investment.grade.as_str()
    );

    println!("\n== Experiment");
    experiment(platform, "listing_photos", 400).await?;

    println!("\n== Dashboards");
    let mut kpi_manager = KpiManager::with_default_kpis(Arc::clone(platform));
    kpi_manager.calculate_all_kpis().await;
    let kpi_dashboard = kpi_manager.get_kpi_dashboard();
    let builder = DashboardBuilder::new(Arc::clone(platform));
    for view in DashboardView::ALL {
        let snapshot = builder.snapshot(view, &kpi_dashboard).await?;
        let populated = snapshot.charts.iter().filter(|c| !c.is_empty()).count();
        println!(
            "{:<32} {} metrics, {populated}/{} charts with data",
            snapshot.title,
            snapshot.metrics.len(),
            snapshot.charts.len()
        );
    }

    info!("walkthrough finished");
    Ok(())
}
