use std::sync::Arc;

use chrono::NaiveDate;
use realty_core::DomainError;
use realty_platform::{
    Aggregation, CellValue, Connector, DEFAULT_SOURCE, DataPlatform, DataSource, Filter,
    PlatformConfig, PlatformError, PlatformResult, QuerySpec, SampleDataGenerator, SortOrder,
    SourceKind, Table,
};

async fn platform() -> DataPlatform {
    DataPlatform::open_in_memory()
        .await
        .expect("in-memory platform should open")
}

async fn seeded_platform() -> DataPlatform {
    let platform = platform().await;
    let as_of = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
    platform
        .create_sample_data_with(SampleDataGenerator::seeded(11, as_of))
        .await
        .expect("sample data should load");
    platform
}

/// Serves one fixed table regardless of the requested name.
struct FixedConnector(Table);

impl Connector for FixedConnector {
    fn fetch(&self, _source: &DataSource, _table: &str) -> PlatformResult<Table> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn default_source_is_registered_at_open() {
    let platform = platform().await;
    let status = platform.status();
    assert_eq!(status.total_sources, 1);
    assert_eq!(status.active_sources, 1);
    assert_eq!(status.sources[0].name(), DEFAULT_SOURCE);
    assert!(status.tables.contains(&"experiment_results"));
}

#[tokio::test]
async fn duplicate_source_is_a_conflict() {
    let platform = platform().await;
    platform
        .add_data_source("mls_feed", SourceKind::Api, "https://mls.example/v1")
        .unwrap();
    let err = platform
        .add_data_source("mls_feed", SourceKind::File, "/tmp/other.csv")
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(platform.catalog().len(), 2);
}

#[tokio::test]
async fn unknown_and_removed_sources_are_not_found() {
    let platform = platform().await;
    let spec = QuerySpec::table("properties");

    let err = platform.query("nowhere", &spec).await.unwrap_err();
    assert!(err.is_not_found());

    platform
        .add_data_source("archive", SourceKind::File, "/var/data/archive")
        .unwrap();
    platform.remove_data_source("archive").unwrap();
    let err = platform.query("archive", &spec).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!platform.data_source("archive").unwrap().is_active());

    assert!(platform.remove_data_source("ghost").unwrap_err().is_not_found());
}

#[tokio::test]
async fn sample_data_has_fixed_row_counts() {
    let platform = seeded_platform().await;
    let count = |table: &str| QuerySpec::table(table).aggregate(Aggregation::count());

    for (table, expected) in [
        ("properties", 100),
        ("transactions", 150),
        ("rental_properties", 60),
        ("market_data", 208),
    ] {
        let result = platform.query(DEFAULT_SOURCE, &count(table)).await.unwrap();
        assert_eq!(result.scalar(), Some(&CellValue::Integer(expected)), "{table}");
    }

    // Reseeding replaces rather than appends.
    platform.create_sample_data().await.unwrap();
    let result = platform.query(DEFAULT_SOURCE, &count("properties")).await.unwrap();
    assert_eq!(result.scalar(), Some(&CellValue::Integer(100)));
    assert!(platform.data_source(DEFAULT_SOURCE).unwrap().last_queried_at().is_some());
}

#[tokio::test]
async fn failed_table_replacement_leaves_every_table_untouched() {
    let platform = seeded_platform().await;
    let count = |table: &str| QuerySpec::table(table).aggregate(Aggregation::count());
    let before = platform.query(DEFAULT_SOURCE, &count("properties")).await.unwrap();

    let emptied = Table::new(vec!["id".to_string()]);
    let err = platform
        .store()
        .replace_tables(&[("properties", &emptied), ("no_such_table", &emptied)])
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Storage(_)));

    let after = platform.query(DEFAULT_SOURCE, &count("properties")).await.unwrap();
    assert_eq!(before, after);
    assert!(before.scalar_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn aggregates_over_empty_tables_are_null() {
    let platform = platform().await;
    let spec = QuerySpec::table("properties")
        .aggregate(Aggregation::avg("days_on_market"))
        .aggregate(Aggregation::count());
    let result = platform.query(DEFAULT_SOURCE, &spec).await.unwrap();
    assert_eq!(result.columns, vec!["avg_days_on_market", "count"]);
    assert_eq!(result.rows, vec![vec![CellValue::Null, CellValue::Integer(0)]]);
}

#[tokio::test]
async fn invalid_identifiers_never_reach_sqlite() {
    let platform = platform().await;
    let spec = QuerySpec::table("properties").filter(Filter::eq("1=1 OR id", 1));
    let err = platform.query(DEFAULT_SOURCE, &spec).await.unwrap_err();
    assert!(matches!(err, PlatformError::Domain(DomainError::Validation(_))));
}

#[tokio::test]
async fn connector_sources_match_sql_semantics() {
    let platform = seeded_platform().await;
    let spec = QuerySpec::table("market_data")
        .filter(Filter::gt("inventory_count", 100))
        .group_by("region")
        .aggregate(Aggregation::count())
        .aggregate(Aggregation::max("median_price"))
        .order_by("region", SortOrder::Asc);

    let from_sql = platform.query(DEFAULT_SOURCE, &spec).await.unwrap();

    let everything = platform
        .query(
            DEFAULT_SOURCE,
            &QuerySpec::table("market_data").columns(["region", "median_price", "inventory_count"]),
        )
        .await
        .unwrap();
    platform.register_connector(SourceKind::Api, Arc::new(FixedConnector(everything)));
    platform
        .add_data_source("market_api", SourceKind::Api, "https://market.example")
        .unwrap();
    let from_connector = platform.query("market_api", &spec).await.unwrap();

    assert_eq!(from_sql, from_connector);
    assert_eq!(from_sql.len(), 4);
}

#[tokio::test]
async fn csv_file_sources_are_queryable() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("listings.csv"),
        "region,price,beds\nDowntown,400000,2\nDowntown,500000,3\nSuburbs,,4\n",
    )
    .unwrap();

    let platform = platform().await;
    platform
        .add_data_source(
            "exports",
            SourceKind::File,
            dir.path().to_string_lossy().to_string(),
        )
        .unwrap();

    let spec = QuerySpec::table("listings")
        .filter(Filter::eq("region", "Downtown"))
        .aggregate(Aggregation::avg("price"))
        .aggregate(Aggregation::sum("beds"));
    let result = platform.query("exports", &spec).await.unwrap();
    assert_eq!(
        result.rows,
        vec![vec![CellValue::Real(450_000.0), CellValue::Integer(5)]]
    );
}

#[tokio::test]
async fn api_sources_without_connector_fail_cleanly() {
    let platform = platform().await;
    platform
        .add_data_source("crm", SourceKind::Api, "https://crm.example")
        .unwrap();
    let err = platform
        .query("crm", &QuerySpec::table("contacts"))
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Connector(_)));
}

#[tokio::test]
async fn short_connector_rows_are_rejected() {
    let platform = platform().await;
    let ragged = Table::with_rows(
        vec!["a".to_string(), "b".to_string()],
        vec![vec![CellValue::Integer(1)]],
    );
    platform.register_connector(SourceKind::Api, Arc::new(FixedConnector(ragged)));
    platform
        .add_data_source("feed", SourceKind::Api, "https://feed.example")
        .unwrap();

    let projected = platform
        .query("feed", &QuerySpec::table("t").columns(["b"]))
        .await
        .unwrap_err();
    assert!(matches!(projected, PlatformError::Domain(DomainError::Validation(_))));

    let grouped = platform
        .query(
            "feed",
            &QuerySpec::table("t").group_by("b").aggregate(Aggregation::count()),
        )
        .await
        .unwrap_err();
    assert!(matches!(grouped, PlatformError::Domain(DomainError::Validation(_))));
}

#[tokio::test]
async fn file_backed_store_creates_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("analytics.db");
    let config = PlatformConfig {
        database_url: format!("sqlite://{}?mode=rwc", db.display()),
        ..PlatformConfig::default()
    };

    let platform = DataPlatform::open(config).await.unwrap();
    platform
        .insert_rows(
            "kpi_tracking",
            &["kpi_name".to_string(), "kpi_value".to_string()],
            &[vec!["Occupancy Rate".into(), 0.91.into()]],
        )
        .await
        .unwrap();
    platform.close().await;
    assert!(db.exists());
}
