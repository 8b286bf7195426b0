//! Persists experiment result summaries into the local store.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use realty_experiments::{ExperimentId, ExperimentResults};
use realty_platform::{
    Aggregation, CellValue, DEFAULT_SOURCE, DataPlatform, Filter, PlatformResult, QuerySpec,
    SortOrder, Table,
};

const TABLE: &str = "experiment_results";

const COLUMNS: [&str; 13] = [
    "experiment_id",
    "experiment_name",
    "status",
    "confidence_level",
    "variant",
    "is_control",
    "visitors",
    "conversions",
    "conversion_rate",
    "average_value",
    "relative_lift",
    "p_value",
    "significant",
];

pub struct ExperimentArchive {
    platform: Arc<DataPlatform>,
}

impl ExperimentArchive {
    pub fn new(platform: Arc<DataPlatform>) -> Self {
        Self { platform }
    }

    /// Writes one row per variant. Saving the same experiment again appends
    /// a newer snapshot; rows carry their own `recorded_at`.
    pub async fn save(&self, results: &ExperimentResults) -> PlatformResult<u64> {
        let mut columns: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push("recorded_at".to_string());
        let recorded_at = Utc::now().to_rfc3339();

        let rows: Vec<Vec<CellValue>> = results
            .variants
            .iter()
            .map(|variant| {
                let comparison = variant.comparison.as_ref();
                vec![
                    results.experiment_id.to_string().into(),
                    results.name.as_str().into(),
                    results.status.as_str().into(),
                    results.confidence_level.into(),
                    variant.label.as_str().into(),
                    i64::from(variant.is_control).into(),
                    count(variant.visitors),
                    count(variant.conversions),
                    variant.conversion_rate.into(),
                    variant.average_value.into(),
                    comparison.and_then(|c| c.relative_lift).into(),
                    comparison.map(|c| c.p_value).into(),
                    comparison.map(|c| i64::from(c.significant)).into(),
                    recorded_at.as_str().into(),
                ]
            })
            .collect();

        let written = self.platform.insert_rows(TABLE, &columns, &rows).await?;
        info!(
            experiment_id = %results.experiment_id,
            rows = written,
            "experiment results archived"
        );
        Ok(written)
    }

    /// Every archived row for one experiment, oldest snapshot first.
    pub async fn load(&self, id: ExperimentId) -> PlatformResult<Table> {
        let spec = QuerySpec::table(TABLE)
            .filter(Filter::eq("experiment_id", id.to_string()))
            .order_by("recorded_at", SortOrder::Asc)
            .order_by("variant", SortOrder::Asc);
        self.platform.query(DEFAULT_SOURCE, &spec).await
    }

    /// One row per archived experiment with its row count.
    pub async fn saved_experiments(&self) -> PlatformResult<Table> {
        let spec = QuerySpec::table(TABLE)
            .group_by("experiment_id")
            .group_by("experiment_name")
            .aggregate(Aggregation::count().alias("row_count"))
            .aggregate(Aggregation::max("recorded_at").alias("last_recorded_at"))
            .order_by("experiment_name", SortOrder::Asc);
        self.platform.query(DEFAULT_SOURCE, &spec).await
    }
}

fn count(value: u64) -> CellValue {
    i64::try_from(value).map_or(CellValue::Real(value as f64), CellValue::Integer)
}
