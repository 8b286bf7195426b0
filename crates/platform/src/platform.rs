//! The data platform: a registry of named sources over one local store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use realty_core::DomainError;

use crate::config::PlatformConfig;
use crate::connector::{Connector, CsvConnector};
use crate::error::{PlatformError, PlatformResult};
use crate::query::QuerySpec;
use crate::sample::{SampleData, SampleDataGenerator};
use crate::source::{DataSource, SourceKind};
use crate::store::{LocalStore, SCHEMA_TABLES};
use crate::table::{CellValue, Table};

/// Name under which the local store is registered.
pub const DEFAULT_SOURCE: &str = "default_database";

pub struct DataPlatform {
    name: String,
    config: PlatformConfig,
    store: LocalStore,
    sources: RwLock<BTreeMap<String, DataSource>>,
    connectors: RwLock<HashMap<SourceKind, Arc<dyn Connector>>>,
    created_at: DateTime<Utc>,
}

/// Snapshot of the platform's registry.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStatus {
    pub platform_name: String,
    pub database_url: String,
    pub created_at: DateTime<Utc>,
    pub total_sources: usize,
    pub active_sources: usize,
    pub tables: Vec<&'static str>,
    pub sources: Vec<DataSource>,
}

impl DataPlatform {
    /// Connect the local store, create its schema and register it as
    /// [`DEFAULT_SOURCE`]. File sources get the CSV connector.
    #[instrument(skip(config), fields(database_url = %config.database_url), err)]
    pub async fn open(config: PlatformConfig) -> PlatformResult<Self> {
        let store = LocalStore::connect(&config.database_url).await?;
        store.migrate().await?;

        let mut connectors: HashMap<SourceKind, Arc<dyn Connector>> = HashMap::new();
        connectors.insert(SourceKind::File, Arc::new(CsvConnector));

        let platform = Self {
            name: config.platform_name.clone(),
            store,
            sources: RwLock::new(BTreeMap::new()),
            connectors: RwLock::new(connectors),
            created_at: Utc::now(),
            config,
        };
        platform.register(
            DataSource::new(DEFAULT_SOURCE, SourceKind::Database, platform.config.database_url.clone())
                .with_description("Local analytics store"),
        )?;

        info!(platform = %platform.name, "data platform ready");
        Ok(platform)
    }

    pub async fn open_in_memory() -> PlatformResult<Self> {
        Self::open(PlatformConfig::in_memory()).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Register a source under a unique name.
    pub fn add_data_source(
        &self,
        name: impl Into<String>,
        kind: SourceKind,
        connection: impl Into<String>,
    ) -> PlatformResult<DataSource> {
        let source = DataSource::new(name, kind, connection);
        self.register(source.clone())?;
        Ok(source)
    }

    /// Register a prepared source (e.g. one carrying a description).
    pub fn register(&self, source: DataSource) -> PlatformResult<()> {
        if source.name().trim().is_empty() {
            return Err(DomainError::validation("data source name cannot be empty").into());
        }

        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        if sources.contains_key(source.name()) {
            return Err(DomainError::conflict(format!(
                "data source '{}' already registered",
                source.name()
            ))
            .into());
        }

        info!(source = source.name(), kind = %source.kind(), "data source registered");
        sources.insert(source.name().to_string(), source);
        Ok(())
    }

    /// Deactivate a source. It stays in the catalog but can no longer be
    /// queried.
    pub fn remove_data_source(&self, name: &str) -> PlatformResult<()> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let source = sources
            .get_mut(name)
            .ok_or_else(|| DomainError::not_found(format!("data source '{name}'")))?;
        source.deactivate();
        info!(source = name, "data source deactivated");
        Ok(())
    }

    pub fn data_source(&self, name: &str) -> Option<DataSource> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Install (or replace) the connector used for a source kind.
    pub fn register_connector(&self, kind: SourceKind, connector: Arc<dyn Connector>) {
        self.connectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, connector);
        debug!(%kind, "connector registered");
    }

    /// Answer a structured query against a named, active source.
    pub async fn query(&self, source_name: &str, spec: &QuerySpec) -> PlatformResult<Table> {
        let source = self.active_source(source_name)?;
        spec.validate()?;

        let table = match source.kind() {
            SourceKind::Database if source.connection() == self.store.url() => {
                self.store.run(spec).await?
            }
            SourceKind::Database => {
                let store = LocalStore::connect(source.connection()).await?;
                let result = store.run(spec).await;
                store.close().await;
                result?
            }
            kind @ (SourceKind::File | SourceKind::Api) => {
                let connector = self
                    .connectors
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&kind)
                    .cloned()
                    .ok_or_else(|| {
                        PlatformError::connector(format!("no connector registered for {kind} sources"))
                    })?;

                let fetched = {
                    let source = source.clone();
                    let table = spec.table.clone();
                    tokio::task::spawn_blocking(move || connector.fetch(&source, &table))
                        .await
                        .map_err(|e| PlatformError::connector(e.to_string()))??
                };
                spec.evaluate(&fetched)?
            }
        };

        if let Some(entry) = self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(source_name)
        {
            entry.mark_queried(Utc::now());
        }

        debug!(source = source_name, table = %spec.table, rows = table.len(), "query answered");
        Ok(table)
    }

    /// Write rows into a table of the local store.
    pub async fn insert_rows(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<CellValue>],
    ) -> PlatformResult<u64> {
        self.store.insert_rows(table, columns, rows).await
    }

    /// Replace the sample tables with freshly generated rows. Uses the
    /// configured seed when present.
    pub async fn create_sample_data(&self) -> PlatformResult<SampleData> {
        let generator = match self.config.sample_seed {
            Some(seed) => SampleDataGenerator::seeded(seed, Utc::now().date_naive()),
            None => SampleDataGenerator::new(),
        };
        self.create_sample_data_with(generator).await
    }

    pub async fn create_sample_data_with(
        &self,
        mut generator: SampleDataGenerator,
    ) -> PlatformResult<SampleData> {
        let data = generator.generate();
        let tables = data.tables();
        let cleared = self.store.replace_tables(&tables).await?;
        for ((name, _), removed) in tables.iter().zip(cleared) {
            if removed > 0 {
                warn!(table = name, rows = removed, "replaced existing sample rows");
            }
        }

        info!(counts = ?data.row_counts(), "sample data created");
        Ok(data)
    }

    /// All registered sources, by name.
    pub fn catalog(&self) -> Vec<DataSource> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn status(&self) -> PlatformStatus {
        let sources = self.catalog();
        PlatformStatus {
            platform_name: self.name.clone(),
            database_url: self.config.database_url.clone(),
            created_at: self.created_at,
            total_sources: sources.len(),
            active_sources: sources.iter().filter(|s| s.is_active()).count(),
            tables: SCHEMA_TABLES.to_vec(),
            sources,
        }
    }

    /// Release the local store. Later queries against it fail.
    pub async fn close(&self) {
        self.store.close().await;
        info!(platform = %self.name, "data platform closed");
    }

    fn active_source(&self, name: &str) -> PlatformResult<DataSource> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        match sources.get(name) {
            Some(source) if source.is_active() => Ok(source.clone()),
            Some(_) => Err(DomainError::not_found(format!("data source '{name}' is inactive")).into()),
            None => Err(DomainError::not_found(format!("data source '{name}'")).into()),
        }
    }
}

impl core::fmt::Debug for DataPlatform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataPlatform")
            .field("name", &self.name)
            .field("database_url", &self.config.database_url)
            .field("sources", &self.catalog().len())
            .finish()
    }
}
