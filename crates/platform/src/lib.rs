//! `realty-platform`: data sources, the local sqlite store and structured
//! queries over both.

pub mod config;
pub mod connector;
pub mod error;
pub mod platform;
pub mod query;
pub mod sample;
pub mod source;
pub mod store;
pub mod table;

pub use config::PlatformConfig;
pub use connector::{Connector, CsvConnector};
pub use error::{PlatformError, PlatformResult};
pub use platform::{DEFAULT_SOURCE, DataPlatform, PlatformStatus};
pub use query::{AggregateFn, Aggregation, Filter, FilterOp, QuerySpec, SortOrder};
pub use sample::{SampleData, SampleDataGenerator};
pub use source::{DataSource, SourceKind};
pub use store::LocalStore;
pub use table::{CellValue, Table};
