use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use realty_core::DomainError;

/// Origin of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Database,
    Api,
    File,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Database => "database",
            SourceKind::Api => "api",
            SourceKind::File => "file",
        }
    }
}

impl core::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "api" => Ok(Self::Api),
            "file" => Ok(Self::File),
            other => Err(DomainError::validation(format!(
                "unknown source kind '{other}': must be database, api or file"
            ))),
        }
    }
}

/// A named, registered data origin. The connection string is opaque to the
/// platform except for database sources (sqlite URL) and file sources (path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    name: String,
    kind: SourceKind,
    connection: String,
    description: Option<String>,
    registered_at: DateTime<Utc>,
    last_queried_at: Option<DateTime<Utc>>,
    active: bool,
}

impl DataSource {
    pub fn new(name: impl Into<String>, kind: SourceKind, connection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            connection: connection.into(),
            description: None,
            registered_at: Utc::now(),
            last_queried_at: None,
            active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn last_queried_at(&self) -> Option<DateTime<Utc>> {
        self.last_queried_at
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    pub(crate) fn mark_queried(&mut self, at: DateTime<Utc>) {
        self.last_queried_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("API".parse::<SourceKind>().unwrap(), SourceKind::Api);
        assert_eq!(" file ".parse::<SourceKind>().unwrap(), SourceKind::File);
        assert!(matches!(
            "ftp".parse::<SourceKind>().unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn new_source_is_active_and_unqueried() {
        let source = DataSource::new("mls", SourceKind::Api, "https://mls.example/feed")
            .with_description("MLS listings");
        assert!(source.is_active());
        assert_eq!(source.last_queried_at(), None);
        assert_eq!(source.description(), Some("MLS listings"));
    }
}
