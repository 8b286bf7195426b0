//! Platform settings read from the environment.

use serde::{Deserialize, Serialize};

use realty_core::{DomainError, DomainResult};

pub const DATABASE_URL_VAR: &str = "REALTY_DATABASE_URL";
pub const PLATFORM_NAME_VAR: &str = "REALTY_PLATFORM_NAME";
pub const SAMPLE_SEED_VAR: &str = "REALTY_SAMPLE_SEED";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/real_estate_analytics.db?mode=rwc";
pub const DEFAULT_PLATFORM_NAME: &str = "Real Estate Analytics Platform";
pub const IN_MEMORY_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub database_url: String,
    pub platform_name: String,
    /// Seed for sample data; `None` draws from entropy.
    pub sample_seed: Option<u64>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            platform_name: DEFAULT_PLATFORM_NAME.to_string(),
            sample_seed: None,
        }
    }
}

impl PlatformConfig {
    /// Config backed by a private in-memory store.
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_DATABASE_URL.to_string(),
            ..Self::default()
        }
    }

    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DomainResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(DATABASE_URL_VAR).filter(|v| !v.trim().is_empty()) {
            config.database_url = url;
        }
        if let Some(name) = lookup(PLATFORM_NAME_VAR).filter(|v| !v.trim().is_empty()) {
            config.platform_name = name;
        }
        if let Some(raw) = lookup(SAMPLE_SEED_VAR) {
            let seed = raw.trim().parse::<u64>().map_err(|_| {
                DomainError::validation(format!("{SAMPLE_SEED_VAR} must be an unsigned integer, got '{raw}'"))
            })?;
            config.sample_seed = Some(seed);
        }

        Ok(config)
    }

    pub fn is_in_memory(&self) -> bool {
        is_memory_url(&self.database_url)
    }
}

pub(crate) fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let config = PlatformConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PlatformConfig::default());
        assert!(!config.is_in_memory());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = PlatformConfig::from_lookup(lookup(&[
            (DATABASE_URL_VAR, "sqlite::memory:"),
            (PLATFORM_NAME_VAR, "Austin Pilot"),
            (SAMPLE_SEED_VAR, "42"),
        ]))
        .unwrap();
        assert!(config.is_in_memory());
        assert_eq!(config.platform_name, "Austin Pilot");
        assert_eq!(config.sample_seed, Some(42));
    }

    #[test]
    fn bad_seed_is_rejected() {
        let err = PlatformConfig::from_lookup(lookup(&[(SAMPLE_SEED_VAR, "-1")])).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
