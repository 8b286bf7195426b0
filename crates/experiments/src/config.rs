//! Experiment settings read from the environment.

use serde::{Deserialize, Serialize};

use realty_core::{DomainError, DomainResult};

pub const CONFIDENCE_LEVEL_VAR: &str = "REALTY_CONFIDENCE_LEVEL";
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    confidence_level: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
        }
    }
}

impl ExperimentConfig {
    /// Confidence level must lie strictly between 0 and 1.
    pub fn new(confidence_level: f64) -> DomainResult<Self> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(DomainError::validation(format!(
                "confidence level must be in (0, 1), got {confidence_level}"
            )));
        }
        Ok(Self { confidence_level })
    }

    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (process env in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DomainResult<Self> {
        match lookup(CONFIDENCE_LEVEL_VAR) {
            None => Ok(Self::default()),
            Some(raw) => {
                let level = raw.trim().parse::<f64>().map_err(|_| {
                    DomainError::validation(format!("{CONFIDENCE_LEVEL_VAR} is not a number: '{raw}'"))
                })?;
                Self::new(level)
            }
        }
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }
}
