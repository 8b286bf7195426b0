use thiserror::Error;

use realty_core::DomainError;

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors raised by the data platform.
///
/// Domain failures (unknown source, duplicate name, bad query) stay typed as
/// [`DomainError`]; the remaining variants wrap IO performed by the platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("connector error: {0}")]
    Connector(String),
}

impl PlatformError {
    pub fn connector(msg: impl Into<String>) -> Self {
        Self::Connector(msg.into())
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.domain().is_some_and(DomainError::is_not_found)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Domain(DomainError::Conflict(_)))
    }
}
