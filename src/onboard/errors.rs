use crate::layout::LayoutError;
use crate::metadata::MetadataFetchError;
use crate::source::ParseError;
use crate::store::PersistenceError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors that fail a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OnboardError {
    /// The caller's credential does not match the configured key
    #[error("unauthorized: invalid or missing credential")]
    Unauthorized,
}

/// Pipeline stage an address was in when it was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetching,
    Parsing,
    Resolving,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Resolving => "resolving",
            Self::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Why one address was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error(transparent)]
    Fetch(#[from] MetadataFetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Persist(#[from] PersistenceError),
}

impl RejectReason {
    /// Stage the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidAddress(_) | Self::Fetch(_) => Stage::Fetching,
            Self::Parse(_) => Stage::Parsing,
            Self::Layout(_) => Stage::Resolving,
            Self::Persist(_) => Stage::Persisting,
        }
    }

    /// Whether resubmitting the address later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_transient(),
            Self::Persist(e) => {
                matches!(e, PersistenceError::Io(_) | PersistenceError::Unavailable(_))
            }
            _ => false,
        }
    }
}
