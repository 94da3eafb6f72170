use alloy_primitives::Address;
use thiserror::Error;

/// Errors from a metadata source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataFetchError {
    /// No verified source is published for the address
    #[error("no verified metadata for {0}")]
    NotFound(Address),

    /// The source could not be reached; retrying may help
    #[error("metadata source unavailable: {0}")]
    Transient(String),

    /// The source answered with something unusable
    #[error("malformed metadata for {address}: {reason}")]
    Malformed { address: Address, reason: String },
}

impl MetadataFetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
