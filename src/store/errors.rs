use alloy_primitives::Address;
use thiserror::Error;

/// Errors reported by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// The address has already been onboarded
    #[error("contract {0} is already onboarded")]
    DuplicateContract(Address),

    /// Reading or writing the backing storage failed
    #[error("storage I/O failed: {0}")]
    Io(String),

    /// A snapshot could not be encoded or decoded
    #[error("invalid store snapshot: {0}")]
    Snapshot(String),

    /// The store refused the write
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
