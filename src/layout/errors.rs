use crate::catalog::CatalogError;
use thiserror::Error;

/// Errors that abort storage layout resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// The type catalog is invalid or a declaration references an unknown type
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Structs must declare at least one field
    #[error("struct `{0}` has no fields")]
    EmptyStruct(String),

    /// `T[0]` has no storage representation
    #[error("`{0}` declares a fixed array of length zero")]
    ZeroLengthArray(String),

    /// Mapping keys must be value types, `string` or `bytes`
    #[error("`{variable}` uses `{key}` as a mapping key")]
    InvalidMappingKey {
        /// Variable (or struct member path) declaring the mapping
        variable: String,
        /// Signature of the rejected key type
        key: String,
    },

    /// The declaration needs more slots than a 64-bit slot index can address
    #[error("`{0}` does not fit in storage")]
    Overflow(String),
}
