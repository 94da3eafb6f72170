use thiserror::Error;

/// Errors raised while assembling or querying a [`super::TypeCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A struct with this name was already registered
    #[error("duplicate struct definition `{0}`")]
    DuplicateStruct(String),

    /// An enum, value type or contract name collides with an existing type name
    #[error("duplicate type name `{0}`")]
    DuplicateType(String),

    /// A struct field names a type that is neither elementary nor registered
    #[error("struct `{owner}` field `{field}` has unknown type `{ty}`")]
    UnknownFieldType {
        /// Struct declaring the field
        owner: String,
        /// Offending field
        field: String,
        /// Type name that failed to resolve
        ty: String,
    },

    /// A type name is neither elementary nor registered
    #[error("unknown type `{0}`")]
    UnknownType(String),

    /// A struct contains itself, directly or through other structs / fixed arrays
    #[error("struct `{}` contains itself: {}", .path[0], .path.join(" -> "))]
    CyclicStruct {
        /// Containment chain, first and last entries are the same struct
        path: Vec<String>,
    },
}
