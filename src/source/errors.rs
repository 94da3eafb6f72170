use crate::catalog::CatalogError;
use thiserror::Error;

/// Errors raised while turning contract source into declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A `/* ... */` comment is never closed
    #[error("line {line}: unterminated block comment")]
    UnterminatedComment { line: usize },

    /// A string literal is never closed
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    /// The token stream does not match the grammar
    #[error("line {line}: expected {expected}, found `{found}`")]
    UnexpectedToken {
        line: usize,
        expected: &'static str,
        found: String,
    },

    /// Input ended in the middle of a declaration
    #[error("unexpected end of source, expected {expected}")]
    UnexpectedEof { expected: &'static str },

    /// A fixed array length is not a constant integer expression
    #[error("line {line}: `{expr}` is not a valid array length")]
    InvalidArrayLength { line: usize, expr: String },

    /// The source declares no deployable contract
    #[error("source declares no contract")]
    NoContract,

    /// The requested contract is not declared in the source
    #[error("contract `{0}` not found in source")]
    ContractNotFound(String),

    /// A contract inherits from a name the source does not declare
    #[error("contract `{contract}` inherits from unknown `{base}`")]
    UnknownBase { contract: String, base: String },

    /// Inheritance graph cannot be linearized
    #[error("inheritance of `{0}` cannot be linearized")]
    Linearization(String),

    /// Declared types do not form a valid catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
