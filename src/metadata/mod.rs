//! Metadata source boundary.
//!
//! A [`MetadataSource`] returns the verified name, ABI and source text for an
//! address. [`FileMetadataSource`] serves them from a directory of JSON
//! documents named `<lowercase address>.json`.

pub mod errors;

pub use errors::MetadataFetchError;

use crate::constants::METADATA_FILE_EXTENSION;
use alloy_primitives::Address;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Verified metadata for one contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractMetadata {
    pub name: String,
    /// Normalized to a JSON array, or `Null` when none was published
    pub abi: Value,
    pub source_code: String,
}

/// Fetches verified contract metadata by address.
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, address: Address) -> Result<ContractMetadata, MetadataFetchError>;
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(default, alias = "ContractName", alias = "contractName")]
    name: String,
    #[serde(default, alias = "ABI")]
    abi: Value,
    #[serde(default, alias = "SourceCode", alias = "sourceCode")]
    source_code: String,
}

/// Directory-backed metadata source.
#[derive(Debug, Clone)]
pub struct FileMetadataSource {
    dir: PathBuf,
}

impl FileMetadataSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, address: Address) -> PathBuf {
        let file = format!("{}.{METADATA_FILE_EXTENSION}", address.to_string().to_lowercase());
        self.dir.join(file)
    }
}

#[async_trait::async_trait]
impl MetadataSource for FileMetadataSource {
    async fn fetch(&self, address: Address) -> Result<ContractMetadata, MetadataFetchError> {
        let path = self.path_for(address);
        debug!(path = %path.display(), "reading contract metadata");
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetadataFetchError::NotFound(address))
            }
            Err(e) => return Err(MetadataFetchError::Transient(e.to_string())),
        };
        parse_document(address, &raw)
    }
}

/// Decode one metadata document.
pub fn parse_document(address: Address, raw: &str) -> Result<ContractMetadata, MetadataFetchError> {
    let malformed = |reason: String| MetadataFetchError::Malformed { address, reason };

    let doc: RawMetadata = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    let source_code = flatten_source(&doc.source_code).map_err(malformed)?;
    if source_code.trim().is_empty() {
        return Err(MetadataFetchError::NotFound(address));
    }
    let abi = normalize_abi(doc.abi).map_err(malformed)?;

    Ok(ContractMetadata { name: doc.name, abi, source_code })
}

/// ABIs are often published as a JSON string; decode those in place.
fn normalize_abi(abi: Value) -> Result<Value, String> {
    match abi {
        Value::Null | Value::Array(_) => Ok(abi),
        Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value @ Value::Array(_)) => Ok(value),
            Ok(_) => Err("ABI is not a JSON array".to_string()),
            Err(e) => Err(format!("ABI is not valid JSON: {e}")),
        },
        _ => Err("ABI is not a JSON array".to_string()),
    }
}

/// Multi-file verifications arrive as a standard-json input document,
/// sometimes wrapped in an extra pair of braces. Concatenate every source.
fn flatten_source(source: &str) -> Result<String, String> {
    let trimmed = source.trim();
    if !trimmed.starts_with('{') {
        return Ok(source.to_string());
    }
    let inner = if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    let input: Value =
        serde_json::from_str(inner).map_err(|e| format!("invalid multi-file source: {e}"))?;
    let sources = input
        .get("sources")
        .and_then(Value::as_object)
        .ok_or_else(|| "multi-file source has no `sources`".to_string())?;

    let mut merged = String::new();
    for entry in sources.values() {
        if let Some(content) = entry.get("content").and_then(Value::as_str) {
            merged.push_str(content);
            merged.push('\n');
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    const ADDR: Address = address!("00000000000000000000000000000000000000aa");

    #[test]
    fn test_parse_plain_document() {
        let raw = json!({
            "name": "Token",
            "abi": [{"type": "event", "name": "Transfer"}],
            "source_code": "contract Token { uint256 x; }"
        })
        .to_string();
        let meta = parse_document(ADDR, &raw).unwrap();
        assert_eq!(meta.name, "Token");
        assert!(meta.abi.is_array());
        assert!(meta.source_code.contains("contract Token"));
    }

    #[test]
    fn test_parse_explorer_style_keys() {
        let raw = json!({
            "ContractName": "Vault",
            "ABI": "[{\"type\":\"event\",\"name\":\"Deposit\"}]",
            "SourceCode": "contract Vault {}"
        })
        .to_string();
        let meta = parse_document(ADDR, &raw).unwrap();
        assert_eq!(meta.name, "Vault");
        assert_eq!(meta.abi[0]["name"], "Deposit");
    }

    #[test]
    fn test_parse_multi_file_source() {
        let input = json!({
            "language": "Solidity",
            "sources": {
                "a.sol": {"content": "contract A { uint256 a; }"},
                "b.sol": {"content": "contract B is A { uint256 b; }"}
            }
        })
        .to_string();
        let raw =
            json!({"name": "B", "abi": [], "source_code": format!("{{{input}}}")}).to_string();
        let meta = parse_document(ADDR, &raw).unwrap();
        assert!(meta.source_code.contains("contract A"));
        assert!(meta.source_code.contains("contract B is A"));
    }

    #[test]
    fn test_empty_source_is_not_found() {
        let raw = json!({"name": "X", "abi": [], "source_code": "  "}).to_string();
        assert_eq!(parse_document(ADDR, &raw), Err(MetadataFetchError::NotFound(ADDR)));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            parse_document(ADDR, "not json"),
            Err(MetadataFetchError::Malformed { .. })
        ));
        let bad_abi =
            json!({"name": "X", "abi": "{oops", "source_code": "contract X {}"}).to_string();
        assert!(matches!(
            parse_document(ADDR, &bad_abi),
            Err(MetadataFetchError::Malformed { .. })
        ));
        let object_abi =
            json!({"name": "X", "abi": {}, "source_code": "contract X {}"}).to_string();
        assert!(matches!(
            parse_document(ADDR, &object_abi),
            Err(MetadataFetchError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_abi_is_null() {
        let raw = json!({"name": "X", "source_code": "contract X {}"}).to_string();
        assert_eq!(parse_document(ADDR, &raw).unwrap().abi, Value::Null);
    }

    #[tokio::test]
    async fn test_file_source_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileMetadataSource::new(dir.path());
        let doc = json!({"name": "Token", "abi": [], "source_code": "contract Token {}"});
        std::fs::write(source.path_for(ADDR), doc.to_string()).unwrap();

        let meta = source.fetch(ADDR).await.unwrap();
        assert_eq!(meta.name, "Token");
        assert!(source.path_for(ADDR).ends_with("0x00000000000000000000000000000000000000aa.json"));
    }

    #[tokio::test]
    async fn test_file_source_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileMetadataSource::new(dir.path());
        let err = source.fetch(ADDR).await.unwrap_err();
        assert_eq!(err, MetadataFetchError::NotFound(ADDR));
        assert!(!err.is_transient());
    }
}
