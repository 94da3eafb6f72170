/// Width of a storage slot in bytes
pub const SLOT_SIZE: usize = 32;
/// Ethereum address length (20 bytes)
pub const ADDRESS_LENGTH: usize = 20;
/// ABI entry type tag for event declarations
pub const ABI_EVENT_KIND: &str = "event";
/// Extension of metadata documents read by the file-backed metadata source
pub const METADATA_FILE_EXTENSION: &str = "json";
