//! Child-slot derivation for base slots.
//!
//! The resolver only assigns base slots to mappings, dynamic arrays, `bytes`
//! and `string`. Decoders use these helpers to find where the actual element
//! data lives, following the EVM storage hashing scheme.

use alloy_primitives::{keccak256, Address, Keccak256, B256, U256};

/// Convert a resolver slot index into a 256-bit storage key.
pub fn slot_key(slot: u64) -> U256 {
    U256::from(slot)
}

/// Compute the first data slot of a dynamic array (or long `bytes`/`string`).
///
/// For `address[] signers` at slot 1:
///   data = keccak256(abi.encode(1))
///   signers[0] lives at data + 0
///   signers[1] lives at data + 1
pub fn dynamic_array_data_slot(base: U256) -> U256 {
    U256::from_be_bytes(keccak256(B256::from(base.to_be_bytes()).as_slice()).0)
}

/// Slot holding element `index` of a dynamic array whose elements each span
/// `element_slots` slots. Small packed elements share slots; callers that
/// know the element width divide the index accordingly before calling.
pub fn dynamic_array_element_slot(base: U256, index: U256, element_slots: u64) -> U256 {
    dynamic_array_data_slot(base).wrapping_add(index.wrapping_mul(U256::from(element_slots)))
}

/// Compute the value slot for a mapping entry given the 32-byte key word.
///
///   slot = keccak256(key_word ++ abi.encode(base))
pub fn mapping_value_slot(key_word: B256, base: U256) -> U256 {
    let mut hasher = Keccak256::new();
    hasher.update(key_word.as_slice());
    hasher.update(B256::from(base.to_be_bytes()).as_slice());
    U256::from_be_bytes(hasher.finalize().0)
}

/// Value slot for `mapping(address => ...)`.
pub fn mapping_slot_for_address(key: Address, base: U256) -> U256 {
    let mut key_padded = [0u8; 32];
    key_padded[12..32].copy_from_slice(key.as_slice());
    mapping_value_slot(B256::from(key_padded), base)
}

/// Value slot for `mapping(uintN => ...)`.
pub fn mapping_slot_for_uint(key: U256, base: U256) -> U256 {
    mapping_value_slot(B256::from(key.to_be_bytes()), base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn test_dynamic_array_data_slot_is_keccak_of_slot() {
        // keccak256(uint256(0))
        let expected = b256!("290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563");
        assert_eq!(dynamic_array_data_slot(U256::ZERO), U256::from_be_bytes(expected.0));
    }

    #[test]
    fn test_dynamic_array_element_slot_offsets_from_data() {
        let base = U256::from(3);
        let data = dynamic_array_data_slot(base);
        assert_eq!(dynamic_array_element_slot(base, U256::ZERO, 1), data);
        assert_eq!(dynamic_array_element_slot(base, U256::from(2), 3), data + U256::from(6));
    }

    #[test]
    fn test_mapping_slot_for_address_matches_manual_encoding() {
        let key = address!("00000000000000000000000000000000000000aa");
        let base = U256::from(2);
        let mut word = [0u8; 32];
        word[31] = 0xaa;
        assert_eq!(
            mapping_slot_for_address(key, base),
            mapping_value_slot(B256::from(word), base)
        );
        assert_eq!(
            mapping_slot_for_address(key, base),
            mapping_slot_for_uint(U256::from(0xaa), base)
        );
    }

    #[test]
    fn test_mapping_slots_differ_per_base() {
        let key = U256::from(7);
        assert_ne!(
            mapping_slot_for_uint(key, U256::from(0)),
            mapping_slot_for_uint(key, U256::from(1))
        );
    }
}
