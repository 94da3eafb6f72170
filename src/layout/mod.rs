//! Storage Layout Resolver
//!
//! Reproduces the compiler's storage allocation pass: given state variable
//! declarations in source order, assigns each one a 32-byte slot and a byte
//! offset inside it.
//!
//! Rules:
//! - `constant`, `immutable` and `transient` declarations take no storage.
//! - Value types pack tightly: a value goes at the current offset if it fits
//!   in what remains of the slot, otherwise it starts the next slot. Values
//!   never straddle two slots.
//! - Structs, fixed arrays, mappings, dynamic arrays, `bytes` and `string`
//!   always start a fresh slot, and whatever follows them starts a fresh slot
//!   too. Later value types resume packing in that fresh slot.
//! - Struct members are laid out with the same rules starting at offset 0 of
//!   the struct's first slot. A struct spans a whole number of slots.
//! - Fixed arrays of value types pack their elements like consecutive
//!   declarations; arrays of anything else give every element its own slots.
//! - Mappings, dynamic arrays, `bytes` and `string` get one base slot. Their
//!   contents live at hashed locations derived from it (see [`slots`]).
//!
//! Resolution is a pure function of its inputs.

pub mod errors;
pub mod signature;
pub mod slots;

pub use errors::LayoutError;
pub use signature::canonical_signature;

use crate::catalog::{CatalogError, TypeCatalog, TypeRef};
use crate::constants::SLOT_SIZE;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a declaration is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    /// Ordinary storage variable
    #[default]
    Mutable,
    /// `constant`, inlined into bytecode
    Constant,
    /// `immutable`, stored in bytecode at deploy time
    Immutable,
    /// `transient`, lives in transient storage
    Transient,
}

/// Declared visibility of a state variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

/// A state variable as declared in source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVariableDecl {
    /// Position in allocation order
    pub index: usize,
    pub name: String,
    pub ty: TypeRef,
    pub visibility: Option<Visibility>,
    pub mutability: Mutability,
}

impl StateVariableDecl {
    /// A mutable state variable without explicit visibility.
    pub fn new(index: usize, name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            index,
            name: name.into(),
            ty,
            visibility: None,
            mutability: Mutability::Mutable,
        }
    }

    pub fn with_mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    /// Whether this declaration occupies persistent storage.
    pub fn is_stored(&self) -> bool {
        self.mutability == Mutability::Mutable
    }
}

/// What the bytes at an assignment's location mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    /// The value itself (elementary values and fixed arrays)
    Value,
    /// Hashing input for a mapping, dynamic array, `bytes` or `string`
    BaseSlot,
    /// A struct spanning whole slots; its members follow as separate entries
    Composite,
}

/// Where one variable (or struct member) lives in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlotAssignment {
    /// Variable name; struct members use dotted paths (`config.owner`)
    pub name: String,
    pub slot: u64,
    /// Byte offset inside the slot, counted from the low-order end
    pub offset: u8,
    /// Bytes occupied; multi-slot types report `slots * 32`
    pub size: usize,
    pub signature: String,
    pub role: SlotRole,
}

impl StorageSlotAssignment {
    /// Whether this is a base slot for hashed child locations.
    pub fn is_base_slot(&self) -> bool {
        self.role == SlotRole::BaseSlot
    }

    /// Slot as a 256-bit storage key.
    pub fn slot_key(&self) -> U256 {
        slots::slot_key(self.slot)
    }

    /// First slot of the out-of-line data behind a dynamic array, `bytes` or
    /// `string`. Mappings have no single data slot.
    pub fn data_slot(&self) -> Option<U256> {
        let hashed = self.is_base_slot() && !self.signature.starts_with("mapping(");
        hashed.then(|| slots::dynamic_array_data_slot(self.slot_key()))
    }

    /// Number of slots touched by this assignment.
    pub fn slot_span(&self) -> u64 {
        (self.offset as u64 + self.size as u64).div_ceil(SLOT_SIZE as u64).max(1)
    }

    /// Whether two assignments share any byte.
    pub fn overlaps(&self, other: &Self) -> bool {
        let a = self.byte_range();
        let b = other.byte_range();
        a.0 < b.1 && b.0 < a.1
    }

    /// Absolute half-open byte range, treating storage as one long tape.
    fn byte_range(&self) -> (u128, u128) {
        let start = self.slot as u128 * SLOT_SIZE as u128 + self.offset as u128;
        (start, start + self.size as u128)
    }
}

/// Resolved layout of one contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub assignments: Vec<StorageSlotAssignment>,
    /// Number of slots consumed by the layout
    pub slots_used: u64,
}

impl StorageLayout {
    /// Find an assignment by (dotted) name.
    pub fn get(&self, name: &str) -> Option<&StorageSlotAssignment> {
        self.assignments.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Resolve the storage layout for `decls`, in declaration order.
///
/// The catalog is validated first, so unknown or cyclic structs are reported
/// before any slot is assigned.
pub fn resolve_layout(
    decls: &[StateVariableDecl],
    catalog: &TypeCatalog,
) -> Result<StorageLayout, LayoutError> {
    catalog.validate()?;
    for decl in decls.iter().filter(|d| d.is_stored()) {
        catalog.check_type_ref(&decl.ty)?;
    }

    let mut resolver = Resolver { catalog, struct_slots: HashMap::new(), out: Vec::new() };
    let mut cursor = Cursor::default();
    for decl in decls.iter().filter(|d| d.is_stored()) {
        resolver.place(&mut cursor, 0, &decl.name, &decl.ty, true)?;
    }

    Ok(StorageLayout { assignments: resolver.out, slots_used: cursor.slots_used() })
}

/// Allocation cursor, relative to the slot where the enclosing scope starts.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    slot: u64,
    offset: usize,
}

impl Cursor {
    /// Reserve `size` bytes, moving to the next slot if they do not fit.
    fn pack(&mut self, size: usize) -> (u64, usize) {
        if self.offset + size > SLOT_SIZE {
            self.slot += 1;
            self.offset = 0;
        }
        let at = (self.slot, self.offset);
        self.offset += size;
        at
    }

    /// Reserve `slots` whole slots starting at a slot boundary. The cursor
    /// ends on the next fresh slot.
    fn reserve(&mut self, slots: u64) -> Option<u64> {
        if self.offset != 0 {
            self.slot += 1;
            self.offset = 0;
        }
        let start = self.slot;
        self.slot = self.slot.checked_add(slots)?;
        Some(start)
    }

    fn slots_used(&self) -> u64 {
        if self.offset == 0 {
            self.slot
        } else {
            self.slot + 1
        }
    }
}

/// Space a type needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Footprint {
    /// Packable value of this many bytes
    Packed(usize),
    /// Whole slots starting at a slot boundary
    Slots(u64),
}

struct Resolver<'a> {
    catalog: &'a TypeCatalog,
    /// Memoized struct sizes in slots
    struct_slots: HashMap<String, u64>,
    out: Vec<StorageSlotAssignment>,
}

impl<'a> Resolver<'a> {
    /// Place `ty` at the cursor. `base` is the absolute slot of the
    /// enclosing scope; assignments are only recorded when `emit` is set.
    fn place(
        &mut self,
        cursor: &mut Cursor,
        base: u64,
        path: &str,
        ty: &TypeRef,
        emit: bool,
    ) -> Result<(), LayoutError> {
        match self.footprint(path, ty)? {
            Footprint::Packed(size) => {
                let (slot, offset) = cursor.pack(size);
                if emit {
                    self.record(path, base + slot, offset, size, ty, SlotRole::Value);
                }
            }
            Footprint::Slots(count) => {
                let start =
                    cursor.reserve(count).ok_or_else(|| LayoutError::Overflow(path.to_string()))?;
                let absolute = base
                    .checked_add(start)
                    .ok_or_else(|| LayoutError::Overflow(path.to_string()))?;
                if !emit {
                    return Ok(());
                }

                let size = usize::try_from(count)
                    .ok()
                    .and_then(|c| c.checked_mul(SLOT_SIZE))
                    .unwrap_or(usize::MAX);
                match ty {
                    TypeRef::StructRef(name) => {
                        self.record(path, absolute, 0, size, ty, SlotRole::Composite);
                        self.place_members(name, absolute, path)?;
                    }
                    TypeRef::Mapping { .. } | TypeRef::DynamicArray(_) => {
                        self.record(path, absolute, 0, size, ty, SlotRole::BaseSlot);
                    }
                    TypeRef::Elementary(kind) if kind.is_dynamic() => {
                        self.record(path, absolute, 0, size, ty, SlotRole::BaseSlot);
                    }
                    _ => self.record(path, absolute, 0, size, ty, SlotRole::Value),
                }
            }
        }
        Ok(())
    }

    /// Lay out the members of struct `name` starting at absolute slot `base`.
    fn place_members(&mut self, name: &str, base: u64, path: &str) -> Result<(), LayoutError> {
        let catalog = self.catalog;
        let def = catalog
            .get_struct(name)
            .ok_or_else(|| LayoutError::Catalog(CatalogError::UnknownType(name.to_string())))?;

        let mut cursor = Cursor::default();
        for field in &def.fields {
            let member = format!("{path}.{}", field.name);
            self.place(&mut cursor, base, &member, &field.ty, true)?;
        }
        Ok(())
    }

    fn footprint(&mut self, path: &str, ty: &TypeRef) -> Result<Footprint, LayoutError> {
        match ty {
            TypeRef::Elementary(kind) => Ok(match kind.packed_size() {
                Some(size) => Footprint::Packed(size),
                None => Footprint::Slots(1),
            }),
            TypeRef::Mapping { key, value } => {
                if !matches!(**key, TypeRef::Elementary(_)) {
                    return Err(LayoutError::InvalidMappingKey {
                        variable: path.to_string(),
                        key: canonical_signature(key, self.catalog),
                    });
                }
                // Value types are never laid out inline, but must still be well formed.
                self.check_nested(path, value)?;
                Ok(Footprint::Slots(1))
            }
            TypeRef::DynamicArray(element) => {
                self.check_nested(path, element)?;
                Ok(Footprint::Slots(1))
            }
            TypeRef::FixedArray { element, length } => {
                if *length == 0 {
                    return Err(LayoutError::ZeroLengthArray(path.to_string()));
                }
                let slots = match self.footprint(path, element)? {
                    Footprint::Packed(size) => {
                        let per_slot = (SLOT_SIZE / size) as u64;
                        length.div_ceil(per_slot)
                    }
                    Footprint::Slots(each) => length
                        .checked_mul(each)
                        .ok_or_else(|| LayoutError::Overflow(path.to_string()))?,
                };
                Ok(Footprint::Slots(slots))
            }
            TypeRef::StructRef(name) => self.struct_slots(name).map(Footprint::Slots),
        }
    }

    /// Validate a type stored behind a base slot without placing it.
    fn check_nested(&mut self, path: &str, ty: &TypeRef) -> Result<(), LayoutError> {
        match ty {
            // Structs behind an indirection may refer back to an enclosing
            // struct; their own layout is checked where they are declared.
            TypeRef::StructRef(name) => match self.catalog.get_struct(name) {
                Some(def) if def.fields.is_empty() => Err(LayoutError::EmptyStruct(name.clone())),
                Some(_) => Ok(()),
                None => Err(CatalogError::UnknownType(name.clone()).into()),
            },
            TypeRef::DynamicArray(element) => self.check_nested(path, element),
            TypeRef::FixedArray { element, length } => {
                if *length == 0 {
                    return Err(LayoutError::ZeroLengthArray(path.to_string()));
                }
                self.check_nested(path, element)
            }
            _ => self.footprint(path, ty).map(|_| ()),
        }
    }

    fn struct_slots(&mut self, name: &str) -> Result<u64, LayoutError> {
        if let Some(&slots) = self.struct_slots.get(name) {
            return Ok(slots);
        }

        let catalog = self.catalog;
        let def = catalog
            .get_struct(name)
            .ok_or_else(|| CatalogError::UnknownType(name.to_string()))?;
        if def.fields.is_empty() {
            return Err(LayoutError::EmptyStruct(name.to_string()));
        }

        let mut cursor = Cursor::default();
        for field in &def.fields {
            let member = format!("{name}.{}", field.name);
            self.place(&mut cursor, 0, &member, &field.ty, false)?;
        }
        let slots = cursor.slots_used();
        self.struct_slots.insert(name.to_string(), slots);
        Ok(slots)
    }

    fn record(
        &mut self,
        path: &str,
        slot: u64,
        offset: usize,
        size: usize,
        ty: &TypeRef,
        role: SlotRole,
    ) {
        self.out.push(StorageSlotAssignment {
            name: path.to_string(),
            slot,
            offset: offset as u8,
            size,
            signature: canonical_signature(ty, self.catalog),
            role,
        });
    }
}
