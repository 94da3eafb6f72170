//! Type Catalog
//!
//! Normalized, in-memory view of the types a contract source declares:
//! elementary types, user-defined structs, and the compound constructors
//! (fixed/dynamic arrays, mappings) built on top of them.
//!
//! Structs live in an arena indexed by name. A [`TypeRef::StructRef`] only
//! stores the struct's name, so structs may reference each other in any
//! order; references are checked and cyclic containment is rejected by
//! [`TypeCatalog::validate`] once the whole catalog is assembled.
//!
//! A catalog is built per source document and dropped after that document's
//! layout has been resolved.

pub mod errors;

pub use errors::CatalogError;

use crate::constants::ADDRESS_LENGTH;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Built-in value and byte-sequence types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Elementary {
    /// `bool`
    Bool,
    /// `uintN`, width in bits
    Uint(u16),
    /// `intN`, width in bits
    Int(u16),
    /// `address` (and `address payable`)
    Address,
    /// `bytesN`, width in bytes
    FixedBytes(u8),
    /// dynamic `bytes`
    Bytes,
    /// dynamic `string`
    String,
}

impl Elementary {
    /// Parse an elementary type name (`uint`, `int64`, `bytes4`, `byte`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bool" => return Some(Self::Bool),
            "address" => return Some(Self::Address),
            "bytes" => return Some(Self::Bytes),
            "string" => return Some(Self::String),
            "byte" => return Some(Self::FixedBytes(1)),
            "uint" => return Some(Self::Uint(256)),
            "int" => return Some(Self::Int(256)),
            _ => {}
        }

        if let Some(bits) = name.strip_prefix("uint") {
            return parse_int_width(bits).map(Self::Uint);
        }
        if let Some(bits) = name.strip_prefix("int") {
            return parse_int_width(bits).map(Self::Int);
        }
        if let Some(len) = name.strip_prefix("bytes") {
            return match len.parse::<u8>() {
                Ok(n) if (1..=32).contains(&n) && !len.starts_with('0') => {
                    Some(Self::FixedBytes(n))
                }
                _ => None,
            };
        }
        None
    }

    /// Bytes occupied inside a slot, or `None` for `bytes`/`string` which
    /// always take a whole slot of their own.
    pub fn packed_size(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Uint(bits) | Self::Int(bits) => Some(usize::from(*bits) / 8),
            Self::Address => Some(ADDRESS_LENGTH),
            Self::FixedBytes(n) => Some(usize::from(*n)),
            Self::Bytes | Self::String => None,
        }
    }

    /// Whether this is `bytes` or `string`.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Bytes | Self::String)
    }
}

fn parse_int_width(bits: &str) -> Option<u16> {
    if bits.starts_with('0') {
        return None;
    }
    match bits.parse::<u16>() {
        Ok(n) if n % 8 == 0 && (8..=256).contains(&n) => Some(n),
        _ => None,
    }
}

impl fmt::Display for Elementary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Address => f.write_str("address"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
        }
    }
}

/// Reference to a type as written in a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    /// A built-in type
    Elementary(Elementary),
    /// `T[N]`
    FixedArray {
        /// Element type
        element: Box<TypeRef>,
        /// Number of elements
        length: u64,
    },
    /// `T[]`
    DynamicArray(Box<TypeRef>),
    /// `mapping(K => V)`
    Mapping {
        /// Key type
        key: Box<TypeRef>,
        /// Value type
        value: Box<TypeRef>,
    },
    /// A user-defined struct, by name
    StructRef(String),
}

impl TypeRef {
    pub fn elementary(kind: Elementary) -> Self {
        Self::Elementary(kind)
    }

    pub fn fixed_array(element: TypeRef, length: u64) -> Self {
        Self::FixedArray { element: Box::new(element), length }
    }

    pub fn dynamic_array(element: TypeRef) -> Self {
        Self::DynamicArray(Box::new(element))
    }

    pub fn mapping(key: TypeRef, value: TypeRef) -> Self {
        Self::Mapping { key: Box::new(key), value: Box::new(value) }
    }

    pub fn struct_ref(name: impl Into<String>) -> Self {
        Self::StructRef(name.into())
    }

    /// Struct names reachable from this type through any constructor.
    fn referenced_structs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Elementary(_) => {}
            Self::FixedArray { element, .. } | Self::DynamicArray(element) => {
                element.referenced_structs(out)
            }
            Self::Mapping { key, value } => {
                key.referenced_structs(out);
                value.referenced_structs(out);
            }
            Self::StructRef(name) => out.push(name),
        }
    }

    /// Structs stored inline by this type. Mappings and dynamic arrays keep
    /// their elements elsewhere, so they do not count as containment.
    fn contained_structs<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::FixedArray { element, .. } => element.contained_structs(out),
            Self::StructRef(name) => out.push(name),
            Self::Elementary(_) | Self::DynamicArray(_) | Self::Mapping { .. } => {}
        }
    }
}

/// A named struct field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: TypeRef,
}

/// A user-defined struct with its fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<StructField>,
}

/// Arena of struct definitions plus named aliases (enums, value types,
/// contract types) for one source document.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    structs: Vec<StructDef>,
    index: HashMap<String, usize>,
    aliases: HashMap<String, Elementary>,
}

impl TypeCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a struct. Field types naming other structs may be forward
    /// references; they are checked by [`Self::validate`].
    pub fn register_struct(
        &mut self,
        name: impl Into<String>,
        fields: Vec<(String, TypeRef)>,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(CatalogError::DuplicateStruct(name));
        }
        if self.aliases.contains_key(&name) {
            return Err(CatalogError::DuplicateType(name));
        }

        let fields = fields.into_iter().map(|(name, ty)| StructField { name, ty }).collect();
        self.index.insert(name.clone(), self.structs.len());
        self.structs.push(StructDef { name, fields });
        Ok(())
    }

    /// Register an enum with `members` variants. Enums are stored as the
    /// smallest unsigned integer able to hold every variant.
    pub fn register_enum(
        &mut self,
        name: impl Into<String>,
        members: usize,
    ) -> Result<(), CatalogError> {
        let mut bytes = 1u16;
        while bytes < 32 && (members.saturating_sub(1) >> (8 * bytes)) > 0 {
            bytes += 1;
        }
        self.register_alias(name, Elementary::Uint(bytes * 8))
    }

    /// Register a name that stands for an elementary type: user-defined value
    /// types and contract/interface names (stored as addresses).
    pub fn register_alias(
        &mut self,
        name: impl Into<String>,
        underlying: Elementary,
    ) -> Result<(), CatalogError> {
        let name = name.into();
        if self.index.contains_key(&name) || self.aliases.contains_key(&name) {
            return Err(CatalogError::DuplicateType(name));
        }
        self.aliases.insert(name, underlying);
        Ok(())
    }

    /// Whether `name` is already a struct or alias.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Look up a struct definition.
    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        self.index.get(name).map(|&i| &self.structs[i])
    }

    /// Resolve a type name to a [`TypeRef`].
    pub fn resolve_type_ref(&self, name: &str) -> Result<TypeRef, CatalogError> {
        if let Some(kind) = self.lookup_elementary(name) {
            return Ok(TypeRef::Elementary(kind));
        }
        if self.index.contains_key(name) {
            return Ok(TypeRef::StructRef(name.to_string()));
        }
        Err(CatalogError::UnknownType(name.to_string()))
    }

    /// Like [`Self::resolve_type_ref`] but treats unknown names as struct
    /// references to be checked later, allowing forward references while the
    /// catalog is still being assembled.
    pub fn field_type_ref(&self, name: &str) -> TypeRef {
        match self.lookup_elementary(name) {
            Some(kind) => TypeRef::Elementary(kind),
            None => TypeRef::StructRef(name.to_string()),
        }
    }

    fn lookup_elementary(&self, name: &str) -> Option<Elementary> {
        Elementary::parse(name).or_else(|| self.aliases.get(name).copied())
    }

    /// Check that a declared type only references registered structs.
    pub fn check_type_ref(&self, ty: &TypeRef) -> Result<(), CatalogError> {
        let mut names = Vec::new();
        ty.referenced_structs(&mut names);
        match names.into_iter().find(|name| !self.index.contains_key(*name)) {
            Some(missing) => Err(CatalogError::UnknownType(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Validate the assembled catalog: every struct field must resolve, and
    /// no struct may contain itself.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for def in &self.structs {
            for field in &def.fields {
                let mut names = Vec::new();
                field.ty.referenced_structs(&mut names);
                if let Some(missing) = names.into_iter().find(|n| !self.index.contains_key(*n)) {
                    return Err(CatalogError::UnknownFieldType {
                        owner: def.name.clone(),
                        field: field.name.clone(),
                        ty: missing.to_string(),
                    });
                }
            }
        }
        self.detect_cycles()
    }

    /// Depth-first search over the struct containment graph.
    fn detect_cycles(&self) -> Result<(), CatalogError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            catalog: &TypeCatalog,
            node: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Result<(), CatalogError> {
            marks[node] = Mark::InProgress;
            stack.push(node);

            let mut children = Vec::new();
            for field in &catalog.structs[node].fields {
                field.ty.contained_structs(&mut children);
            }
            for child in children {
                let Some(&next) = catalog.index.get(child) else { continue };
                match marks[next] {
                    Mark::Done => {}
                    Mark::InProgress => {
                        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut path: Vec<String> = stack[start..]
                            .iter()
                            .map(|&n| catalog.structs[n].name.clone())
                            .collect();
                        path.push(catalog.structs[next].name.clone());
                        return Err(CatalogError::CyclicStruct { path });
                    }
                    Mark::Unvisited => visit(catalog, next, marks, stack)?,
                }
            }

            stack.pop();
            marks[node] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.structs.len()];
        let mut stack = Vec::new();
        for node in 0..self.structs.len() {
            if marks[node] == Mark::Unvisited {
                visit(self, node, &mut marks, &mut stack)?;
            }
        }
        Ok(())
    }
}
