//! Canonical type signatures.
//!
//! A signature is a deterministic string rendering of a type's shape, used by
//! downstream decoders to interpret raw storage words:
//!
//! ```text
//! uint256                       elementary
//! address[3]                    fixed array
//! bytes32[]                     dynamic array
//! mapping(address=>uint256)     mapping
//! (address,uint96,bool[])       struct, as a tuple of its field signatures
//! ```
//!
//! A struct reached again through a mapping or dynamic array while it is
//! already being rendered is written as `struct Name`, since its tuple would
//! never terminate.

use crate::catalog::{TypeCatalog, TypeRef};

/// Render the canonical signature of `ty`.
pub fn canonical_signature(ty: &TypeRef, catalog: &TypeCatalog) -> String {
    let mut out = String::new();
    let mut stack = Vec::new();
    render(ty, catalog, &mut stack, &mut out);
    out
}

fn render<'a>(
    ty: &'a TypeRef,
    catalog: &'a TypeCatalog,
    stack: &mut Vec<&'a str>,
    out: &mut String,
) {
    match ty {
        TypeRef::Elementary(kind) => out.push_str(&kind.to_string()),
        TypeRef::FixedArray { element, length } => {
            render(element, catalog, stack, out);
            out.push_str(&format!("[{length}]"));
        }
        TypeRef::DynamicArray(element) => {
            render(element, catalog, stack, out);
            out.push_str("[]");
        }
        TypeRef::Mapping { key, value } => {
            out.push_str("mapping(");
            render(key, catalog, stack, out);
            out.push_str("=>");
            render(value, catalog, stack, out);
            out.push(')');
        }
        TypeRef::StructRef(name) => {
            let def = match catalog.get_struct(name) {
                Some(def) if !stack.contains(&name.as_str()) => def,
                _ => {
                    out.push_str("struct ");
                    out.push_str(name);
                    return;
                }
            };

            stack.push(name);
            out.push('(');
            for (i, field) in def.fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render(&field.ty, catalog, stack, out);
            }
            out.push(')');
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Elementary;

    fn el(kind: Elementary) -> TypeRef {
        TypeRef::elementary(kind)
    }

    #[test]
    fn test_elementary_and_arrays() {
        let catalog = TypeCatalog::new();
        assert_eq!(canonical_signature(&el(Elementary::Uint(256)), &catalog), "uint256");
        assert_eq!(
            canonical_signature(&TypeRef::fixed_array(el(Elementary::Address), 3), &catalog),
            "address[3]"
        );
        let nested = TypeRef::fixed_array(TypeRef::dynamic_array(el(Elementary::Uint(8))), 2);
        assert_eq!(canonical_signature(&nested, &catalog), "uint8[][2]");
    }

    #[test]
    fn test_nested_mapping() {
        let catalog = TypeCatalog::new();
        let ty = TypeRef::mapping(
            el(Elementary::Address),
            TypeRef::mapping(el(Elementary::Address), el(Elementary::Uint(256))),
        );
        assert_eq!(
            canonical_signature(&ty, &catalog),
            "mapping(address=>mapping(address=>uint256))"
        );
    }

    #[test]
    fn test_struct_renders_as_tuple() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register_struct(
                "Inner",
                vec![("a".into(), el(Elementary::Bool)), ("b".into(), el(Elementary::String))],
            )
            .unwrap();
        catalog
            .register_struct(
                "Outer",
                vec![
                    ("owner".into(), el(Elementary::Address)),
                    ("inner".into(), TypeRef::struct_ref("Inner")),
                ],
            )
            .unwrap();
        assert_eq!(
            canonical_signature(&TypeRef::struct_ref("Outer"), &catalog),
            "(address,(bool,string))"
        );
    }

    #[test]
    fn test_recursive_struct_through_dynamic_array_terminates() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register_struct(
                "Node",
                vec![
                    ("value".into(), el(Elementary::Uint(256))),
                    ("children".into(), TypeRef::dynamic_array(TypeRef::struct_ref("Node"))),
                ],
            )
            .unwrap();
        assert_eq!(
            canonical_signature(&TypeRef::struct_ref("Node"), &catalog),
            "(uint256,struct Node[])"
        );
    }
}
