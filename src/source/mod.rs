//! Contract source → declarations.
//!
//! The onboarding pipeline only needs two things from verified source: the
//! [`TypeCatalog`] of user-defined types and the ordered list of state
//! variable declarations of the deployed contract. [`SourceParser`] is the
//! boundary; [`SolidityParser`] is the implementation used in production.
//!
//! Inherited storage comes first: bases are linearized (C3, most base first)
//! and each contract's own declarations are appended in that order.

pub mod errors;
pub mod lexer;
pub mod parser;

pub use errors::ParseError;

use crate::catalog::{CatalogError, Elementary, TypeCatalog, TypeRef};
use crate::layout::{Mutability, StateVariableDecl};
use lexer::{Token, TokenKind};
use parser::{ContractItem, ContractKind, SourceUnit, TypeExpr};
use std::collections::{HashMap, HashSet};

/// Declarations extracted from one source document.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    /// Name of the contract whose storage was collected
    pub contract: String,
    pub catalog: TypeCatalog,
    /// Declarations in allocation order, inherited ones first
    pub variables: Vec<StateVariableDecl>,
}

/// Turns contract source into a type catalog and state variable list.
pub trait SourceParser: Send + Sync {
    /// Parse `source`. `contract` selects the deployed contract when the
    /// source declares several.
    fn parse(&self, source: &str, contract: Option<&str>) -> Result<ParsedSource, ParseError>;
}

/// Declaration-level Solidity parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolidityParser;

impl SourceParser for SolidityParser {
    fn parse(&self, source: &str, contract: Option<&str>) -> Result<ParsedSource, ParseError> {
        let tokens = lexer::tokenize(source)?;
        let unit = parser::parse_unit(tokens)?;
        lower(&unit, contract)
    }
}

/// Resolve names in a parsed unit and collect the target contract's storage.
fn lower(unit: &SourceUnit, target: Option<&str>) -> Result<ParsedSource, ParseError> {
    let mut lowering = Lowering::new(unit);
    lowering.register_types()?;

    let contracts: HashMap<&str, &ContractItem> =
        unit.contracts.iter().map(|c| (c.name.as_str(), c)).collect();
    let target = select_target(unit, target)?;
    let order = linearize(&target.name, &contracts, &mut Vec::new())?;

    let mut variables = Vec::new();
    for name in order.iter().rev() {
        let contract = contracts[name.as_str()];
        for var in &contract.variables {
            let ty = lowering.lower_type(&var.ty)?;
            variables.push(StateVariableDecl {
                index: variables.len(),
                name: var.name.clone(),
                ty,
                visibility: var.visibility,
                mutability: var.mutability,
            });
        }
    }

    lowering.catalog.validate()?;
    Ok(ParsedSource { contract: target.name.clone(), catalog: lowering.catalog, variables })
}

fn select_target<'a>(
    unit: &'a SourceUnit,
    target: Option<&str>,
) -> Result<&'a ContractItem, ParseError> {
    match target {
        Some(name) => unit
            .contracts
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ParseError::ContractNotFound(name.to_string())),
        None => unit
            .contracts
            .iter()
            .rev()
            .find(|c| matches!(c.kind, ContractKind::Contract))
            .ok_or(ParseError::NoContract),
    }
}

/// C3 linearization, most derived first. Solidity lists bases from "most
/// base-like" to "most derived", so they are merged right to left.
fn linearize(
    name: &str,
    contracts: &HashMap<&str, &ContractItem>,
    visiting: &mut Vec<String>,
) -> Result<Vec<String>, ParseError> {
    if visiting.iter().any(|v| v == name) {
        return Err(ParseError::Linearization(name.to_string()));
    }
    let contract = contracts[name];

    visiting.push(name.to_string());
    let mut sequences = Vec::new();
    for base in contract.bases.iter().rev() {
        if !contracts.contains_key(base.as_str()) {
            return Err(ParseError::UnknownBase {
                contract: name.to_string(),
                base: base.clone(),
            });
        }
        sequences.push(linearize(base, contracts, visiting)?);
    }
    visiting.pop();
    sequences.push(contract.bases.iter().rev().cloned().collect());

    let mut result = vec![name.to_string()];
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }

        let head = sequences
            .iter()
            .map(|s| &s[0])
            .find(|candidate| sequences.iter().all(|s| !s[1..].contains(candidate)))
            .cloned()
            .ok_or_else(|| ParseError::Linearization(name.to_string()))?;

        for seq in &mut sequences {
            if seq[0] == head {
                seq.remove(0);
            }
        }
        result.push(head);
    }
}

struct Lowering<'a> {
    unit: &'a SourceUnit,
    catalog: TypeCatalog,
    /// Integer constants usable as array lengths
    constants: HashMap<&'a str, &'a [Token]>,
}

impl<'a> Lowering<'a> {
    fn new(unit: &'a SourceUnit) -> Self {
        let mut constants = HashMap::new();
        let contract_constants = unit.contracts.iter().flat_map(|c| c.variables.iter());
        for var in unit.constants.iter().chain(contract_constants) {
            if let (Mutability::Constant, Some(init)) = (var.mutability, &var.init) {
                constants.insert(var.name.as_str(), init.as_slice());
            }
        }
        Self { unit, catalog: TypeCatalog::new(), constants }
    }

    /// Register contract names, enums and value types, then structs.
    fn register_types(&mut self) -> Result<(), ParseError> {
        let unit = self.unit;
        for contract in &unit.contracts {
            self.catalog.register_alias(contract.name.clone(), Elementary::Address)?;
        }
        for item in &unit.enums {
            self.catalog.register_enum(item.name.clone(), item.members)?;
        }
        for item in &unit.value_types {
            let underlying = Elementary::parse(&item.underlying)
                .ok_or_else(|| CatalogError::UnknownType(item.underlying.clone()))?;
            self.catalog.register_alias(item.name.clone(), underlying)?;
        }

        let mut seen: HashMap<&str, Vec<(String, TypeRef)>> = HashMap::new();
        for item in &unit.structs {
            let mut fields = Vec::with_capacity(item.fields.len());
            for (name, ty) in &item.fields {
                fields.push((name.clone(), self.lower_type(ty)?));
            }
            // the same struct appears twice when flattened sources repeat a file
            if let Some(previous) = seen.get(item.name.as_str()) {
                if *previous == fields {
                    continue;
                }
            }
            self.catalog.register_struct(item.name.clone(), fields.clone())?;
            seen.insert(item.name.as_str(), fields);
        }
        Ok(())
    }

    fn lower_type(&self, ty: &TypeExpr) -> Result<TypeRef, ParseError> {
        Ok(match ty {
            TypeExpr::Named { name, .. } => self.catalog.field_type_ref(name),
            TypeExpr::Function { external } => {
                // internal: 8-byte code pointer; external: address + selector
                TypeRef::Elementary(Elementary::FixedBytes(if *external { 24 } else { 8 }))
            }
            TypeExpr::Mapping { key, value } => {
                TypeRef::mapping(self.lower_type(key)?, self.lower_type(value)?)
            }
            TypeExpr::Array { element, length: None, .. } => {
                TypeRef::dynamic_array(self.lower_type(element)?)
            }
            TypeExpr::Array { element, length: Some(expr), line } => {
                let length = self.eval_length(expr, &mut HashSet::new()).ok_or_else(|| {
                    ParseError::InvalidArrayLength { line: *line, expr: render(expr) }
                })?;
                TypeRef::fixed_array(self.lower_type(element)?, length)
            }
        })
    }

    fn eval_length(&self, tokens: &[Token], visiting: &mut HashSet<&'a str>) -> Option<u64> {
        let mut pos = 0;
        let value = self.eval_sum(tokens, &mut pos, visiting)?;
        if pos != tokens.len() {
            return None;
        }
        u64::try_from(value).ok()
    }

    fn eval_sum(
        &self,
        t: &[Token],
        pos: &mut usize,
        visiting: &mut HashSet<&'a str>,
    ) -> Option<u128> {
        let mut acc = self.eval_product(t, pos, visiting)?;
        while let Some(TokenKind::Punct(op @ ('+' | '-'))) = t.get(*pos).map(|t| &t.kind) {
            *pos += 1;
            let rhs = self.eval_product(t, pos, visiting)?;
            acc = if *op == '+' { acc.checked_add(rhs)? } else { acc.checked_sub(rhs)? };
        }
        Some(acc)
    }

    fn eval_product(
        &self,
        t: &[Token],
        pos: &mut usize,
        visiting: &mut HashSet<&'a str>,
    ) -> Option<u128> {
        let mut acc = self.eval_atom(t, pos, visiting)?;
        loop {
            let next = t.get(*pos + 1).map(|t| &t.kind);
            match t.get(*pos).map(|t| &t.kind) {
                Some(TokenKind::Punct('*')) if next == Some(&TokenKind::Punct('*')) => {
                    *pos += 2;
                    let exp = self.eval_atom(t, pos, visiting)?;
                    acc = acc.checked_pow(u32::try_from(exp).ok()?)?;
                }
                Some(TokenKind::Punct('*')) => {
                    *pos += 1;
                    acc = acc.checked_mul(self.eval_atom(t, pos, visiting)?)?;
                }
                Some(TokenKind::Punct('/')) => {
                    *pos += 1;
                    acc = acc.checked_div(self.eval_atom(t, pos, visiting)?)?;
                }
                _ => return Some(acc),
            }
        }
    }

    fn eval_atom(
        &self,
        t: &[Token],
        pos: &mut usize,
        visiting: &mut HashSet<&'a str>,
    ) -> Option<u128> {
        let tok = t.get(*pos)?;
        *pos += 1;
        match &tok.kind {
            TokenKind::Number(text) => parse_number(text),
            TokenKind::Ident(name) => {
                let (&key, init) = self.constants.get_key_value(name.as_str())?;
                if !visiting.insert(key) {
                    return None;
                }
                let value = self.eval_length(init, visiting).map(u128::from);
                visiting.remove(key);
                value
            }
            TokenKind::Punct('(') => {
                let value = self.eval_sum(t, pos, visiting)?;
                match t.get(*pos).map(|t| &t.kind) {
                    Some(TokenKind::Punct(')')) => {
                        *pos += 1;
                        Some(value)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Integer literal: decimal with `_` separators, hex, or scientific `2e3`.
fn parse_number(text: &str) -> Option<u128> {
    let text = text.replace('_', "");
    if let Some(hex) = text.strip_prefix("0x") {
        return u128::from_str_radix(hex, 16).ok();
    }
    if let Some((mantissa, exp)) = text.split_once(['e', 'E']) {
        let mantissa: u128 = mantissa.parse().ok()?;
        let exp: u32 = exp.parse().ok()?;
        return mantissa.checked_mul(10u128.checked_pow(exp)?);
    }
    text.parse().ok()
}

fn render(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.kind.describe()).collect::<Vec<_>>().join(" ")
}
