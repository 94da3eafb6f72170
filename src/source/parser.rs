//! Declaration-level Solidity parser.
//!
//! Only the parts of a source unit that influence storage are kept: contract
//! headers with their bases, struct/enum/value-type definitions and state
//! variable declarations. Function bodies, events, errors and modifiers are
//! skipped by brace matching.

use super::errors::ParseError;
use super::lexer::{Token, TokenKind};
use crate::layout::{Mutability, Visibility};

/// Type as written in source, before names are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// Elementary or user-defined name; qualified names keep the last segment
    Named { name: String, line: usize },
    Mapping { key: Box<TypeExpr>, value: Box<TypeExpr> },
    Array { element: Box<TypeExpr>, length: Option<Vec<Token>>, line: usize },
    Function { external: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructItem {
    pub name: String,
    pub fields: Vec<(String, TypeExpr)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub name: String,
    pub members: usize,
}

/// `type Name is underlying;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTypeItem {
    pub name: String,
    pub underlying: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarItem {
    pub name: String,
    pub ty: TypeExpr,
    pub visibility: Option<Visibility>,
    pub mutability: Mutability,
    pub init: Option<Vec<Token>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Contract,
    Abstract,
    Interface,
    Library,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractItem {
    pub name: String,
    pub kind: ContractKind,
    /// Direct bases in declaration order
    pub bases: Vec<String>,
    pub variables: Vec<VarItem>,
}

/// Everything storage-relevant found in a source unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceUnit {
    pub contracts: Vec<ContractItem>,
    pub structs: Vec<StructItem>,
    pub enums: Vec<EnumItem>,
    pub value_types: Vec<ValueTypeItem>,
    /// File-level constants
    pub constants: Vec<VarItem>,
}

/// Parse a token stream into a [`SourceUnit`].
pub fn parse_unit(tokens: Vec<Token>) -> Result<SourceUnit, ParseError> {
    let mut parser = Parser { tokens, pos: 0 };
    let mut unit = SourceUnit::default();

    while let Some(tok) = parser.peek() {
        let word = match &tok.kind {
            TokenKind::Ident(word) => word.clone(),
            // stray `;` and the like
            _ => {
                parser.pos += 1;
                continue;
            }
        };
        match word.as_str() {
            "pragma" | "import" | "using" | "event" | "error" => parser.skip_statement()?,
            "function" => parser.skip_function()?,
            "abstract" => {
                parser.pos += 1;
                parser.expect_keyword("contract")?;
                let contract = parser.parse_contract(ContractKind::Abstract, &mut unit)?;
                unit.contracts.push(contract);
            }
            "contract" | "interface" | "library" => {
                let kind = match word.as_str() {
                    "contract" => ContractKind::Contract,
                    "interface" => ContractKind::Interface,
                    _ => ContractKind::Library,
                };
                parser.pos += 1;
                let contract = parser.parse_contract(kind, &mut unit)?;
                unit.contracts.push(contract);
            }
            "struct" => {
                let item = parser.parse_struct()?;
                unit.structs.push(item);
            }
            "enum" => {
                let item = parser.parse_enum()?;
                unit.enums.push(item);
            }
            "type" => {
                let item = parser.parse_value_type()?;
                unit.value_types.push(item);
            }
            _ => {
                let var = parser.parse_variable()?;
                if var.mutability == Mutability::Constant {
                    unit.constants.push(var);
                }
            }
        }
    }

    Ok(unit)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_ident(&self) -> Option<&str> {
        match self.peek_kind() {
            Some(TokenKind::Ident(s)) => Some(s),
            _ => None,
        }
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek_kind() == Some(&TokenKind::Punct(c))
    }

    fn next(&mut self, expected: &'static str) -> Result<Token, ParseError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEof { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    fn unexpected(tok: &Token, expected: &'static str) -> ParseError {
        ParseError::UnexpectedToken { line: tok.line, expected, found: tok.kind.describe() }
    }

    fn expect_punct(&mut self, c: char, expected: &'static str) -> Result<(), ParseError> {
        let tok = self.next(expected)?;
        match tok.kind {
            TokenKind::Punct(p) if p == c => Ok(()),
            _ => Err(Self::unexpected(&tok, expected)),
        }
    }

    fn expect_keyword(&mut self, keyword: &'static str) -> Result<(), ParseError> {
        let tok = self.next(keyword)?;
        match &tok.kind {
            TokenKind::Ident(s) if s == keyword => Ok(()),
            _ => Err(Self::unexpected(&tok, keyword)),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<(String, usize), ParseError> {
        let tok = self.next(expected)?;
        match tok.kind {
            TokenKind::Ident(s) => Ok((s, tok.line)),
            _ => Err(Self::unexpected(&tok, expected)),
        }
    }

    /// Consume up to and including the next `;` outside any brackets.
    fn skip_statement(&mut self) -> Result<(), ParseError> {
        self.collect_until_semicolon().map(|_| ())
    }

    /// Collect tokens up to the next top-level `;`, consuming it.
    fn collect_until_semicolon(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut depth = 0usize;
        let mut collected = Vec::new();
        loop {
            let tok = self.next("`;`")?;
            match tok.kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
                TokenKind::Punct(';') if depth == 0 => return Ok(collected),
                _ => {}
            }
            collected.push(tok);
        }
    }

    /// Skip a balanced `{ ... }` block starting at the current `{`.
    fn skip_block(&mut self) -> Result<(), ParseError> {
        self.expect_punct('{', "`{`")?;
        let mut depth = 1usize;
        while depth > 0 {
            let tok = self.next("`}`")?;
            match tok.kind {
                TokenKind::Punct('{') => depth += 1,
                TokenKind::Punct('}') => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// Skip a balanced parenthesized group starting at the current `(`.
    fn skip_parens(&mut self) -> Result<(), ParseError> {
        self.expect_punct('(', "`(`")?;
        let mut depth = 1usize;
        while depth > 0 {
            let tok = self.next("`)`")?;
            match tok.kind {
                TokenKind::Punct('(') => depth += 1,
                TokenKind::Punct(')') => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// Skip a function-like member: header, then either `;` or a body.
    fn skip_function(&mut self) -> Result<(), ParseError> {
        self.pos += 1;
        loop {
            match self.peek_kind() {
                None => return Err(ParseError::UnexpectedEof { expected: "function body" }),
                Some(TokenKind::Punct('(')) => self.skip_parens()?,
                Some(TokenKind::Punct('{')) => return self.skip_block(),
                Some(TokenKind::Punct(';')) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn parse_contract(
        &mut self,
        kind: ContractKind,
        unit: &mut SourceUnit,
    ) -> Result<ContractItem, ParseError> {
        let (name, _) = self.expect_ident("contract name")?;
        let mut bases = Vec::new();

        if self.peek_ident() == Some("is") {
            self.pos += 1;
            loop {
                let (base, _) = self.parse_path()?;
                bases.push(base);
                if self.at_punct('(') {
                    self.skip_parens()?;
                }
                if self.at_punct(',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        self.expect_punct('{', "`{`")?;
        let mut variables = Vec::new();
        loop {
            let Some(tok) = self.peek().cloned() else {
                return Err(ParseError::UnexpectedEof { expected: "`}`" });
            };
            match &tok.kind {
                TokenKind::Punct('}') => {
                    self.pos += 1;
                    break;
                }
                TokenKind::Punct(_) => self.pos += 1,
                TokenKind::Ident(word) => match word.as_str() {
                    "function" if !self.is_function_type_variable() => self.skip_function()?,
                    "modifier" | "constructor" | "fallback" | "receive" => self.skip_function()?,
                    "event" | "error" | "using" => self.skip_statement()?,
                    "struct" => {
                        let item = self.parse_struct()?;
                        unit.structs.push(item);
                    }
                    "enum" => {
                        let item = self.parse_enum()?;
                        unit.enums.push(item);
                    }
                    "type" => {
                        let item = self.parse_value_type()?;
                        unit.value_types.push(item);
                    }
                    _ => variables.push(self.parse_variable()?),
                },
                _ => return Err(Self::unexpected(&tok, "contract member")),
            }
        }

        Ok(ContractItem { name, kind, bases, variables })
    }

    /// `function (...) ... name;` declares a state variable of function type,
    /// while `function name(...)` and the unnamed pre-0.6 fallback
    /// `function() ... { ... }` declare functions.
    fn is_function_type_variable(&self) -> bool {
        let Some(rest) = self.tokens.get(self.pos + 1..) else {
            return false;
        };
        if rest.first().map(|t| &t.kind) != Some(&TokenKind::Punct('(')) {
            return false;
        }
        let mut depth = 0usize;
        let mut last = None;
        for tok in rest {
            match &tok.kind {
                TokenKind::Punct('(') => depth += 1,
                TokenKind::Punct(')') => depth = depth.saturating_sub(1),
                TokenKind::Punct('{') if depth == 0 => return false,
                TokenKind::Punct('=') if depth == 0 => return true,
                TokenKind::Punct(';') if depth == 0 => return is_variable_name(last),
                _ => {}
            }
            if depth == 0 {
                last = Some(&tok.kind);
            }
        }
        false
    }

    /// `A.B.C`, keeping only the last segment.
    fn parse_path(&mut self) -> Result<(String, usize), ParseError> {
        let (mut name, line) = self.expect_ident("type name")?;
        while self.at_punct('.') {
            self.pos += 1;
            name = self.expect_ident("identifier")?.0;
        }
        Ok((name, line))
    }

    fn parse_struct(&mut self) -> Result<StructItem, ParseError> {
        self.expect_keyword("struct")?;
        let (name, _) = self.expect_ident("struct name")?;
        self.expect_punct('{', "`{`")?;

        let mut fields = Vec::new();
        while !self.at_punct('}') {
            let ty = self.parse_type()?;
            let (field, _) = self.expect_ident("field name")?;
            self.expect_punct(';', "`;`")?;
            fields.push((field, ty));
        }
        self.pos += 1;
        Ok(StructItem { name, fields })
    }

    fn parse_enum(&mut self) -> Result<EnumItem, ParseError> {
        self.expect_keyword("enum")?;
        let (name, _) = self.expect_ident("enum name")?;
        self.expect_punct('{', "`{`")?;

        let mut members = 0;
        loop {
            let tok = self.next("`}`")?;
            match tok.kind {
                TokenKind::Ident(_) => members += 1,
                TokenKind::Punct(',') => {}
                TokenKind::Punct('}') => break,
                _ => return Err(Self::unexpected(&tok, "enum member")),
            }
        }
        Ok(EnumItem { name, members })
    }

    fn parse_value_type(&mut self) -> Result<ValueTypeItem, ParseError> {
        self.expect_keyword("type")?;
        let (name, line) = self.expect_ident("type name")?;
        self.expect_keyword("is")?;
        let (underlying, _) = self.expect_ident("underlying type")?;
        if underlying == "address" && self.peek_ident() == Some("payable") {
            self.pos += 1;
        }
        self.expect_punct(';', "`;`")?;
        Ok(ValueTypeItem { name, underlying, line })
    }

    /// Parse a full type name including array suffixes.
    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let mut ty = match self.peek_ident() {
            Some("mapping") => self.parse_mapping()?,
            Some("function") => self.parse_function_type()?,
            Some(_) => {
                let (name, line) = self.parse_path()?;
                if name == "address" && self.peek_ident() == Some("payable") {
                    self.pos += 1;
                }
                TypeExpr::Named { name, line }
            }
            None => {
                let tok = self.next("type name")?;
                return Err(Self::unexpected(&tok, "type name"));
            }
        };

        while self.at_punct('[') {
            let line = self.next("`[`")?.line;
            let mut length = Vec::new();
            let mut depth = 0usize;
            loop {
                let tok = self.next("`]`")?;
                match tok.kind {
                    TokenKind::Punct('[') => depth += 1,
                    TokenKind::Punct(']') if depth == 0 => break,
                    TokenKind::Punct(']') => depth -= 1,
                    _ => {}
                }
                length.push(tok);
            }
            let length = if length.is_empty() { None } else { Some(length) };
            ty = TypeExpr::Array { element: Box::new(ty), length, line };
        }
        Ok(ty)
    }

    fn parse_mapping(&mut self) -> Result<TypeExpr, ParseError> {
        self.expect_keyword("mapping")?;
        self.expect_punct('(', "`(`")?;
        let key = self.parse_type()?;
        // named mapping parameters: `mapping(address owner => uint256 balance)`
        if self.peek_ident().is_some() {
            self.pos += 1;
        }
        let tok = self.next("`=>`")?;
        if tok.kind != TokenKind::Arrow {
            return Err(Self::unexpected(&tok, "`=>`"));
        }
        let value = self.parse_type()?;
        if self.peek_ident().is_some() {
            self.pos += 1;
        }
        self.expect_punct(')', "`)`")?;
        Ok(TypeExpr::Mapping { key: Box::new(key), value: Box::new(value) })
    }

    /// `function (params) {internal|external|view|pure|payable} [returns (...)]`
    fn parse_function_type(&mut self) -> Result<TypeExpr, ParseError> {
        self.expect_keyword("function")?;
        self.skip_parens()?;
        let mut external = false;
        loop {
            match self.peek_ident() {
                Some("external") => {
                    external = true;
                    self.pos += 1;
                }
                Some("internal" | "view" | "pure" | "payable") => self.pos += 1,
                Some("returns") => {
                    self.pos += 1;
                    self.skip_parens()?;
                }
                _ => break,
            }
        }
        Ok(TypeExpr::Function { external })
    }

    /// `Type {attributes} name [= expr];`
    fn parse_variable(&mut self) -> Result<VarItem, ParseError> {
        let ty = self.parse_type()?;
        let mut visibility = None;
        let mut mutability = Mutability::Mutable;

        let name = loop {
            let (word, _) = self.expect_ident("variable name")?;
            // an attribute keyword directly followed by `;` or `=` is the name itself
            let ends = matches!(self.peek_kind(), Some(TokenKind::Punct(';' | '=')) | None);
            match word.as_str() {
                _ if ends => break word,
                "public" => visibility = Some(Visibility::Public),
                "internal" => visibility = Some(Visibility::Internal),
                "private" => visibility = Some(Visibility::Private),
                "constant" => mutability = Mutability::Constant,
                "immutable" => mutability = Mutability::Immutable,
                "transient" => mutability = Mutability::Transient,
                "override" => {
                    if self.at_punct('(') {
                        self.skip_parens()?;
                    }
                }
                _ => {
                    return Err(match self.peek() {
                        Some(tok) => Self::unexpected(tok, "`;` or `=`"),
                        None => ParseError::UnexpectedEof { expected: "`;`" },
                    })
                }
            }
        };

        let init = if self.at_punct('=') {
            self.pos += 1;
            Some(self.collect_until_semicolon()?)
        } else {
            self.expect_punct(';', "`;`")?;
            None
        };

        Ok(VarItem { name, ty, visibility, mutability, init })
    }
}

/// Whether the token before `;` in a `function (...)` header names a variable.
fn is_variable_name(last: Option<&TokenKind>) -> bool {
    let Some(TokenKind::Ident(word)) = last else {
        return false;
    };
    !matches!(
        word.as_str(),
        "external"
            | "internal"
            | "public"
            | "private"
            | "view"
            | "pure"
            | "payable"
            | "constant"
            | "virtual"
            | "override"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::lexer::tokenize;

    fn parse(source: &str) -> SourceUnit {
        parse_unit(tokenize(source).unwrap()).unwrap()
    }

    fn named(name: &str) -> String {
        name.to_string()
    }

    #[test]
    fn test_contract_header_and_bases() {
        let unit = parse(
            "pragma solidity ^0.8.20;\nimport './A.sol';\n\
             abstract contract Base {}\n\
             contract Token is Base, Ownable(msg.sender), lib.Pausable { }",
        );
        assert_eq!(unit.contracts.len(), 2);
        assert_eq!(unit.contracts[0].kind, ContractKind::Abstract);
        let token = &unit.contracts[1];
        assert_eq!(token.name, "Token");
        assert_eq!(token.bases, vec![named("Base"), named("Ownable"), named("Pausable")]);
    }

    #[test]
    fn test_functions_events_and_modifiers_are_skipped() {
        let unit = parse(
            "contract C {\n\
               event Transfer(address indexed from, address indexed to, uint256 value);\n\
               error Nope(uint256 code);\n\
               modifier only() { require(msg.sender == owner, \"no\"); _; }\n\
               uint256 public total;\n\
               constructor(uint256 t) { total = t; }\n\
               function f(uint a) external view returns (uint) { if (a > 0) { return a; } }\n\
               function g() external;\n\
               receive() external payable {}\n\
               address owner;\n\
             }",
        );
        let names: Vec<_> = unit.contracts[0].variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["total", "owner"]);
        assert_eq!(unit.contracts[0].variables[0].visibility, Some(Visibility::Public));
    }

    #[test]
    fn test_variable_attributes() {
        let unit = parse(
            "contract C {\n\
               uint256 public constant MAX = 10 ** 18;\n\
               address public immutable factory;\n\
               uint256 transient lock;\n\
               uint256 public override(A, B) supply;\n\
               bool transient;\n\
             }",
        );
        let vars = &unit.contracts[0].variables;
        assert_eq!(vars[0].mutability, Mutability::Constant);
        assert!(vars[0].init.is_some());
        assert_eq!(vars[1].mutability, Mutability::Immutable);
        assert_eq!(vars[2].mutability, Mutability::Transient);
        assert_eq!(vars[3].name, "supply");
        assert_eq!(vars[4].name, "transient");
        assert_eq!(vars[4].mutability, Mutability::Mutable);
    }

    #[test]
    fn test_mapping_with_named_parameters_and_arrays() {
        let unit = parse(
            "contract C {\n\
               mapping(address owner => mapping(address spender => uint256 amount)) allowance;\n\
               uint8[3][] grid;\n\
             }",
        );
        let vars = &unit.contracts[0].variables;
        let TypeExpr::Mapping { value, .. } = &vars[0].ty else { panic!("expected mapping") };
        assert!(matches!(**value, TypeExpr::Mapping { .. }));

        let TypeExpr::Array { element, length: None, .. } = &vars[1].ty else {
            panic!("expected dynamic outer array")
        };
        assert!(matches!(**element, TypeExpr::Array { length: Some(_), .. }));
    }

    #[test]
    fn test_structs_enums_and_value_types_collected() {
        let unit = parse(
            "type Price is uint128;\n\
             struct Top { uint a; }\n\
             contract C {\n\
               enum Status { Active, Paused, Closed }\n\
               struct Inner { address who; Status status; }\n\
             }",
        );
        assert_eq!(unit.value_types[0].underlying, "uint128");
        assert_eq!(unit.structs.len(), 2);
        assert_eq!(unit.structs[1].fields.len(), 2);
        assert_eq!(unit.enums[0].members, 3);
    }

    #[test]
    fn test_function_type_variable() {
        let unit = parse(
            "contract C { function (uint256) external returns (bool) public hook; \
             function() internal view cb; }",
        );
        let vars = &unit.contracts[0].variables;
        assert_eq!(vars[0].ty, TypeExpr::Function { external: true });
        assert_eq!(vars[0].name, "hook");
        assert_eq!(vars[1].ty, TypeExpr::Function { external: false });
    }

    #[test]
    fn test_unnamed_legacy_fallback_is_skipped() {
        let unit = parse(
            "contract W {\n\
               uint256 total;\n\
               function() public payable { deposit(); }\n\
               function() external payable;\n\
               function () internal pure returns (uint) next = helper;\n\
               bool open;\n\
             }",
        );
        let names: Vec<_> = unit.contracts[0].variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["total", "next", "open"]);
    }

    #[test]
    fn test_file_level_constants_are_kept() {
        let unit = parse("uint256 constant SIZE = 4;\nfunction helper() pure returns (uint) {}");
        assert_eq!(unit.constants.len(), 1);
        assert_eq!(unit.constants[0].name, "SIZE");
    }

    #[test]
    fn test_missing_semicolon_reports_line() {
        let tokens = tokenize("contract C {\n uint256 a\n uint256 b; }").unwrap();
        let err = parse_unit(tokens).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { line: 3, .. }), "{err:?}");
    }
}
