use super::errors::ParseError;
use logos::Logos;

/// A lexical token with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Logos)]
#[logos(skip r"\s+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"[0-9][0-9a-zA-Z_.]*", |lex| lex.slice().to_string())]
    Number(String),
    /// String literal, contents are not kept
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#)]
    Str,
    /// `=>`
    #[token("=>")]
    Arrow,
    /// Opens a block comment; consumed by [`tokenize`]
    #[token("/*")]
    CommentStart,
    /// Any other single punctuation character
    #[regex(r#"[^a-zA-Z0-9_$\s"']"#, |lex| lex.slice().chars().next())]
    Punct(char),
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(s) | Self::Number(s) => s.clone(),
            Self::Str => "string literal".to_string(),
            Self::Arrow => "=>".to_string(),
            Self::CommentStart => "/*".to_string(),
            Self::Punct(c) => c.to_string(),
        }
    }
}

/// Line numbers derived from byte offsets, scanning forward only.
struct LineCounter<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, offset: 0, line: 1 }
    }

    fn line_at(&mut self, offset: usize) -> usize {
        let skipped = &self.source.as_bytes()[self.offset..offset];
        self.line += skipped.iter().filter(|&&b| b == b'\n').count();
        self.offset = offset;
        self.line
    }
}

/// Split Solidity source into tokens, dropping whitespace and comments.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = TokenKind::lexer(source);
    let mut lines = LineCounter::new(source);
    let mut tokens = Vec::new();

    while let Some(next) = lexer.next() {
        let line = lines.line_at(lexer.span().start);
        match next {
            Ok(TokenKind::CommentStart) => {
                let Some(end) = lexer.remainder().find("*/") else {
                    return Err(ParseError::UnterminatedComment { line });
                };
                lexer.bump(end + 2);
            }
            Ok(kind) => tokens.push(Token { kind, line }),
            Err(()) if lexer.slice().starts_with(['"', '\'']) => {
                return Err(ParseError::UnterminatedString { line })
            }
            Err(()) => {
                return Err(ParseError::UnexpectedToken {
                    line,
                    expected: "token",
                    found: lexer.slice().to_string(),
                })
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_comments_are_dropped() {
        let toks = kinds("uint a; // trailing\n/* block\n comment */ bool b;");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("uint".into()),
                TokenKind::Ident("a".into()),
                TokenKind::Punct(';'),
                TokenKind::Ident("bool".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Punct(';'),
            ]
        );
    }

    #[test]
    fn test_block_comment_with_stars() {
        let toks = kinds("/** natspec\n * @dev x\n **/ uint a;");
        assert_eq!(toks[0], TokenKind::Ident("uint".into()));
        assert_eq!(toks.len(), 3);
    }

    #[test]
    fn test_arrow_numbers_and_strings() {
        let toks = kinds(r#"mapping(address=>uint) x = 1_000e18; string s = "a\"b";"#);
        assert!(toks.contains(&TokenKind::Arrow));
        assert!(toks.contains(&TokenKind::Number("1_000e18".into())));
        assert!(toks.contains(&TokenKind::Str));
        assert!(toks.contains(&TokenKind::Punct('=')));
    }

    #[test]
    fn test_identifiers_with_dollar() {
        let expected = vec![TokenKind::Ident("$x".into()), TokenKind::Ident("_y".into())];
        assert_eq!(kinds("$x _y"), expected);
    }

    #[test]
    fn test_line_numbers_track_newlines() {
        let toks = tokenize("a\n/*\n\n*/b\nc").unwrap();
        let lines: Vec<_> = toks.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 4, 5]);
    }

    #[test]
    fn test_unterminated_literals_fail() {
        assert_eq!(
            tokenize("uint a; /* open").unwrap_err(),
            ParseError::UnterminatedComment { line: 1 }
        );
        assert_eq!(
            tokenize("\nstring s = \"open").unwrap_err(),
            ParseError::UnterminatedString { line: 2 }
        );
    }
}
