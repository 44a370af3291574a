//! Token kinds and the per-token layout metadata the parser depends on.

use std::fmt;

/// A location in a single source file: byte offset + length, plus the
/// 1-based line/column of the first byte. Every AST and pattern node
/// carries one of these so the error reporter never has to re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub length: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(offset: usize, length: usize, line: u32, column: u32) -> Self {
        Self {
            offset,
            length,
            line,
            column,
        }
    }

    /// The smallest span covering both `self` and `other`. Used to build a
    /// span for a composite node from its first and last child spans.
    pub fn merge(self, other: Span) -> Span {
        let start = self.offset.min(other.offset);
        let end = (self.offset + self.length).max(other.offset + other.length);
        // Preserve the line/column of whichever span starts first.
        let (line, column) = if self.offset <= other.offset {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Span {
            offset: start,
            length: end - start,
            line,
            column,
        }
    }

    pub fn end(self) -> usize {
        self.offset + self.length
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Identifier(String),

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Dot,
    DotBrace, // `.{` with no intervening whitespace, used for field projection

    // Operators, longest-match first at the lexer level.
    Arrow,      // ->
    EqEq,       // ==
    NotEq,      // !=
    LtEq,       // <=
    GtEq,       // >=
    AndAnd,     // &&
    OrOr,       // ||
    DotDotDot,  // ...
    DotDot,     // ..
    Eq,         // =
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,        // &
    Backslash,  // \  (pipeline)

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Integer(_) => "integer literal",
            TokenKind::Float(_) => "float literal",
            TokenKind::String(_) => "string literal",
            TokenKind::Symbol(_) => "symbol literal",
            TokenKind::Identifier(_) => "identifier",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Colon => "':'",
            TokenKind::Dot => "'.'",
            TokenKind::DotBrace => "'.{'",
            TokenKind::Arrow => "'->'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::LtEq => "'<='",
            TokenKind::GtEq => "'>='",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::DotDotDot => "'...'",
            TokenKind::DotDot => "'..'",
            TokenKind::Eq => "'='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Amp => "'&'",
            TokenKind::Backslash => "'\\'",
            TokenKind::Eof => "end of input",
        }
    }
}

/// Keywords are lexed as plain identifiers; the parser recognizes them
/// contextually (§4.1). This list exists so call sites can ask "is this
/// identifier reserved here" without hard-coding string literals everywhere.
pub const KEYWORDS: &[&str] = &[
    "if", "then", "else", "when", "matches", "otherwise", "for", "in", "import", "where", "do",
    "true", "false", "null", "unless",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub preceded_by_whitespace: bool,
    pub preceded_by_newline: bool,
    pub doc_comment: Option<String>,
}

impl Token {
    pub fn is_identifier(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(s) if s == name)
    }
}
