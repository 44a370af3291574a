//! Hand-written lexer. Streams source bytes to tokens one at a time,
//! tracking line/column/offset and accumulating doc-comments for the
//! next emitted token (§4.1).

use crate::error::{LazyError, LazyErrorKind};
use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    column: u32,
    base_offset: usize,
    pending_doc: Vec<String>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self::with_offset(source, 0)
    }

    /// Like [`Lexer::new`], but every emitted span's byte offset is shifted
    /// by `base_offset`. Used when re-lexing a `${...}` slice captured out
    /// of a larger string literal, so the nested expression's spans still
    /// point into the original source (§3, invariant 1).
    pub fn with_offset(source: &'src str, base_offset: usize) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            base_offset,
            pending_doc: Vec::new(),
        }
    }

    /// Tokenize the entire source up front. The parser wants a `Vec<Token>`
    /// with a cursor it can save/restore for speculative lookahead rather
    /// than a lexer it mutates mid-scan (§9, "two-token lookahead").
    pub fn tokenize(mut self) -> Result<Vec<Token>, LazyError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let rest = &self.source[self.pos..];
        let ch = rest.chars().next()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn make_span(&self, start: usize, start_line: u32, start_col: u32) -> Span {
        Span::new(self.base_offset + start, self.pos - start, start_line, start_col)
    }

    /// Skip whitespace and comments, returning whether any whitespace was
    /// seen and whether it contained a newline. Doc comments (`///`) are
    /// pushed into `pending_doc` rather than returned as tokens.
    fn skip_trivia(&mut self) -> (bool, bool) {
        let mut saw_whitespace = false;
        let mut saw_newline = false;
        loop {
            match self.peek_byte() {
                Some(b' ') | Some(b'\t') => {
                    saw_whitespace = true;
                    self.advance();
                }
                Some(b'\r') | Some(b'\n') => {
                    saw_whitespace = true;
                    saw_newline = true;
                    self.advance();
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'/') => {
                    saw_whitespace = true;
                    if self.peek_byte_at(2) == Some(b'/') {
                        let text = self.consume_doc_comment_line();
                        if text.trim() == "---" {
                            self.pending_doc.push("---".to_string());
                        } else {
                            self.pending_doc.push(text);
                        }
                    } else {
                        self.consume_line_comment();
                    }
                }
                _ => break,
            }
        }
        (saw_whitespace, saw_newline)
    }

    fn consume_line_comment(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b == b'\n' {
                break;
            }
            self.advance();
        }
    }

    fn consume_doc_comment_line(&mut self) -> String {
        // Skip the leading `///`.
        self.advance();
        self.advance();
        self.advance();
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if b == b'\n' {
                break;
            }
            self.advance();
        }
        self.source[start..self.pos].trim().to_string()
    }

    fn take_doc_comment(&mut self) -> Option<String> {
        if self.pending_doc.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_doc).join("\n"))
        }
    }

    fn next_token(&mut self) -> Result<Token, LazyError> {
        let (preceded_by_whitespace, preceded_by_newline) = self.skip_trivia();

        let start = self.pos;
        let start_line = self.line;
        let start_col = self.column;
        let doc_comment = self.take_doc_comment();

        let Some(ch) = self.peek_byte() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: self.make_span(start, start_line, start_col),
                preceded_by_whitespace,
                preceded_by_newline,
                doc_comment,
            });
        };

        let kind = match ch {
            b'(' => {
                self.advance();
                TokenKind::LParen
            }
            b')' => {
                self.advance();
                TokenKind::RParen
            }
            b'[' => {
                self.advance();
                TokenKind::LBracket
            }
            b']' => {
                self.advance();
                TokenKind::RBracket
            }
            b'{' => {
                self.advance();
                TokenKind::LBrace
            }
            b'}' => {
                self.advance();
                TokenKind::RBrace
            }
            b',' => {
                self.advance();
                TokenKind::Comma
            }
            b';' => {
                self.advance();
                TokenKind::Semicolon
            }
            b':' => {
                self.advance();
                TokenKind::Colon
            }
            b'.' => self.lex_dot()?,
            b'-' if self.peek_byte_at(1) == Some(b'>') => {
                self.advance();
                self.advance();
                TokenKind::Arrow
            }
            b'-' => {
                self.advance();
                TokenKind::Minus
            }
            b'=' if self.peek_byte_at(1) == Some(b'=') => {
                self.advance();
                self.advance();
                TokenKind::EqEq
            }
            b'=' => {
                self.advance();
                TokenKind::Eq
            }
            b'!' if self.peek_byte_at(1) == Some(b'=') => {
                self.advance();
                self.advance();
                TokenKind::NotEq
            }
            b'<' if self.peek_byte_at(1) == Some(b'=') => {
                self.advance();
                self.advance();
                TokenKind::LtEq
            }
            b'<' => {
                self.advance();
                TokenKind::Lt
            }
            b'>' if self.peek_byte_at(1) == Some(b'=') => {
                self.advance();
                self.advance();
                TokenKind::GtEq
            }
            b'>' => {
                self.advance();
                TokenKind::Gt
            }
            b'&' if self.peek_byte_at(1) == Some(b'&') => {
                self.advance();
                self.advance();
                TokenKind::AndAnd
            }
            b'&' => {
                self.advance();
                TokenKind::Amp
            }
            b'|' if self.peek_byte_at(1) == Some(b'|') => {
                self.advance();
                self.advance();
                TokenKind::OrOr
            }
            b'+' => {
                self.advance();
                TokenKind::Plus
            }
            b'*' => {
                self.advance();
                TokenKind::Star
            }
            b'/' => {
                self.advance();
                TokenKind::Slash
            }
            b'\\' => {
                self.advance();
                TokenKind::Backslash
            }
            b'"' | b'\'' => self.lex_string(ch)?,
            b'#' => self.lex_symbol(start, start_line, start_col)?,
            b'0'..=b'9' => self.lex_number(),
            c if c.is_ascii_alphabetic() || c == b'_' => self.lex_identifier(),
            _ => {
                let offending = self.advance().unwrap();
                return Err(LazyError::new(
                    LazyErrorKind::UnexpectedCharacter {
                        found: offending.to_string(),
                    },
                    self.make_span(start, start_line, start_col),
                ));
            }
        };

        Ok(Token {
            kind,
            span: self.make_span(start, start_line, start_col),
            preceded_by_whitespace,
            preceded_by_newline,
            doc_comment,
        })
    }

    fn lex_dot(&mut self) -> Result<TokenKind, LazyError> {
        if self.peek_byte_at(1) == Some(b'.') && self.peek_byte_at(2) == Some(b'.') {
            self.advance();
            self.advance();
            self.advance();
            return Ok(TokenKind::DotDotDot);
        }
        if self.peek_byte_at(1) == Some(b'.') {
            self.advance();
            self.advance();
            return Ok(TokenKind::DotDot);
        }
        self.advance();
        if self.peek_byte() == Some(b'{') {
            self.advance();
            Ok(TokenKind::DotBrace)
        } else {
            Ok(TokenKind::Dot)
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
            self.advance();
        }
        // An embedded `.` only promotes to float if followed by another
        // digit; otherwise it's a separate `.` token (field access on an
        // integer literal, or a range operator).
        if self.peek_byte() == Some(b'.') && matches!(self.peek_byte_at(1), Some(b'0'..=b'9')) {
            self.advance();
            while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                self.advance();
            }
            let text = &self.source[start..self.pos];
            return TokenKind::Float(text.parse().unwrap_or(0.0));
        }
        let text = &self.source[start..self.pos];
        match text.parse::<i64>() {
            Ok(n) => TokenKind::Integer(n),
            Err(_) => TokenKind::Float(text.parse().unwrap_or(0.0)),
        }
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        TokenKind::Identifier(self.source[start..self.pos].to_string())
    }

    fn lex_symbol(
        &mut self,
        start: usize,
        start_line: u32,
        start_col: u32,
    ) -> Result<TokenKind, LazyError> {
        self.advance(); // consume '#'
        let name_start = self.pos;
        while matches!(self.peek_byte(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        if self.pos == name_start {
            return Err(LazyError::new(
                LazyErrorKind::UnexpectedCharacter {
                    found: "#".to_string(),
                },
                self.make_span(start, start_line, start_col),
            ));
        }
        Ok(TokenKind::Symbol(self.source[name_start..self.pos].to_string()))
    }

    /// String literals do no escape processing at the lex level; that is
    /// the job of the interpolation scanner in the parser (§4.1, §4.2).
    fn lex_string(&mut self, quote: u8) -> Result<TokenKind, LazyError> {
        let open_start = self.pos;
        let open_line = self.line;
        let open_col = self.column;
        self.advance(); // consume opening quote
        let content_start = self.pos;
        loop {
            match self.peek_byte() {
                None => {
                    return Err(LazyError::new(
                        LazyErrorKind::UnterminatedString,
                        self.make_span(open_start, open_line, open_col),
                    ));
                }
                Some(b) if b == quote => {
                    let content = self.source[content_start..self.pos].to_string();
                    self.advance(); // consume closing quote
                    return Ok(TokenKind::String(content));
                }
                Some(b'\\') => {
                    self.advance();
                    if self.peek_byte().is_some() {
                        self.advance();
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_integers_and_floats() {
        assert_eq!(kinds("1.5"), vec![TokenKind::Float(1.5), TokenKind::Eof]);
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Integer(1),
                TokenKind::DotDot,
                TokenKind::Integer(5),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn dot_zero_is_two_tokens() {
        assert_eq!(
            kinds("x.0"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Dot,
                TokenKind::Integer(0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn longest_match_operators() {
        assert_eq!(
            kinds("a->b==c"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Arrow,
                TokenKind::Identifier("b".into()),
                TokenKind::EqEq,
                TokenKind::Identifier("c".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn doc_comments_attach_to_next_token_not_emitted() {
        let tokens = Lexer::new("/// hello\nx").tokenize().unwrap();
        // Only `x` and Eof are emitted as tokens.
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].doc_comment.as_deref(), Some("hello"));
    }

    #[test]
    fn symbol_literal() {
        assert_eq!(kinds("#ok"), vec![TokenKind::Symbol("ok".into()), TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_errors() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(matches!(err.kind, LazyErrorKind::UnterminatedString));
    }

    #[test]
    fn preceded_by_newline_flag() {
        let tokens = Lexer::new("a\nb").tokenize().unwrap();
        assert!(!tokens[0].preceded_by_newline);
        assert!(tokens[1].preceded_by_newline);
    }

    #[test]
    fn dot_brace_is_single_token_without_whitespace() {
        assert_eq!(kinds("x.{a}"), vec![
            TokenKind::Identifier("x".into()),
            TokenKind::DotBrace,
            TokenKind::Identifier("a".into()),
            TokenKind::RBrace,
            TokenKind::Eof,
        ]);
    }
}
