//! Recursive-descent parser with operator-precedence climbing (§4.2).
//!
//! The lexer pre-tokenizes the whole source into a `Vec<Token>` (§9,
//! "two-token lookahead"), so speculative parses never mutate shared
//! lexer state: `mark()`/`restore()` are plain index saves.

use crate::ast::*;
use crate::error::{LazyError, LazyErrorKind};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

const APPLICATION_STOP_KEYWORDS: &[&str] = &[
    "then", "else", "matches", "otherwise", "where", "for", "in", "when", "if", "unless",
];

pub fn parse(source: &str) -> Result<Expr, LazyError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// A saved cursor position plus enough lexer-adjacent state (here: just
/// the index, since doc-comments are carried on tokens themselves, not
/// mutated during scanning) to restore a speculative parse exactly.
struct Mark(usize);

impl Parser {
    fn mark(&self) -> Mark {
        Mark(self.pos)
    }

    fn restore(&mut self, mark: Mark) {
        self.pos = mark.0;
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_keyword(&self, word: &str) -> bool {
        self.peek().is_identifier(word)
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, LazyError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe().to_string(), context))
        }
    }

    fn expect_eof(&mut self) -> Result<(), LazyError> {
        if self.peek().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of input".to_string(), "top level"))
        }
    }

    fn unexpected(&self, expected: String, context: &str) -> LazyError {
        let tok = self.peek();
        LazyError::new(
            LazyErrorKind::UnexpectedToken {
                expected,
                found: tok.kind.describe().to_string(),
                context: context.to_string(),
            },
            tok.span,
        )
    }

    // ------------------------------------------------------------------
    // Top-level expression dispatch
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, LazyError> {
        if let Some(expr) = self.try_parse_let()? {
            return Ok(expr);
        }
        if let Some(expr) = self.try_parse_lambda()? {
            return Ok(expr);
        }
        if self.check_keyword("if") {
            return self.parse_if();
        }
        if self.check_keyword("when") {
            return self.parse_when_matches();
        }
        self.parse_where_suffix()
    }

    fn parse_where_suffix(&mut self) -> Result<Expr, LazyError> {
        let expr = self.parse_pipeline()?;
        if self.check_keyword("where") {
            self.advance();
            let mut bindings = Vec::new();
            loop {
                let doc = self.peek().doc_comment.clone();
                let pattern = self.parse_pattern()?;
                self.expect(TokenKind::Eq, "where binding")?;
                let value = self.parse_pipeline()?;
                bindings.push(WhereBinding { pattern, value, doc });
                if self.check(&TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
            let span = expr.location.merge(bindings.last().unwrap().value.location);
            return Ok(Expr::new(
                ExprKind::WhereExpr {
                    expr: Box::new(expr),
                    bindings,
                },
                span,
            ));
        }
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // let / lambda disambiguation (§4.2, backtracking lookahead)
    // ------------------------------------------------------------------

    /// Accepts both the bare grammar rule `pattern = value; body` and the
    /// `let pattern = value; body` surface form used throughout the end-
    /// to-end examples (§8); `let` itself binds nothing and is simply
    /// consumed when present.
    fn try_parse_let(&mut self) -> Result<Option<Expr>, LazyError> {
        let mark = self.mark();
        let had_let_keyword = self.check_keyword("let");
        if had_let_keyword {
            self.advance();
        }
        let doc = self.peek().doc_comment.clone();
        let Ok(pattern) = self.parse_pattern() else {
            self.restore(mark);
            return Ok(None);
        };
        if !self.check(&TokenKind::Eq) {
            self.restore(mark);
            return Ok(None);
        }
        self.advance(); // consume '='
        let value = self.parse_expr()?;
        if self.check(&TokenKind::Semicolon) {
            self.advance();
        }
        let body = self.parse_expr()?;
        let span = pattern.location.merge(body.location);
        Ok(Some(Expr::new(
            ExprKind::Let {
                pattern: Box::new(pattern),
                value: Box::new(value),
                body: Box::new(body),
                doc,
            },
            span,
        )))
    }

    /// Accepts both bare `pattern -> body` and the Haskell-style
    /// `\pattern -> body` (the leading backslash does not collide with
    /// the infix pipeline operator: pipeline only ever appears after an
    /// already-parsed left operand).
    fn try_parse_lambda(&mut self) -> Result<Option<Expr>, LazyError> {
        let mark = self.mark();
        if self.check(&TokenKind::Backslash) {
            self.advance();
        }
        let Ok(pattern) = self.parse_pattern() else {
            self.restore(mark);
            return Ok(None);
        };
        if !self.check(&TokenKind::Arrow) {
            self.restore(mark);
            return Ok(None);
        }
        self.advance(); // consume '->'
        let body = self.parse_expr()?;
        let span = pattern.location.merge(body.location);
        Ok(Some(Expr::new(
            ExprKind::Lambda {
                param: Box::new(pattern),
                body: Box::new(body),
            },
            span,
        )))
    }

    fn parse_if(&mut self) -> Result<Expr, LazyError> {
        let start = self.advance().span; // 'if'
        let cond = self.parse_expr()?;
        self.expect_keyword("then")?;
        let then_branch = self.parse_expr()?;
        let (else_branch, end_span) = if self.check_keyword("else") {
            self.advance();
            let e = self.parse_expr()?;
            let span = e.location;
            (Some(Box::new(e)), span)
        } else {
            (None, then_branch.location)
        };
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            start.merge(end_span),
        ))
    }

    fn parse_when_matches(&mut self) -> Result<Expr, LazyError> {
        let start = self.advance().span; // 'when'
        let value = self.parse_pipeline()?;
        self.expect_keyword("matches")?;
        let mut branches = Vec::new();
        let mut otherwise = None;
        loop {
            if self.check_keyword("otherwise") {
                self.advance();
                otherwise = Some(Box::new(self.parse_expr()?));
                break;
            }
            let pattern = self.parse_pattern()?;
            self.expect_keyword("then")?;
            let result = self.parse_pipeline()?;
            branches.push(WhenBranch { pattern, result });
            if self.check(&TokenKind::Semicolon) {
                self.advance();
                continue;
            }
            break;
        }
        let end_span = otherwise
            .as_ref()
            .map(|e| e.location)
            .or_else(|| branches.last().map(|b| b.result.location))
            .unwrap_or(start);
        Ok(Expr::new(
            ExprKind::WhenMatches {
                value: Box::new(value),
                branches,
                otherwise,
            },
            start.merge(end_span),
        ))
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), LazyError> {
        if self.check_keyword(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(format!("'{word}'"), "keyword"))
        }
    }

    // ------------------------------------------------------------------
    // Binary operator precedence climbing (§4.2)
    // ------------------------------------------------------------------

    fn parse_pipeline(&mut self) -> Result<Expr, LazyError> {
        self.parse_binary(2)
    }

    fn binding_power(&self) -> Option<(u8, BinOpKind)> {
        Some(match &self.peek().kind {
            TokenKind::Backslash => (2, BinOpKind::Op(BinaryOp::Pipeline)),
            TokenKind::OrOr => (3, BinOpKind::Op(BinaryOp::Or)),
            TokenKind::AndAnd => (4, BinOpKind::Op(BinaryOp::And)),
            TokenKind::EqEq => (5, BinOpKind::Op(BinaryOp::Eq)),
            TokenKind::NotEq => (5, BinOpKind::Op(BinaryOp::NotEq)),
            TokenKind::Lt => (5, BinOpKind::Op(BinaryOp::Lt)),
            TokenKind::Gt => (5, BinOpKind::Op(BinaryOp::Gt)),
            TokenKind::LtEq => (5, BinOpKind::Op(BinaryOp::Le)),
            TokenKind::GtEq => (5, BinOpKind::Op(BinaryOp::Ge)),
            TokenKind::Amp => (6, BinOpKind::Op(BinaryOp::Merge)),
            TokenKind::DotDot => (6, BinOpKind::Range { inclusive: true }),
            TokenKind::DotDotDot => (6, BinOpKind::Range { inclusive: false }),
            TokenKind::Plus => (7, BinOpKind::Op(BinaryOp::Add)),
            TokenKind::Minus => (7, BinOpKind::Op(BinaryOp::Sub)),
            TokenKind::Star => (8, BinOpKind::Op(BinaryOp::Mul)),
            TokenKind::Slash => (8, BinOpKind::Op(BinaryOp::Div)),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, LazyError> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((prec, kind)) = self.binding_power() else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = prec + 1; // every operator here is left-associative
            left = match kind {
                BinOpKind::Range { inclusive } => {
                    let end = self.parse_binary(next_min)?;
                    let span = left.location.merge(end.location);
                    Expr::new(
                        ExprKind::Range {
                            start: Box::new(left),
                            end: Box::new(end),
                            inclusive,
                        },
                        span,
                    )
                }
                BinOpKind::Op(BinaryOp::Pipeline) => {
                    let right = if let Some(lambda) = self.try_parse_lambda()? {
                        lambda
                    } else {
                        self.parse_binary(next_min)?
                    };
                    let span = left.location.merge(right.location);
                    Expr::new(
                        ExprKind::Binary {
                            op: BinaryOp::Pipeline,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    )
                }
                BinOpKind::Op(op) => {
                    let right = self.parse_binary(next_min)?;
                    let span = left.location.merge(right.location);
                    Expr::new(
                        ExprKind::Binary {
                            op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    )
                }
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, LazyError> {
        if self.check(&TokenKind::Minus) {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.merge(operand.location);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_application()
    }

    // ------------------------------------------------------------------
    // Application (left-associative juxtaposition, §4.2)
    // ------------------------------------------------------------------

    fn parse_application(&mut self) -> Result<Expr, LazyError> {
        let mut expr = self.parse_postfixed_primary()?;
        loop {
            if self.check_keyword("do") {
                self.advance();
                let arg = self.parse_expr()?;
                let span = expr.location.merge(arg.location);
                expr = Expr::new(
                    ExprKind::Application {
                        function: Box::new(expr),
                        argument: Box::new(arg),
                    },
                    span,
                );
                break;
            }
            if !self.can_continue_application() {
                break;
            }
            let arg = self.parse_argument()?;
            let span = expr.location.merge(arg.location);
            expr = Expr::new(
                ExprKind::Application {
                    function: Box::new(expr),
                    argument: Box::new(arg),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn can_continue_application(&self) -> bool {
        let tok = self.peek();
        if tok.preceded_by_newline {
            return false;
        }
        if let TokenKind::Identifier(name) = &tok.kind {
            if APPLICATION_STOP_KEYWORDS.contains(&name.as_str()) || name == "do" {
                return false;
            }
            return true;
        }
        matches!(
            tok.kind,
            TokenKind::Integer(_)
                | TokenKind::Float(_)
                | TokenKind::String(_)
                | TokenKind::Symbol(_)
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Dot
        )
    }

    /// Parses one application argument. A `.name` preceded by whitespace
    /// is a field-accessor function rather than a field access on `expr`
    /// (that case is handled in [`Self::parse_postfixed_primary`]); a
    /// `[ ... ]` preceded by whitespace is an array literal argument.
    fn parse_argument(&mut self) -> Result<Expr, LazyError> {
        if self.check(&TokenKind::Dot) && self.peek().preceded_by_whitespace {
            return self.parse_field_accessor();
        }
        self.parse_postfixed_primary()
    }

    fn parse_field_accessor(&mut self) -> Result<Expr, LazyError> {
        let start = self.peek().span;
        let mut fields = Vec::new();
        let mut end = start;
        while self.check(&TokenKind::Dot) {
            self.advance();
            let name_tok = self.expect_identifier("field accessor")?;
            end = name_tok.span;
            if let TokenKind::Identifier(name) = name_tok.kind {
                fields.push(name);
            }
        }
        Ok(Expr::new(ExprKind::FieldAccessor { fields }, start.merge(end)))
    }

    fn expect_identifier(&mut self, context: &str) -> Result<Token, LazyError> {
        if matches!(self.peek().kind, TokenKind::Identifier(_)) {
            Ok(self.advance())
        } else {
            Err(self.unexpected("identifier".to_string(), context))
        }
    }

    // ------------------------------------------------------------------
    // Postfix operators on a primary (§4.2)
    // ------------------------------------------------------------------

    fn parse_postfixed_primary(&mut self) -> Result<Expr, LazyError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&TokenKind::Dot) && !self.peek().preceded_by_whitespace {
                self.advance();
                let name_tok = self.expect_identifier("field access")?;
                let field_location = name_tok.span;
                let name = match name_tok.kind {
                    TokenKind::Identifier(n) => n,
                    _ => unreachable!(),
                };
                let span = expr.location.merge(field_location);
                expr = Expr::new(
                    ExprKind::FieldAccess {
                        object: Box::new(expr),
                        field: name,
                        field_location,
                    },
                    span,
                );
                continue;
            }
            if self.check(&TokenKind::DotBrace) {
                self.advance();
                let fields = self.parse_name_list()?;
                let end = self.expect(TokenKind::RBrace, "field projection")?.span;
                let span = expr.location.merge(end);
                expr = Expr::new(
                    ExprKind::FieldProjection {
                        object: Box::new(expr),
                        fields,
                    },
                    span,
                );
                continue;
            }
            if self.check(&TokenKind::LBracket) && !self.peek().preceded_by_whitespace {
                self.advance();
                let index = self.parse_expr()?;
                let end = self.expect(TokenKind::RBracket, "index")?.span;
                let span = expr.location.merge(end);
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
                continue;
            }
            if self.check(&TokenKind::LBrace) && !self.peek().preceded_by_newline {
                let fields = self.parse_object_fields()?.0;
                let end = self.tokens[self.pos - 1].span;
                let span = expr.location.merge(end);
                expr = Expr::new(
                    ExprKind::ObjectExtend {
                        base: Box::new(expr),
                        fields,
                    },
                    span,
                );
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_name_list(&mut self) -> Result<Vec<String>, LazyError> {
        let mut names = Vec::new();
        if self.check(&TokenKind::RBrace) {
            return Ok(names);
        }
        loop {
            let tok = self.expect_identifier("field projection")?;
            if let TokenKind::Identifier(n) = tok.kind {
                names.push(n);
            }
            if self.check(&TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        Ok(names)
    }

    // ------------------------------------------------------------------
    // Primary expressions
    // ------------------------------------------------------------------

    fn parse_primary(&mut self) -> Result<Expr, LazyError> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Integer(*n), tok.span))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(*n), tok.span))
            }
            TokenKind::String(content) => {
                self.advance();
                parse_string_literal(content, tok.span)
            }
            TokenKind::Symbol(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Symbol(name.clone()), tok.span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Expr::new(ExprKind::Boolean(true), tok.span)),
                    "false" => Ok(Expr::new(ExprKind::Boolean(false), tok.span)),
                    "null" => Ok(Expr::new(ExprKind::Null, tok.span)),
                    "import" => self.parse_import(tok.span),
                    _ => Ok(Expr::new(ExprKind::Identifier(name.clone()), tok.span)),
                }
            }
            TokenKind::LParen => self.parse_parenthesized(),
            TokenKind::LBracket => self.parse_array(),
            TokenKind::LBrace | TokenKind::DotBrace => self.parse_object(None),
            _ => Err(self.unexpected("an expression".to_string(), "expression")),
        }
    }

    fn parse_import(&mut self, start: Span) -> Result<Expr, LazyError> {
        let tok = self.peek().clone();
        let TokenKind::String(path) = tok.kind else {
            return Err(self.unexpected("a string path".to_string(), "import"));
        };
        self.advance();
        let unescaped = unescape(&path);
        Ok(Expr::new(
            ExprKind::ImportExpr {
                path: unescaped,
                path_location: tok.span,
            },
            start.merge(tok.span),
        ))
    }

    /// Disambiguates `(expr)` (parenthesized) from `(op)` (operator
    /// section) and from a tuple `(a, b, ...)` (§4.2, disambiguation
    /// rules 3 & 4).
    fn parse_parenthesized(&mut self) -> Result<Expr, LazyError> {
        let start = self.advance().span; // '('
        if let Some(op) = self.peek_operator_token() {
            let mark = self.mark();
            self.advance();
            if self.check(&TokenKind::RParen) {
                let end = self.advance().span;
                return Ok(Expr::new(ExprKind::OperatorFunction { op }, start.merge(end)));
            }
            // Not actually an operator section; restore and fall through
            // to ordinary expression parsing (e.g. `(-1)`, unary minus).
            self.restore(mark);
        }
        if self.check(&TokenKind::RParen) {
            let end = self.advance().span;
            return Ok(Expr::new(ExprKind::Tuple { elements: vec![] }, start.merge(end)));
        }
        let first = self.parse_expr()?;
        if self.check(&TokenKind::Comma) {
            let mut elements = vec![first];
            while self.check(&TokenKind::Comma) {
                self.advance();
                if self.check(&TokenKind::RParen) {
                    break;
                }
                elements.push(self.parse_expr()?);
            }
            let end = self.expect(TokenKind::RParen, "tuple")?.span;
            return Ok(Expr::new(ExprKind::Tuple { elements }, start.merge(end)));
        }
        self.expect(TokenKind::RParen, "parenthesized expression")?;
        Ok(first)
    }

    fn peek_operator_token(&self) -> Option<BinaryOp> {
        match &self.peek().kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Amp => Some(BinaryOp::Merge),
            TokenKind::AndAnd => Some(BinaryOp::And),
            TokenKind::OrOr => Some(BinaryOp::Or),
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::NotEq),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::LtEq => Some(BinaryOp::Le),
            TokenKind::GtEq => Some(BinaryOp::Ge),
            TokenKind::Backslash => Some(BinaryOp::Pipeline),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Arrays, comprehensions, objects
    // ------------------------------------------------------------------

    fn parse_array(&mut self) -> Result<Expr, LazyError> {
        let start = self.advance().span; // '['
        if self.check(&TokenKind::RBracket) {
            let end = self.advance().span;
            return Ok(Expr::new(ExprKind::Array { elements: vec![] }, start.merge(end)));
        }

        let first = self.parse_array_element()?;

        if self.check_keyword("for") {
            let (clauses, filter) = self.parse_comprehension_clauses()?;
            let end = self.expect(TokenKind::RBracket, "array comprehension")?.span;
            let body = match first {
                ArrayElement::Normal(e) => e,
                _ => return Err(self.unexpected("a comprehension body".to_string(), "array comprehension")),
            };
            return Ok(Expr::new(
                ExprKind::ArrayComprehension {
                    body: Box::new(body),
                    clauses,
                    filter,
                },
                start.merge(end),
            ));
        }

        let mut elements = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::RBracket) {
                break;
            }
            elements.push(self.parse_array_element()?);
        }
        let end = self.expect(TokenKind::RBracket, "array literal")?.span;
        Ok(Expr::new(ExprKind::Array { elements }, start.merge(end)))
    }

    fn parse_array_element(&mut self) -> Result<ArrayElement, LazyError> {
        if self.check(&TokenKind::DotDotDot) {
            self.advance();
            return Ok(ArrayElement::Spread(self.parse_pipeline()?));
        }
        let expr = self.parse_pipeline()?;
        if self.check_keyword("if") {
            self.advance();
            let cond = self.parse_pipeline()?;
            return Ok(ArrayElement::ConditionalIf(expr, cond));
        }
        if self.check_keyword("unless") {
            self.advance();
            let cond = self.parse_pipeline()?;
            return Ok(ArrayElement::ConditionalUnless(expr, cond));
        }
        Ok(ArrayElement::Normal(expr))
    }

    fn parse_comprehension_clauses(
        &mut self,
    ) -> Result<(Vec<ComprehensionClause>, Option<Box<Expr>>), LazyError> {
        let mut clauses = Vec::new();
        while self.check_keyword("for") {
            self.advance();
            let pattern = self.parse_pattern()?;
            self.expect_keyword("in")?;
            let iterable = self.parse_pipeline()?;
            clauses.push(ComprehensionClause { pattern, iterable });
        }
        let filter = if self.check_keyword("when") {
            self.advance();
            Some(Box::new(self.parse_pipeline()?))
        } else {
            None
        };
        Ok((clauses, filter))
    }

    /// `module_doc` is threaded in by [`Self::parse_postfixed_primary`]
    /// callers that have already consumed a leading doc-comment block
    /// terminated by `---`; top-level object literals pick it up from the
    /// opening brace token itself.
    fn parse_object(&mut self, _module_doc_hint: Option<String>) -> Result<Expr, LazyError> {
        let open = self.peek().clone();
        let module_doc = split_module_doc(open.doc_comment.as_deref());
        let (fields, _start, end) = self.parse_object_fields()?;
        if self.check_keyword("for") {
            // Object comprehension: `{ key: v for p in iter }` form. Only
            // reachable here when exactly one dynamic-or-static field was
            // captured as the body before `for`.
            if fields.len() == 1 {
                let field = &fields[0];
                let (clauses, filter) = self.parse_comprehension_clauses()?;
                let close = self.expect(TokenKind::RBrace, "object comprehension")?.span;
                let key_expr = match &field.key {
                    FieldKey::Static(name) => {
                        Expr::new(ExprKind::String(name.clone()), field.key_location)
                    }
                    FieldKey::Dynamic(e) => (**e).clone(),
                };
                return Ok(Expr::new(
                    ExprKind::ObjectComprehension {
                        key: Box::new(key_expr),
                        value: Box::new(field.value.clone()),
                        clauses,
                        filter,
                    },
                    open.span.merge(close),
                ));
            }
        }
        Ok(Expr::new(
            ExprKind::Object { fields, module_doc },
            open.span.merge(end),
        ))
    }

    /// Parses the `{ field, field, ... }` body shared by object literals
    /// and object-extend. Returns the fields plus the `{`/`}` span ends.
    fn parse_object_fields(&mut self) -> Result<(Vec<ObjectField>, Span, Span), LazyError> {
        let start = self.advance().span; // '{' or '.{' when reused by projection callers
        let mut fields = Vec::new();
        self.skip_field_separators();
        while !self.check(&TokenKind::RBrace) {
            fields.push(self.parse_object_field()?);
            if !self.skip_field_separators() && !self.check(&TokenKind::RBrace) {
                if self.check_keyword("for") {
                    break;
                }
                return Err(self.unexpected("',' or newline".to_string(), "object field"));
            }
        }
        let end = if self.check(&TokenKind::RBrace) {
            self.advance().span
        } else {
            start
        };
        Ok((fields, start, end))
    }

    fn skip_field_separators(&mut self) -> bool {
        let mut any = false;
        while self.check(&TokenKind::Comma) || self.peek().preceded_by_newline {
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else if !self.check(&TokenKind::RBrace) && self.peek().preceded_by_newline {
                // A newline alone is a valid field separator; don't
                // consume a token, just record that separation occurred.
                any = true;
                break;
            } else {
                break;
            }
            any = true;
        }
        any
    }

    fn parse_object_field(&mut self) -> Result<ObjectField, LazyError> {
        let doc = self.peek().doc_comment.clone();
        if self.check(&TokenKind::LBracket) {
            self.advance();
            let key_expr = self.parse_expr()?;
            let key_location = key_expr.location;
            self.expect(TokenKind::RBracket, "dynamic key")?;
            self.expect(TokenKind::Colon, "dynamic key")?;
            let value = self.parse_pipeline()?;
            return Ok(ObjectField {
                key: FieldKey::Dynamic(Box::new(key_expr)),
                value,
                is_patch: false,
                doc,
                key_location,
            });
        }
        let name_tok = self.expect_identifier("object field")?;
        let key_location = name_tok.span;
        let name = match name_tok.kind {
            TokenKind::Identifier(n) => n,
            _ => unreachable!(),
        };
        if self.check(&TokenKind::LBrace) && !self.peek().preceded_by_newline {
            let (patch_fields, _, end) = self.parse_object_fields()?;
            let value = Expr::new(
                ExprKind::Object {
                    fields: patch_fields,
                    module_doc: None,
                },
                key_location.merge(end),
            );
            return Ok(ObjectField {
                key: FieldKey::Static(name),
                value,
                is_patch: true,
                doc,
                key_location,
            });
        }
        if self.check(&TokenKind::Colon) {
            self.advance();
            let value = self.parse_pipeline()?;
            return Ok(ObjectField {
                key: FieldKey::Static(name),
                value,
                is_patch: false,
                doc,
                key_location,
            });
        }
        // Shorthand `name` desugars to `name: name`.
        let value = Expr::new(ExprKind::Identifier(name.clone()), key_location);
        Ok(ObjectField {
            key: FieldKey::Static(name),
            value,
            is_patch: false,
            doc,
            key_location,
        })
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn parse_pattern(&mut self) -> Result<Pattern, LazyError> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Pattern::new(PatternKind::Boolean(true), tok.span)),
                    "false" => Ok(Pattern::new(PatternKind::Boolean(false), tok.span)),
                    "null" => Ok(Pattern::new(PatternKind::Null, tok.span)),
                    "_" => Ok(Pattern::new(PatternKind::Wildcard, tok.span)),
                    _ => Ok(Pattern::new(PatternKind::Identifier(name.clone()), tok.span)),
                }
            }
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Pattern::new(PatternKind::Integer(*n), tok.span))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Pattern::new(PatternKind::Float(*n), tok.span))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Pattern::new(PatternKind::String(unescape(s)), tok.span))
            }
            TokenKind::Symbol(s) => {
                self.advance();
                Ok(Pattern::new(PatternKind::Symbol(s.clone()), tok.span))
            }
            TokenKind::Minus => {
                self.advance();
                match self.advance().kind {
                    TokenKind::Integer(n) => Ok(Pattern::new(PatternKind::Integer(-n), tok.span)),
                    TokenKind::Float(n) => Ok(Pattern::new(PatternKind::Float(-n), tok.span)),
                    _ => Err(self.unexpected("a numeric literal".to_string(), "pattern")),
                }
            }
            TokenKind::LParen => self.parse_tuple_pattern(),
            TokenKind::LBracket => self.parse_array_pattern(),
            TokenKind::LBrace => self.parse_object_pattern(),
            _ => Err(self.unexpected("a pattern".to_string(), "pattern")),
        }
    }

    fn parse_tuple_pattern(&mut self) -> Result<Pattern, LazyError> {
        let start = self.advance().span;
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RParen) {
            elements.push(self.parse_pattern()?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                if self.check(&TokenKind::RParen) {
                    break;
                }
                elements.push(self.parse_pattern()?);
            }
        }
        let end = self.expect(TokenKind::RParen, "tuple pattern")?.span;
        Ok(Pattern::new(PatternKind::Tuple(elements), start.merge(end)))
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, LazyError> {
        let start = self.advance().span;
        let mut elements = Vec::new();
        let mut rest = None;
        if !self.check(&TokenKind::RBracket) {
            loop {
                if self.check(&TokenKind::DotDotDot) {
                    self.advance();
                    let name_tok = self.expect_identifier("array rest pattern")?;
                    if let TokenKind::Identifier(n) = name_tok.kind {
                        rest = Some(n);
                    }
                    break;
                }
                elements.push(self.parse_pattern()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                    if self.check(&TokenKind::RBracket) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        let end = self.expect(TokenKind::RBracket, "array pattern")?.span;
        Ok(Pattern::new(
            PatternKind::Array { elements, rest },
            start.merge(end),
        ))
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, LazyError> {
        let start = self.advance().span;
        let mut fields = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let name_tok = self.expect_identifier("object pattern field")?;
                let name = match name_tok.kind {
                    TokenKind::Identifier(n) => n,
                    _ => unreachable!(),
                };
                let sub_pattern = if self.check(&TokenKind::Colon) {
                    self.advance();
                    self.parse_pattern()?
                } else {
                    Pattern::new(PatternKind::Identifier(name.clone()), name_tok.span)
                };
                fields.push((name, sub_pattern));
                if self.check(&TokenKind::Comma) {
                    self.advance();
                    if self.check(&TokenKind::RBrace) {
                        break;
                    }
                    continue;
                }
                break;
            }
        }
        let end = self.expect(TokenKind::RBrace, "object pattern")?.span;
        Ok(Pattern::new(PatternKind::Object { fields }, start.merge(end)))
    }
}

enum BinOpKind {
    Op(BinaryOp),
    Range { inclusive: bool },
}

fn split_module_doc(doc: Option<&str>) -> Option<String> {
    let doc = doc?;
    let mut lines = Vec::new();
    for line in doc.lines() {
        if line.trim() == "---" {
            return Some(lines.join("\n"));
        }
        lines.push(line);
    }
    None
}

/// Unescape the backslash sequences the lexer deliberately left raw
/// (§4.1: "no escape processing at the lex level").
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('$') => out.push('$'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Scans a string literal's raw body for `$name` / `${expr}` (§4.2,
/// "String interpolation"). `base_span` is the span of the whole string
/// token; interpolated sub-expressions are re-lexed with their byte
/// offsets shifted to the right place in the original source.
fn parse_string_literal(raw: &str, base_span: Span) -> Result<Expr, LazyError> {
    // `base_span` covers the opening quote; the raw content starts one
    // byte later.
    let content_offset = base_span.offset + 1;
    let mut parts = Vec::new();
    let mut literal = String::new();
    let bytes = raw.as_bytes();
    let mut i = 0;
    let mut had_interpolation = false;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            // Unescape a single sequence and move on.
            let mut one = String::new();
            let mut chars = raw[i..].chars();
            chars.next(); // backslash
            if let Some(c) = chars.next() {
                match c {
                    'n' => one.push('\n'),
                    't' => one.push('\t'),
                    'r' => one.push('\r'),
                    '\\' => one.push('\\'),
                    '"' => one.push('"'),
                    '\'' => one.push('\''),
                    '$' => one.push('$'),
                    other => {
                        one.push('\\');
                        one.push(other);
                    }
                }
                i += 1 + c.len_utf8();
            } else {
                one.push('\\');
                i += 1;
            }
            literal.push_str(&one);
            continue;
        }
        if bytes[i] == b'$' {
            if let Some(&b'{') = bytes.get(i + 1) {
                // ${expr}, balanced-brace scan.
                let expr_start = i + 2;
                let mut depth = 1usize;
                let mut j = expr_start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(LazyError::new(
                        LazyErrorKind::ExpectedExpression,
                        base_span,
                    ));
                }
                if !literal.is_empty() {
                    parts.push(InterpolationPart::Literal(std::mem::take(&mut literal)));
                }
                let slice = &raw[expr_start..j];
                let tokens = Lexer::with_offset(slice, content_offset + expr_start).tokenize()?;
                let mut sub = Parser { tokens, pos: 0 };
                let inner = sub.parse_expr()?;
                parts.push(InterpolationPart::Expr(Box::new(inner)));
                had_interpolation = true;
                i = j + 1;
                continue;
            }
            // $name, maximal identifier; a lone `$` is a literal `$`.
            let name_start = i + 1;
            let mut k = name_start;
            while k < bytes.len()
                && (bytes[k].is_ascii_alphanumeric() || bytes[k] == b'_')
            {
                k += 1;
            }
            if k == name_start {
                literal.push('$');
                i += 1;
                continue;
            }
            if !literal.is_empty() {
                parts.push(InterpolationPart::Literal(std::mem::take(&mut literal)));
            }
            let name = raw[name_start..k].to_string();
            let span = Span::new(content_offset + i, k - i, base_span.line, base_span.column);
            parts.push(InterpolationPart::Expr(Box::new(Expr::new(
                ExprKind::Identifier(name),
                span,
            ))));
            had_interpolation = true;
            i = k;
            continue;
        }
        let ch = raw[i..].chars().next().unwrap();
        literal.push(ch);
        i += ch.len_utf8();
    }

    if !had_interpolation {
        return Ok(Expr::new(ExprKind::String(literal), base_span));
    }
    if !literal.is_empty() {
        parts.push(InterpolationPart::Literal(literal));
    }
    Ok(Expr::new(ExprKind::StringInterpolation(parts), base_span))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Expr {
        parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"))
    }

    #[test]
    fn parses_let_binding() {
        let expr = parse_ok("let x = 1 + 2; x * 4");
        assert!(matches!(expr.kind(), ExprKind::Let { .. }));
    }

    #[test]
    fn parses_bare_pattern_eq_let() {
        let expr = parse_ok("x = 1; x");
        assert!(matches!(expr.kind(), ExprKind::Let { .. }));
    }

    #[test]
    fn parses_lambda_with_backslash() {
        let expr = parse_ok("let f = \\n -> n * n; f 7");
        let ExprKind::Let { value, .. } = expr.kind() else {
            panic!("expected let")
        };
        assert!(matches!(value.kind(), ExprKind::Lambda { .. }));
    }

    #[test]
    fn parses_bare_lambda() {
        let expr = parse_ok("n -> n * n");
        assert!(matches!(expr.kind(), ExprKind::Lambda { .. }));
    }

    #[test]
    fn application_is_left_associative() {
        let expr = parse_ok("f a b");
        let ExprKind::Application { function, argument } = expr.kind() else {
            panic!("expected application")
        };
        assert!(matches!(argument.kind(), ExprKind::Identifier(n) if n == "b"));
        assert!(matches!(function.kind(), ExprKind::Application { .. }));
    }

    #[test]
    fn operator_precedence_multiplication_binds_tighter() {
        let expr = parse_ok("1 + 2 * 3");
        let ExprKind::Binary { op: BinaryOp::Add, right, .. } = expr.kind() else {
            panic!("expected +")
        };
        assert!(matches!(right.kind(), ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn object_merge_parses() {
        let expr = parse_ok("{ a: 1, b: 2 } & { b: 20, c: 30 }");
        assert!(matches!(expr.kind(), ExprKind::Binary { op: BinaryOp::Merge, .. }));
    }

    #[test]
    fn object_extend_is_postfix_not_merge() {
        let expr = parse_ok("{ a: 1 } { a: 2 }");
        assert!(matches!(expr.kind(), ExprKind::ObjectExtend { .. }));
    }

    #[test]
    fn patch_field_parses() {
        let expr = parse_ok("{ user: { name: \"a\", age: 1 } } & { user { age: 2 } }");
        let ExprKind::Binary { right, .. } = expr.kind() else {
            panic!()
        };
        let ExprKind::Object { fields, .. } = right.kind() else {
            panic!()
        };
        assert!(fields[0].is_patch);
    }

    #[test]
    fn array_comprehension_with_filter() {
        let expr = parse_ok("[ n * n for n in 1..4 when n != 2 ]");
        assert!(matches!(expr.kind(), ExprKind::ArrayComprehension { .. }));
    }

    #[test]
    fn when_matches_parses_branches_and_otherwise() {
        let expr = parse_ok("when 3 matches 1 then \"one\"; 2 then \"two\"; otherwise \"many\"");
        let ExprKind::WhenMatches { branches, otherwise, .. } = expr.kind() else {
            panic!()
        };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn string_interpolation_splits_literal_and_expr() {
        let expr = parse_ok("\"sum=$x\"");
        let ExprKind::StringInterpolation(parts) = expr.kind() else {
            panic!()
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn range_inclusive_vs_exclusive() {
        let incl = parse_ok("1..4");
        assert!(matches!(incl.kind(), ExprKind::Range { inclusive: true, .. }));
        let excl = parse_ok("1...4");
        assert!(matches!(excl.kind(), ExprKind::Range { inclusive: false, .. }));
    }

    #[test]
    fn field_accessor_with_leading_whitespace_is_argument() {
        let expr = parse_ok("map .name xs");
        // `map` applied to `.name` applied to `xs`.
        assert!(matches!(expr.kind(), ExprKind::Application { .. }));
    }

    #[test]
    fn field_projection_parses() {
        let expr = parse_ok("user.{ name, age }");
        assert!(matches!(expr.kind(), ExprKind::FieldProjection { .. }));
    }

    #[test]
    fn operator_section_parses() {
        let expr = parse_ok("(+)");
        assert!(matches!(expr.kind(), ExprKind::OperatorFunction { op: BinaryOp::Add }));
    }

    #[test]
    fn application_stops_before_then_keyword() {
        let expr = parse_ok("if f x then 1 else 2");
        let ExprKind::If { cond, .. } = expr.kind() else {
            panic!()
        };
        assert!(matches!(cond.kind(), ExprKind::Application { .. }));
    }

    #[test]
    fn import_path_is_unescaped() {
        let expr = parse_ok("import \"lib/a.lazy\"");
        assert!(matches!(expr.kind(), ExprKind::ImportExpr { .. }));
    }
}
