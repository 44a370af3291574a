//! The closed error taxonomy (§7) plus the error-context scratchpad (§3,
//! §4.5) that the lexer, parser, and evaluator all write through on their
//! way to a top-level `evaluate` call.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

use crate::token::Span;

/// One entry per §7 error kind, carrying exactly the payload the spec
/// names for it. `thiserror` gives each variant its human message; the
/// surrounding `LazyError` attaches location and source text for
/// `miette::Diagnostic`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LazyErrorKind {
    #[error("unexpected character '{found}'")]
    UnexpectedCharacter { found: String },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("expected an expression")]
    ExpectedExpression,

    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        context: String,
    },

    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("expected a function, found {found}")]
    ExpectedFunction { found: String },

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongNumberOfArguments { expected: String, got: usize },

    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    #[error("pattern match failure")]
    PatternMatchFailure,

    #[error("module not found: '{module_name}'")]
    ModuleNotFound { module_name: String },

    #[error("cycle detected while forcing a thunk")]
    CycleDetected,

    #[error("{message}")]
    UserCrash { message: String },

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("division by zero")]
    DivisionByZero,
}

impl LazyErrorKind {
    /// Stable error code suffix, mirrored into `miette`'s diagnostic code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnexpectedCharacter { .. } => "lazylang::lex::unexpected_character",
            Self::UnterminatedString => "lazylang::lex::unterminated_string",
            Self::ExpectedExpression => "lazylang::parse::expected_expression",
            Self::UnexpectedToken { .. } => "lazylang::parse::unexpected_token",
            Self::UnknownIdentifier { .. } => "lazylang::eval::unknown_identifier",
            Self::TypeMismatch { .. } => "lazylang::eval::type_mismatch",
            Self::ExpectedFunction { .. } => "lazylang::eval::expected_function",
            Self::WrongNumberOfArguments { .. } => "lazylang::eval::wrong_number_of_arguments",
            Self::InvalidArgument { .. } => "lazylang::eval::invalid_argument",
            Self::PatternMatchFailure => "lazylang::eval::pattern_match_failure",
            Self::ModuleNotFound { .. } => "lazylang::eval::module_not_found",
            Self::CycleDetected => "lazylang::eval::cycle_detected",
            Self::UserCrash { .. } => "lazylang::eval::user_crash",
            Self::IntegerOverflow => "lazylang::eval::integer_overflow",
            Self::DivisionByZero => "lazylang::eval::division_by_zero",
        }
    }

    fn primary_label(&self) -> &'static str {
        match self {
            Self::UnexpectedCharacter { .. } => "unexpected character here",
            Self::UnterminatedString => "string starts here and is never closed",
            Self::ExpectedExpression => "expected an expression here",
            Self::UnexpectedToken { .. } => "unexpected token",
            Self::UnknownIdentifier { .. } => "not bound in scope",
            Self::TypeMismatch { .. } => "wrong type here",
            Self::ExpectedFunction { .. } => "not a function",
            Self::WrongNumberOfArguments { .. } => "called here",
            Self::InvalidArgument { .. } => "invalid here",
            Self::PatternMatchFailure => "no branch matched",
            Self::ModuleNotFound { .. } => "imported here",
            Self::CycleDetected => "depends on itself here",
            Self::UserCrash { .. } => "crash invoked here",
            Self::IntegerOverflow => "overflowed here",
            Self::DivisionByZero => "division by zero here",
        }
    }
}

/// A fully-located error ready to hand to a reporter. `source` is `None`
/// until `EvalErrorContext::attach_source` fills it in from the registry,
/// which lets the lexer/parser/evaluator build errors without holding a
/// source-map reference everywhere.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct LazyError {
    pub kind: LazyErrorKind,
    pub span: Span,
    pub secondary: Option<(Span, String)>,
    pub suggestion: Option<String>,
    pub source: Option<Arc<NamedSource<String>>>,
}

impl LazyError {
    pub fn new(kind: LazyErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            secondary: None,
            suggestion: None,
            source: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_secondary(mut self, span: Span, label: impl Into<String>) -> Self {
        self.secondary = Some((span, label.into()));
        self
    }
}

impl Diagnostic for LazyError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.suggestion
            .as_ref()
            .map(|s| Box::new(s.clone()) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let mut labels = vec![LabeledSpan::new(
            Some(self.kind.primary_label().to_string()),
            self.span.offset,
            self.span.length.max(1),
        )];
        if let Some((span, label)) = &self.secondary {
            labels.push(LabeledSpan::new(
                Some(label.clone()),
                span.offset,
                span.length.max(1),
            ));
        }
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source.as_ref().map(|s| s.as_ref() as &dyn miette::SourceCode)
    }
}

/// The per-evaluation scratchpad from §3 ("Error context") and §4.5: the
/// current file, the filename→source registry for multi-file error
/// display, and the most recent error's location/payload. Owned by the
/// caller, mutated freely, destroyed at the end of the top-level call.
#[derive(Debug, Default)]
pub struct EvalErrorContext {
    pub current_file: Option<PathBuf>,
    sources: HashMap<String, Arc<str>>,
    pub last_error_location: Option<Span>,
    pub secondary_location: Option<(Span, String)>,
    pub last_error_payload: Option<LazyErrorKind>,
    pub user_crash_message: Option<String>,
}

impl EvalErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file's text so a later error for that file can be
    /// rendered with a source-backed diagnostic.
    pub fn register_source(&mut self, name: impl Into<String>, text: impl Into<Arc<str>>) {
        self.sources.insert(name.into(), text.into());
    }

    pub fn source_text(&self, name: &str) -> Option<&Arc<str>> {
        self.sources.get(name)
    }

    /// Record an error's location/payload without consuming it, so the
    /// evaluator can `return Err(...)` and still have left a trail in the
    /// context for downstream consumers (CLI, LSP) that inspect it after
    /// the fact rather than via the `Result`.
    pub fn record(&mut self, err: &LazyError) {
        self.last_error_location = Some(err.span);
        self.secondary_location = err.secondary.clone();
        self.last_error_payload = Some(err.kind.clone());
        if let LazyErrorKind::UserCrash { message } = &err.kind {
            self.user_crash_message = Some(message.clone());
        }
    }

    /// Clear stale error fields. Called before evaluating the top-level
    /// expression after stdlib priming, so a successful stdlib import
    /// doesn't leak its last-touched location into a later error from the
    /// main file (§4.5).
    pub fn clear(&mut self) {
        self.last_error_location = None;
        self.secondary_location = None;
        self.last_error_payload = None;
        self.user_crash_message = None;
    }

    /// Attach the registered source for `file` (falling back to
    /// `current_file`) to an error so `miette` can render the offending
    /// line.
    pub fn attach_source(&self, mut err: LazyError, file: &str) -> LazyError {
        if let Some(text) = self.sources.get(file) {
            err.source = Some(Arc::new(NamedSource::new(file, text.to_string())));
        }
        err
    }
}

pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_clears_stale_fields() {
        let mut ctx = EvalErrorContext::new();
        let err = LazyError::new(
            LazyErrorKind::UnknownIdentifier { name: "x".into() },
            Span::new(0, 1, 1, 1),
        );
        ctx.record(&err);
        assert!(ctx.last_error_location.is_some());
        ctx.clear();
        assert!(ctx.last_error_location.is_none());
        assert!(ctx.last_error_payload.is_none());
    }

    #[test]
    fn attach_source_uses_registered_text() {
        let mut ctx = EvalErrorContext::new();
        ctx.register_source("main.lazy", "let x = y; x");
        let err = LazyError::new(
            LazyErrorKind::UnknownIdentifier { name: "y".into() },
            Span::new(8, 1, 1, 9),
        );
        let err = ctx.attach_source(err, "main.lazy");
        assert!(err.source.is_some());
    }
}
