//! Embeddable façade (§4.6) gluing lexer → parser → evaluator → formatter
//! behind the CLI-facing entry points of §6. `Engine` is not `Clone`;
//! each embedding surface (CLI, LSP, spec runner) owns one per
//! concurrently-running evaluation, consistent with §5's
//! single-threaded-per-evaluation confinement.

use std::path::Path;
use std::rc::Rc;

use tracing::{info, warn};

use crate::ast::Expr;
use crate::config::ModuleSearchPath;
use crate::error::{EvalErrorContext, LazyError, LazyErrorKind};
use crate::eval::Evaluator;
use crate::format::{self, Style};
use crate::token::Span;
use crate::value::Value;

pub struct Engine {
    ctx: EvalErrorContext,
    search_path: ModuleSearchPath,
}

impl Engine {
    pub fn new(search_path: Option<ModuleSearchPath>) -> Self {
        Self {
            ctx: EvalErrorContext::new(),
            search_path: search_path.unwrap_or_else(|| ModuleSearchPath::from_env("LAZYLANG_PATH")),
        }
    }

    /// `parse(source) -> AST | ParseError` (§6).
    pub fn parse(&self, source: &str) -> Result<Expr, LazyError> {
        crate::parser::parse(source)
    }

    /// `evaluate(source, cwd?) -> Value | EvalError` (§6). Registers
    /// `source` under `file_name` so a later error can be rendered with
    /// the offending line, then evaluates against the stdlib-seeded
    /// root environment. The returned value is in WHNF only; callers
    /// that need a fully realized tree go through [`Engine::format`] or
    /// [`Engine::force_and_project`].
    pub fn evaluate(&mut self, source: &str, file_name: &str, cwd: Option<&Path>) -> Result<Value, LazyError> {
        self.ctx.register_source(file_name.to_string(), source.to_string());
        info!(file = file_name, "evaluating top-level source");

        let ast = self
            .parse(source)
            .map_err(|e| self.ctx.attach_source(e, file_name))?;

        let mut evaluator = Evaluator::new(&mut self.ctx, self.search_path.clone());
        let root_env = evaluator.stdlib_env()?;

        let cwd_file = cwd.map(|dir| Rc::new(dir.join(file_name)));
        evaluator.eval(&ast, &root_env, cwd_file.as_ref()).map_err(|e| {
            warn!(file = file_name, error = %e.kind, "evaluation failed");
            self.ctx.attach_source(e, file_name)
        })
    }

    /// `format(value, style) -> string | FormatError` (§6, §4.4). Drives
    /// every thunk reachable from `value` before rendering.
    pub fn format(&mut self, value: &Value, style: Style, span: Span) -> Result<String, LazyError> {
        let deep = self.force_deep(value.clone(), span)?;
        match style {
            Style::Compact => Ok(format::render_compact(&deep)),
            Style::Pretty => Ok(format::render_pretty(&deep)),
            Style::Json => Ok(format::to_json(&deep, span)?.to_string()),
            Style::Yaml => format::to_yaml(&deep, span),
        }
    }

    /// `forceAndProject(value, fieldName) -> Value` (§6) — used by the
    /// "manifest" CLI mode that writes each field of a top-level object
    /// to a file.
    pub fn force_and_project(&mut self, value: Value, field_name: &str, span: Span) -> Result<Value, LazyError> {
        let forced = self.force_deep(value, span)?;
        match forced {
            Value::Object(obj) => obj.get(field_name).cloned().ok_or_else(|| {
                LazyError::new(
                    LazyErrorKind::UnknownIdentifier {
                        name: field_name.to_string(),
                    },
                    span,
                )
            }),
            other => Err(LazyError::new(
                LazyErrorKind::TypeMismatch {
                    expected: "Object".to_string(),
                    found: other.type_name().to_string(),
                },
                span,
            )),
        }
    }

    fn force_deep(&mut self, value: Value, span: Span) -> Result<Value, LazyError> {
        let mut evaluator = Evaluator::new(&mut self.ctx, self.search_path.clone());
        evaluator.force_deep_for_format(value, span)
    }

    pub fn context(&self) -> &EvalErrorContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_round_trips_through_compact_formatter() {
        let mut engine = Engine::new(None);
        let value = engine.evaluate("1 + 2 * 3", "main.lazy", None).unwrap();
        let text = engine.format(&value, Style::Compact, Span::default()).unwrap();
        assert_eq!(text, "7");
    }

    #[test]
    fn evaluate_propagates_runtime_errors() {
        let mut engine = Engine::new(None);
        let err = engine.evaluate("1 / 0", "main.lazy", None).unwrap_err();
        assert!(matches!(err.kind, LazyErrorKind::DivisionByZero));
    }

    #[test]
    fn force_and_project_reads_a_top_level_field() {
        let mut engine = Engine::new(None);
        let value = engine.evaluate("{ name: \"ok\" }", "main.lazy", None).unwrap();
        let field = engine.force_and_project(value, "name", Span::default()).unwrap();
        assert_eq!(field, Value::string("ok"));
    }
}
