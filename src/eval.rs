//! Tree-walking evaluator (§4.3). `evaluate` never mutates `env`; it only
//! ever builds new, longer environments and mutates thunk cells in place.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{
    ArrayElement, BinaryOp, ComprehensionClause, Expr, ExprKind, FieldKey, InterpolationPart,
    ObjectField as AstObjectField, Pattern, PatternKind, UnaryOp, WhenBranch,
};
use crate::env::Env;
use crate::error::{EvalErrorContext, LazyError, LazyErrorKind};
use crate::token::Span;
use crate::config::ModuleSearchPath;
use crate::value::{force, FunctionValue, NativeCtx, NativeFnValue, ObjectField, ObjectValue, Thunk, Value};

/// Per-top-level-evaluation mutable state threaded through every
/// recursive call: the module cache and the search path. Distinct from
/// [`EvalErrorContext`], which is about error reporting rather than
/// evaluation bookkeeping.
pub struct Evaluator<'ctx> {
    pub ctx: &'ctx mut EvalErrorContext,
    pub search_path: ModuleSearchPath,
    module_cache: HashMap<PathBuf, Value>,
    stdlib_env: Option<Env>,
}

impl<'ctx> Evaluator<'ctx> {
    pub fn new(ctx: &'ctx mut EvalErrorContext, search_path: ModuleSearchPath) -> Self {
        Self {
            ctx,
            search_path,
            module_cache: HashMap::new(),
            stdlib_env: None,
        }
    }

    /// The root environment every top-level file and import evaluates
    /// against: native built-ins plus the curated stdlib modules,
    /// built once and reused (§4.3, "stdlib environment").
    pub fn stdlib_env(&mut self) -> Result<Env, LazyError> {
        if let Some(env) = &self.stdlib_env {
            return Ok(env.clone());
        }
        let env = crate::stdlib::build_root_env();
        self.stdlib_env = Some(env.clone());
        Ok(env)
    }

    /// Evaluate `expr` in `env`, fully. `cwd` is the directory imports
    /// resolve relative to; `None` means "no file on disk" (e.g. a
    /// REPL-pasted snippet), in which case only cwd/search-path imports
    /// resolve.
    pub fn eval(&mut self, expr: &Expr, env: &Env, cwd: Option<&Rc<PathBuf>>) -> Result<Value, LazyError> {
        self.eval_inner(expr, env, cwd)
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Env, cwd: Option<&Rc<PathBuf>>) -> Result<Value, LazyError> {
        match expr.kind() {
            ExprKind::Integer(n) => Ok(Value::Integer(*n)),
            ExprKind::Float(n) => Ok(Value::Float(*n)),
            ExprKind::Boolean(b) => Ok(Value::Boolean(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Symbol(name) => Ok(Value::Symbol(Rc::from(name.as_str()))),
            ExprKind::String(s) => Ok(Value::string(s.as_str())),

            ExprKind::StringInterpolation(parts) => self.eval_interpolation(parts, env, cwd, expr.location),

            ExprKind::Identifier(name) => env.lookup(name).ok_or_else(|| {
                self.record(LazyError::new(
                    LazyErrorKind::UnknownIdentifier { name: name.clone() },
                    expr.location,
                ))
            }),

            ExprKind::Lambda { param, body } => Ok(Value::Function(Rc::new(FunctionValue {
                param: (**param).clone(),
                body: (**body).clone(),
                captured_env: env.clone(),
            }))),

            ExprKind::Application { function, argument } => {
                let func = self.eval(function, env, cwd)?;
                let func = self.force(func, expr.location)?;
                let arg_thunk = Value::Thunk(Thunk::new((**argument).clone(), env.clone(), cwd.cloned()));
                self.apply(func, arg_thunk, expr.location)
            }

            ExprKind::Let { pattern, value, body, .. } => {
                let thunk = Thunk::new((**value).clone(), env.clone(), cwd.cloned());
                let bound_env = self.bind_pattern(pattern, Value::Thunk(thunk.clone()), env)?;
                thunk.rebind_env(bound_env.clone());
                self.eval(body, &bound_env, cwd)
            }

            ExprKind::WhereExpr { expr: inner, bindings } => {
                let mut bound_env = env.clone();
                let mut thunks = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    let thunk = Thunk::new(binding.value.clone(), env.clone(), cwd.cloned());
                    bound_env = self.bind_pattern(&binding.pattern, Value::Thunk(thunk.clone()), &bound_env)?;
                    thunks.push(thunk);
                }
                // Every binding's thunk is rebound to the fully-bound
                // environment only once every sibling name exists in it,
                // so the whole `where` group is mutually recursive.
                for thunk in &thunks {
                    thunk.rebind_env(bound_env.clone());
                }
                self.eval(inner, &bound_env, cwd)
            }

            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand, env, cwd)?;
                let v = self.force(v, operand.location)?;
                match op {
                    UnaryOp::Neg => match v {
                        Value::Integer(n) => Ok(Value::Integer(-n)),
                        Value::Float(n) => Ok(Value::Float(-n)),
                        other => Err(self.record(LazyError::new(
                            LazyErrorKind::TypeMismatch {
                                expected: "Integer or Float".to_string(),
                                found: other.type_name().to_string(),
                            },
                            operand.location,
                        ))),
                    },
                }
            }

            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, env, cwd, expr.location),

            ExprKind::If { cond, then_branch, else_branch } => {
                let c = self.eval(cond, env, cwd)?;
                let c = self.force(c, cond.location)?;
                let truthy = self.as_bool(c, cond.location)?;
                if truthy {
                    self.eval(then_branch, env, cwd)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch, env, cwd)
                } else {
                    Ok(Value::Null)
                }
            }

            ExprKind::WhenMatches { value, branches, otherwise } => {
                let scrutinee = self.eval(value, env, cwd)?;
                let scrutinee = self.force(scrutinee, value.location)?;
                self.eval_when_matches(&scrutinee, branches, otherwise.as_deref(), env, cwd, expr.location)
            }

            ExprKind::Object { fields, module_doc } => {
                let built = self.build_object_fields(fields, env, cwd)?;
                Ok(Value::Object(Rc::new(ObjectValue {
                    fields: built,
                    module_doc: module_doc.clone(),
                })))
            }

            ExprKind::ObjectExtend { base, fields } => {
                let base_val = self.eval(base, env, cwd)?;
                let base_val = self.force(base_val, base.location)?;
                let Value::Object(base_obj) = base_val else {
                    return Err(self.record(LazyError::new(
                        LazyErrorKind::TypeMismatch {
                            expected: "Object".to_string(),
                            found: base_val.type_name().to_string(),
                        },
                        base.location,
                    )));
                };
                let extension = self.build_object_fields(fields, env, cwd)?;
                let merged = self.merge_fields(&base_obj.fields, &extension, expr.location)?;
                Ok(Value::Object(Rc::new(ObjectValue {
                    fields: merged,
                    module_doc: base_obj.module_doc.clone(),
                })))
            }

            ExprKind::Array { elements } => self.eval_array_elements(elements, env, cwd),

            ExprKind::Tuple { elements } => {
                let mut out = Vec::with_capacity(elements.len());
                for e in elements {
                    out.push(Value::Thunk(Thunk::new(e.clone(), env.clone(), cwd.cloned())));
                }
                Ok(Value::Tuple(Rc::new(out)))
            }

            ExprKind::ArrayComprehension { body, clauses, filter } => {
                let mut out = Vec::new();
                self.run_comprehension(clauses, filter.as_deref(), env, cwd, &mut |scoped_env, ev| {
                    let v = ev.eval(body, scoped_env, cwd)?;
                    out.push(v);
                    Ok(())
                })?;
                Ok(Value::Array(Rc::new(out)))
            }

            ExprKind::ObjectComprehension { key, value, clauses, filter } => {
                let mut fields = Vec::new();
                self.run_comprehension(clauses, filter.as_deref(), env, cwd, &mut |scoped_env, ev| {
                    let k = ev.eval(key, scoped_env, cwd)?;
                    let k = ev.force(k, key.location)?;
                    let key_name = ev.value_as_field_key(k, key.location)?;
                    let v = Value::Thunk(Thunk::new(value.clone(), scoped_env.clone(), cwd.cloned()));
                    fields.retain(|f: &ObjectField| f.key != key_name);
                    fields.push(ObjectField {
                        key: key_name,
                        value: v,
                        is_patch: false,
                    });
                    Ok(())
                })?;
                Ok(Value::Object(Rc::new(ObjectValue { fields, module_doc: None })))
            }

            ExprKind::Range { start, end, inclusive } => {
                let s = self.eval(start, env, cwd)?;
                let s = self.force(s, start.location)?;
                let e = self.eval(end, env, cwd)?;
                let e = self.force(e, end.location)?;
                let (Value::Integer(s), Value::Integer(e)) = (s, e) else {
                    return Err(self.record(LazyError::new(
                        LazyErrorKind::TypeMismatch {
                            expected: "Integer".to_string(),
                            found: "non-integer range bound".to_string(),
                        },
                        expr.location,
                    )));
                };
                let end_exclusive = if *inclusive { e + 1 } else { e };
                let items: Vec<Value> = (s..end_exclusive).map(Value::Integer).collect();
                Ok(Value::Array(Rc::new(items)))
            }

            ExprKind::FieldAccess { object, field, field_location } => {
                let obj = self.eval(object, env, cwd)?;
                let obj = self.force(obj, object.location)?;
                self.field_access(&obj, field, *field_location)
            }

            ExprKind::Index { object, index } => {
                let obj = self.eval(object, env, cwd)?;
                let obj = self.force(obj, object.location)?;
                let idx = self.eval(index, env, cwd)?;
                let idx = self.force(idx, index.location)?;
                self.index_access(&obj, &idx, expr.location)
            }

            // `.a.b.c` as an argument desugars to a one-parameter lambda
            // whose body is the matching chain of field accesses (§4.2);
            // building the same `Value::Function` user closures use keeps
            // native `fn`-pointer built-ins free of captured state.
            ExprKind::FieldAccessor { fields } => Ok(Value::Function(Rc::new(FunctionValue {
                param: synthetic_pattern("__accessor_subject", expr.location),
                body: field_accessor_body(fields, expr.location),
                captured_env: env.clone(),
            }))),

            ExprKind::FieldProjection { object, fields } => {
                let obj = self.eval(object, env, cwd)?;
                let obj = self.force(obj, object.location)?;
                let Value::Object(obj) = obj else {
                    return Err(self.record(LazyError::new(
                        LazyErrorKind::TypeMismatch {
                            expected: "Object".to_string(),
                            found: "non-object".to_string(),
                        },
                        object.location,
                    )));
                };
                let mut projected = Vec::new();
                for name in fields {
                    let Some(existing) = obj.fields.iter().find(|f| &*f.key == name.as_str()) else {
                        return Err(self.record(LazyError::new(
                            LazyErrorKind::UnknownIdentifier { name: name.clone() },
                            expr.location,
                        )));
                    };
                    projected.push(existing.clone());
                }
                Ok(Value::Object(Rc::new(ObjectValue { fields: projected, module_doc: None })))
            }

            ExprKind::ImportExpr { path, path_location } => self.eval_import(path, *path_location, cwd),

            // `(op)` desugars to the curried two-parameter lambda
            // `a -> b -> a op b` for the same reason as `FieldAccessor`.
            ExprKind::OperatorFunction { op } => Ok(Value::Function(Rc::new(FunctionValue {
                param: synthetic_pattern("__op_lhs", expr.location),
                body: operator_function_body(*op, expr.location),
                captured_env: env.clone(),
            }))),
        }
    }

    // ------------------------------------------------------------------
    // Forcing and error bookkeeping
    // ------------------------------------------------------------------

    fn force(&mut self, value: Value, span: Span) -> Result<Value, LazyError> {
        trace!(?span, "forcing value");
        let result = force(value, &mut |e, env, cwd| self.eval(e, env, cwd));
        match result {
            Ok(v) => Ok(v),
            Err(mut e) => {
                if e.span == Span::default() {
                    e.span = span;
                }
                Err(self.record(e))
            }
        }
    }

    fn record(&mut self, err: LazyError) -> LazyError {
        self.ctx.record(&err);
        err
    }

    /// Force `v` and everything reachable through it. Used by the
    /// string-interpolation formatter (§4.3, §4.4), which needs a fully
    /// realized tree to render rather than a shallow WHNF value.
    pub fn force_deep_for_format(&mut self, v: Value, span: Span) -> Result<Value, LazyError> {
        let forced = self.force(v, span)?;
        match forced {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(self.force_deep_for_format(item.clone(), span)?);
                }
                Ok(Value::Array(Rc::new(out)))
            }
            Value::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(self.force_deep_for_format(item.clone(), span)?);
                }
                Ok(Value::Tuple(Rc::new(out)))
            }
            Value::Object(obj) => {
                let mut fields = Vec::with_capacity(obj.fields.len());
                for f in &obj.fields {
                    fields.push(ObjectField {
                        key: f.key.clone(),
                        value: self.force_deep_for_format(f.value.clone(), span)?,
                        is_patch: f.is_patch,
                    });
                }
                Ok(Value::Object(Rc::new(ObjectValue {
                    fields,
                    module_doc: obj.module_doc.clone(),
                })))
            }
            other => Ok(other),
        }
    }

    fn as_bool(&mut self, v: Value, span: Span) -> Result<bool, LazyError> {
        match v {
            Value::Boolean(b) => Ok(b),
            other => Err(self.record(LazyError::new(
                LazyErrorKind::TypeMismatch {
                    expected: "Boolean".to_string(),
                    found: other.type_name().to_string(),
                },
                span,
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Function application
    // ------------------------------------------------------------------

    fn apply(&mut self, func: Value, argument: Value, call_site: Span) -> Result<Value, LazyError> {
        match func {
            Value::Function(f) => {
                let arg_env = self.bind_pattern(&f.param, argument, &f.captured_env)?;
                self.eval(&f.body, &arg_env, None)
            }
            Value::NativeFn(native) => {
                let forced = self.force(argument, call_site)?;
                let mut applied = native.applied.clone();
                applied.push(forced);
                if applied.len() >= native.arity {
                    self.call_native(&native, applied, call_site)
                } else {
                    Ok(Value::NativeFn(Rc::new(NativeFnValue {
                        name: native.name,
                        arity: native.arity,
                        applied,
                        handler: native.handler,
                    })))
                }
            }
            other => Err(self.record(LazyError::new(
                LazyErrorKind::ExpectedFunction {
                    found: other.type_name().to_string(),
                },
                call_site,
            ))),
        }
    }

    /// Runs a fully-applied native built-in, giving it an `apply`/`force`
    /// pair that reborrow `self` through a `RefCell` so the handler can
    /// call back into user functions (`fold`) or drive nested thunks to
    /// values (the JSON/YAML formatters) without itself holding an
    /// `Evaluator`. The two closures are never live at once, so the
    /// runtime borrow check never actually contends.
    fn call_native(&mut self, native: &NativeFnValue, args: Vec<Value>, span: Span) -> Result<Value, LazyError> {
        let cell = RefCell::new(self);
        let mut apply_fn = |f: Value, a: Value, s: Span| cell.borrow_mut().apply(f, a, s);
        let mut force_fn = |v: Value, s: Span| cell.borrow_mut().force(v, s);
        let mut ctx = NativeCtx {
            apply: &mut apply_fn,
            force: &mut force_fn,
        };
        let result = (native.handler)(args, span, &mut ctx);
        drop(ctx);
        result.map_err(|e| cell.into_inner().record(e))
    }

    // ------------------------------------------------------------------
    // Pattern matching / binding
    // ------------------------------------------------------------------

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, env: &Env) -> Result<Env, LazyError> {
        match self.try_match(pattern, value, env)? {
            Some(env) => Ok(env),
            None => Err(self.record(LazyError::new(LazyErrorKind::PatternMatchFailure, pattern.location))),
        }
    }

    /// Returns `Ok(None)` on a structural mismatch (used by `when
    /// matches` to try the next branch) and `Err` only for a genuine
    /// evaluation failure while forcing a value needed to decide the
    /// match.
    fn try_match(&mut self, pattern: &Pattern, value: Value, env: &Env) -> Result<Option<Env>, LazyError> {
        match pattern.kind() {
            PatternKind::Wildcard => Ok(Some(env.clone())),
            PatternKind::Identifier(name) => Ok(Some(env.bind(name.as_str(), value))),
            PatternKind::Integer(expected) => {
                let v = self.force(value, pattern.location)?;
                Ok((v == Value::Integer(*expected)).then(|| env.clone()))
            }
            PatternKind::Float(expected) => {
                let v = self.force(value, pattern.location)?;
                Ok((v == Value::Float(*expected)).then(|| env.clone()))
            }
            PatternKind::String(expected) => {
                let v = self.force(value, pattern.location)?;
                Ok(matches!(&v, Value::String(s) if &**s == expected.as_str()).then(|| env.clone()))
            }
            PatternKind::Symbol(expected) => {
                let v = self.force(value, pattern.location)?;
                Ok(matches!(&v, Value::Symbol(s) if &**s == expected.as_str()).then(|| env.clone()))
            }
            PatternKind::Boolean(expected) => {
                let v = self.force(value, pattern.location)?;
                Ok((v == Value::Boolean(*expected)).then(|| env.clone()))
            }
            PatternKind::Null => {
                let v = self.force(value, pattern.location)?;
                Ok((v == Value::Null).then(|| env.clone()))
            }
            PatternKind::Tuple(patterns) => {
                let v = self.force(value, pattern.location)?;
                let Value::Tuple(items) = v else { return Ok(None) };
                if items.len() != patterns.len() {
                    return Ok(None);
                }
                let mut scoped = env.clone();
                for (p, item) in patterns.iter().zip(items.iter()) {
                    match self.try_match(p, item.clone(), &scoped)? {
                        Some(next) => scoped = next,
                        None => return Ok(None),
                    }
                }
                Ok(Some(scoped))
            }
            PatternKind::Array { elements, rest } => {
                let v = self.force(value, pattern.location)?;
                let Value::Array(items) = v else { return Ok(None) };
                if rest.is_none() && items.len() != elements.len() {
                    return Ok(None);
                }
                if rest.is_some() && items.len() < elements.len() {
                    return Ok(None);
                }
                let mut scoped = env.clone();
                for (p, item) in elements.iter().zip(items.iter()) {
                    match self.try_match(p, item.clone(), &scoped)? {
                        Some(next) => scoped = next,
                        None => return Ok(None),
                    }
                }
                if let Some(rest_name) = rest {
                    let remainder: Vec<Value> = items[elements.len()..].to_vec();
                    scoped = scoped.bind(rest_name.as_str(), Value::Array(Rc::new(remainder)));
                }
                Ok(Some(scoped))
            }
            PatternKind::Object { fields } => {
                let v = self.force(value, pattern.location)?;
                let Value::Object(obj) = v else { return Ok(None) };
                let mut scoped = env.clone();
                for (name, sub_pattern) in fields {
                    let Some(field_value) = obj.get(name) else {
                        return Ok(None);
                    };
                    match self.try_match(sub_pattern, field_value.clone(), &scoped)? {
                        Some(next) => scoped = next,
                        None => return Ok(None),
                    }
                }
                Ok(Some(scoped))
            }
        }
    }

    fn eval_when_matches(
        &mut self,
        scrutinee: &Value,
        branches: &[WhenBranch],
        otherwise: Option<&Expr>,
        env: &Env,
        cwd: Option<&Rc<PathBuf>>,
        whole_span: Span,
    ) -> Result<Value, LazyError> {
        for branch in branches {
            if let Some(bound) = self.try_match(&branch.pattern, scrutinee.clone(), env)? {
                return self.eval(&branch.result, &bound, cwd);
            }
        }
        if let Some(otherwise) = otherwise {
            return self.eval(otherwise, env, cwd);
        }
        Err(self.record(LazyError::new(LazyErrorKind::PatternMatchFailure, whole_span)))
    }

    // ------------------------------------------------------------------
    // Binary operators
    // ------------------------------------------------------------------

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Env,
        cwd: Option<&Rc<PathBuf>>,
        whole_span: Span,
    ) -> Result<Value, LazyError> {
        match op {
            BinaryOp::And => {
                let l = self.eval(left, env, cwd)?;
                let l = self.force(l, left.location)?;
                if !self.as_bool(l, left.location)? {
                    return Ok(Value::Boolean(false));
                }
                let r = self.eval(right, env, cwd)?;
                let r = self.force(r, right.location)?;
                Ok(Value::Boolean(self.as_bool(r, right.location)?))
            }
            BinaryOp::Or => {
                let l = self.eval(left, env, cwd)?;
                let l = self.force(l, left.location)?;
                if self.as_bool(l, left.location)? {
                    return Ok(Value::Boolean(true));
                }
                let r = self.eval(right, env, cwd)?;
                let r = self.force(r, right.location)?;
                Ok(Value::Boolean(self.as_bool(r, right.location)?))
            }
            BinaryOp::Pipeline => {
                let func = self.eval(right, env, cwd)?;
                let func = self.force(func, right.location)?;
                let arg = Value::Thunk(Thunk::new(left.clone(), env.clone(), cwd.cloned()));
                self.apply(func, arg, whole_span)
            }
            _ => {
                let l = self.eval(left, env, cwd)?;
                let l = self.force(l, left.location)?;
                let r = self.eval(right, env, cwd)?;
                let r = self.force(r, right.location)?;
                self.apply_binary_values(op, l, r, whole_span)
            }
        }
    }

    fn apply_binary_values(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> Result<Value, LazyError> {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => self.arith(op, l, r, span),
            BinaryOp::Eq => Ok(Value::Boolean(self.structural_eq(&l, &r, span)?)),
            BinaryOp::NotEq => Ok(Value::Boolean(!self.structural_eq(&l, &r, span)?)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => self.compare(op, l, r, span),
            BinaryOp::Merge => self.merge_objects(l, r, span),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Pipeline => {
                unreachable!("short-circuiting operators handled in eval_binary")
            }
        }
    }

    fn arith(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> Result<Value, LazyError> {
        use BinaryOp::*;
        match (&l, &r) {
            (Value::Integer(a), Value::Integer(b)) => match op {
                Add => a
                    .checked_add(*b)
                    .map(Value::Integer)
                    .ok_or_else(|| self.record(LazyError::new(LazyErrorKind::IntegerOverflow, span))),
                Sub => a
                    .checked_sub(*b)
                    .map(Value::Integer)
                    .ok_or_else(|| self.record(LazyError::new(LazyErrorKind::IntegerOverflow, span))),
                Mul => a
                    .checked_mul(*b)
                    .map(Value::Integer)
                    .ok_or_else(|| self.record(LazyError::new(LazyErrorKind::IntegerOverflow, span))),
                Div => {
                    if *b == 0 {
                        Err(self.record(LazyError::new(LazyErrorKind::DivisionByZero, span)))
                    } else {
                        Ok(Value::Integer(a.div_euclid(*b)))
                    }
                }
                _ => unreachable!(),
            },
            _ if l.as_number().is_some() && r.as_number().is_some() => {
                let a = l.as_number().unwrap();
                let b = r.as_number().unwrap();
                match op {
                    Add => Ok(Value::Float(a + b)),
                    Sub => Ok(Value::Float(a - b)),
                    Mul => Ok(Value::Float(a * b)),
                    Div => {
                        if b == 0.0 {
                            Err(self.record(LazyError::new(LazyErrorKind::DivisionByZero, span)))
                        } else {
                            Ok(Value::Float(a / b))
                        }
                    }
                    _ => unreachable!(),
                }
            }
            _ => Err(self.record(LazyError::new(
                LazyErrorKind::TypeMismatch {
                    expected: "Integer or Float".to_string(),
                    found: format!("{} and {}", l.type_name(), r.type_name()),
                },
                span,
            ))),
        }
    }

    fn compare(&mut self, op: BinaryOp, l: Value, r: Value, span: Span) -> Result<Value, LazyError> {
        use std::cmp::Ordering;
        let ordering = match (&l, &r) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ if l.as_number().is_some() && r.as_number().is_some() => l
                .as_number()
                .unwrap()
                .partial_cmp(&r.as_number().unwrap())
                .unwrap_or(Ordering::Equal),
            _ => {
                return Err(self.record(LazyError::new(
                    LazyErrorKind::TypeMismatch {
                        expected: "comparable types (Integer/Float/String)".to_string(),
                        found: format!("{} and {}", l.type_name(), r.type_name()),
                    },
                    span,
                )))
            }
        };
        let result = match op {
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::Le => ordering != Ordering::Greater,
            BinaryOp::Ge => ordering != Ordering::Less,
            _ => unreachable!(),
        };
        Ok(Value::Boolean(result))
    }

    /// Structural equality per §4.3, forcing nested thunks (array
    /// elements, object field values) as it recurses.
    fn structural_eq(&mut self, l: &Value, r: &Value, span: Span) -> Result<bool, LazyError> {
        match (l, r) {
            (Value::Array(a), Value::Array(b))
            | (Value::Tuple(a), Value::Tuple(b))
            | (Value::Array(a), Value::Tuple(b))
            | (Value::Tuple(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    let x = self.force(x.clone(), span)?;
                    let y = self.force(y.clone(), span)?;
                    if !self.structural_eq(&x, &y, span)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Value::Object(a), Value::Object(b)) => {
                if a.fields.len() != b.fields.len() {
                    return Ok(false);
                }
                for (fa, fb) in a.fields.iter().zip(b.fields.iter()) {
                    if fa.key != fb.key || fa.is_patch != fb.is_patch {
                        return Ok(false);
                    }
                    let va = self.force(fa.value.clone(), span)?;
                    let vb = self.force(fb.value.clone(), span)?;
                    if !self.structural_eq(&va, &vb, span)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(l == r),
        }
    }

    // ------------------------------------------------------------------
    // Objects: construction, merge, extension
    // ------------------------------------------------------------------

    fn build_object_fields(&mut self, fields: &[AstObjectField], env: &Env, cwd: Option<&Rc<PathBuf>>) -> Result<Vec<ObjectField>, LazyError> {
        let mut out: Vec<ObjectField> = Vec::with_capacity(fields.len());
        for field in fields {
            let key = match &field.key {
                FieldKey::Static(name) => Rc::from(name.as_str()),
                FieldKey::Dynamic(key_expr) => {
                    let k = self.eval(key_expr, env, cwd)?;
                    let k = self.force(k, key_expr.location)?;
                    self.value_as_field_key(k, key_expr.location)?
                }
            };
            let value = Value::Thunk(Thunk::new(field.value.clone(), env.clone(), cwd.cloned()));
            if let Some(existing) = out.iter_mut().find(|f: &&mut ObjectField| f.key == key) {
                existing.value = value;
                existing.is_patch = field.is_patch;
            } else {
                out.push(ObjectField {
                    key,
                    value,
                    is_patch: field.is_patch,
                });
            }
        }
        Ok(out)
    }

    fn value_as_field_key(&mut self, v: Value, span: Span) -> Result<Rc<str>, LazyError> {
        match v {
            Value::String(s) => Ok(s),
            Value::Symbol(s) => Ok(s),
            other => Err(self.record(LazyError::new(
                LazyErrorKind::TypeMismatch {
                    expected: "String or Symbol key".to_string(),
                    found: other.type_name().to_string(),
                },
                span,
            ))),
        }
    }

    fn merge_objects(&mut self, l: Value, r: Value, span: Span) -> Result<Value, LazyError> {
        let (Value::Object(a), Value::Object(b)) = (&l, &r) else {
            return Err(self.record(LazyError::new(
                LazyErrorKind::TypeMismatch {
                    expected: "Object".to_string(),
                    found: format!("{} and {}", l.type_name(), r.type_name()),
                },
                span,
            )));
        };
        let merged = self.merge_fields(&a.fields, &b.fields, span)?;
        Ok(Value::Object(Rc::new(ObjectValue {
            fields: merged,
            module_doc: a.module_doc.clone().or_else(|| b.module_doc.clone()),
        })))
    }

    /// Core of `&` and `base { ... }` (§4.3): left-original-order for
    /// preserved keys, then newly introduced right-side keys in their
    /// own declaration order. Non-patch right fields overwrite; patch
    /// fields recursively deep-merge into an existing object value.
    fn merge_fields(&mut self, left: &[ObjectField], right: &[ObjectField], span: Span) -> Result<Vec<ObjectField>, LazyError> {
        let mut out: Vec<ObjectField> = left.to_vec();
        for rf in right {
            if let Some(existing) = out.iter().position(|f| f.key == rf.key) {
                if rf.is_patch {
                    let base_value = self.force(out[existing].value.clone(), span)?;
                    let Value::Object(base_obj) = &base_value else {
                        return Err(self.record(LazyError::new(
                            LazyErrorKind::TypeMismatch {
                                expected: "Object (patch target)".to_string(),
                                found: base_value.type_name().to_string(),
                            },
                            span,
                        )));
                    };
                    let patch_value = self.force(rf.value.clone(), span)?;
                    let Value::Object(patch_obj) = &patch_value else {
                        return Err(self.record(LazyError::new(
                            LazyErrorKind::TypeMismatch {
                                expected: "Object (patch payload)".to_string(),
                                found: patch_value.type_name().to_string(),
                            },
                            span,
                        )));
                    };
                    let nested = self.merge_fields(&base_obj.fields, &patch_obj.fields, span)?;
                    out[existing] = ObjectField {
                        key: rf.key.clone(),
                        value: Value::Object(Rc::new(ObjectValue {
                            fields: nested,
                            module_doc: base_obj.module_doc.clone(),
                        })),
                        is_patch: false,
                    };
                } else {
                    out[existing] = ObjectField {
                        key: rf.key.clone(),
                        value: rf.value.clone(),
                        is_patch: false,
                    };
                }
            } else {
                out.push(rf.clone());
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Arrays and comprehensions
    // ------------------------------------------------------------------

    fn eval_array_elements(&mut self, elements: &[ArrayElement], env: &Env, cwd: Option<&Rc<PathBuf>>) -> Result<Value, LazyError> {
        let mut out = Vec::new();
        for el in elements {
            match el {
                ArrayElement::Normal(e) => {
                    out.push(Value::Thunk(Thunk::new(e.clone(), env.clone(), cwd.cloned())));
                }
                ArrayElement::Spread(e) => {
                    let v = self.eval(e, env, cwd)?;
                    let v = self.force(v, e.location)?;
                    match v {
                        Value::Array(items) | Value::Tuple(items) => out.extend(items.iter().cloned()),
                        other => {
                            return Err(self.record(LazyError::new(
                                LazyErrorKind::TypeMismatch {
                                    expected: "Array or Tuple".to_string(),
                                    found: other.type_name().to_string(),
                                },
                                e.location,
                            )))
                        }
                    }
                }
                ArrayElement::ConditionalIf(e, cond) => {
                    let c = self.eval(cond, env, cwd)?;
                    let c = self.force(c, cond.location)?;
                    if self.as_bool(c, cond.location)? {
                        out.push(Value::Thunk(Thunk::new(e.clone(), env.clone(), cwd.cloned())));
                    }
                }
                ArrayElement::ConditionalUnless(e, cond) => {
                    let c = self.eval(cond, env, cwd)?;
                    let c = self.force(c, cond.location)?;
                    if !self.as_bool(c, cond.location)? {
                        out.push(Value::Thunk(Thunk::new(e.clone(), env.clone(), cwd.cloned())));
                    }
                }
            }
        }
        Ok(Value::Array(Rc::new(out)))
    }

    fn run_comprehension(
        &mut self,
        clauses: &[ComprehensionClause],
        filter: Option<&Expr>,
        env: &Env,
        cwd: Option<&Rc<PathBuf>>,
        emit: &mut dyn FnMut(&Env, &mut Evaluator) -> Result<(), LazyError>,
    ) -> Result<(), LazyError> {
        let Some((clause, rest)) = clauses.split_first() else {
            if let Some(filter) = filter {
                let c = self.eval(filter, env, cwd)?;
                let c = self.force(c, filter.location)?;
                if !self.as_bool(c, filter.location)? {
                    return Ok(());
                }
            }
            return emit(env, self);
        };
        let iterable = self.eval(&clause.iterable, env, cwd)?;
        let iterable = self.force(iterable, clause.iterable.location)?;
        let items: Vec<Value> = match iterable {
            Value::Array(items) | Value::Tuple(items) => (*items).clone(),
            other => {
                return Err(self.record(LazyError::new(
                    LazyErrorKind::TypeMismatch {
                        expected: "Array".to_string(),
                        found: other.type_name().to_string(),
                    },
                    clause.iterable.location,
                )))
            }
        };
        for item in items {
            let Some(scoped) = self.try_match(&clause.pattern, item, env)? else {
                continue;
            };
            self.run_comprehension(rest, filter, &scoped, cwd, emit)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Field access / indexing
    // ------------------------------------------------------------------

    fn field_access(&mut self, obj: &Value, field: &str, location: Span) -> Result<Value, LazyError> {
        match obj {
            Value::Object(o) => o.get(field).cloned().ok_or_else(|| {
                self.record(LazyError::new(
                    LazyErrorKind::UnknownIdentifier { name: field.to_string() },
                    location,
                ))
            }),
            other => Err(self.record(LazyError::new(
                LazyErrorKind::TypeMismatch {
                    expected: "Object".to_string(),
                    found: other.type_name().to_string(),
                },
                location,
            ))),
        }
    }

    fn index_access(&mut self, obj: &Value, index: &Value, span: Span) -> Result<Value, LazyError> {
        match (obj, index) {
            (Value::Array(items) | Value::Tuple(items), Value::Integer(i)) => {
                let idx = if *i < 0 { *i + items.len() as i64 } else { *i };
                if idx < 0 || idx as usize >= items.len() {
                    return Err(self.record(LazyError::new(
                        LazyErrorKind::InvalidArgument {
                            detail: format!("index {i} out of bounds for length {}", items.len()),
                        },
                        span,
                    )));
                }
                Ok(items[idx as usize].clone())
            }
            (Value::Object(_), Value::String(_) | Value::Symbol(_)) => {
                let key = match index {
                    Value::String(s) | Value::Symbol(s) => s.clone(),
                    _ => unreachable!(),
                };
                self.field_access(obj, &key, span)
            }
            _ => Err(self.record(LazyError::new(
                LazyErrorKind::TypeMismatch {
                    expected: "Array/Tuple with Integer index or Object with String key".to_string(),
                    found: format!("{} indexed by {}", obj.type_name(), index.type_name()),
                },
                span,
            ))),
        }
    }

    // ------------------------------------------------------------------
    // String interpolation
    // ------------------------------------------------------------------

    fn eval_interpolation(&mut self, parts: &[InterpolationPart], env: &Env, cwd: Option<&Rc<PathBuf>>, span: Span) -> Result<Value, LazyError> {
        let mut out = String::new();
        for part in parts {
            match part {
                InterpolationPart::Literal(s) => out.push_str(s),
                InterpolationPart::Expr(e) => {
                    let v = self.eval(e, env, cwd)?;
                    let v = self.force(v, e.location)?;
                    out.push_str(&crate::format::format_interpolated(&v, span, self)?);
                }
            }
        }
        Ok(Value::string(out))
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn eval_import(&mut self, raw_path: &str, path_location: Span, cwd: Option<&Rc<PathBuf>>) -> Result<Value, LazyError> {
        let normalized = if Path::new(raw_path).extension().is_some() {
            raw_path.to_string()
        } else {
            format!("{raw_path}.lazy")
        };

        let mut candidates = Vec::new();
        if let Some(cwd_file) = cwd {
            if let Some(dir) = cwd_file.parent() {
                candidates.push(dir.join(&normalized));
            }
        }
        if let Ok(process_cwd) = std::env::current_dir() {
            candidates.push(process_cwd.join(&normalized));
        }
        for dir in &self.search_path.0 {
            candidates.push(dir.join(&normalized));
        }

        for candidate in &candidates {
            if let Ok(canonical) = candidate.canonicalize() {
                if let Some(cached) = self.module_cache.get(&canonical) {
                    debug!(module = %canonical.display(), "import cache hit");
                    return Ok(cached.clone());
                }
                if let Ok(text) = std::fs::read_to_string(&canonical) {
                    debug!(module = %canonical.display(), "import resolved");
                    let file_name = canonical.to_string_lossy().to_string();
                    self.ctx.register_source(file_name.clone(), text.clone());
                    let ast = crate::parser::parse(&text)
                        .map_err(|e| self.ctx.attach_source(e, &file_name))?;
                    let root_env = self.stdlib_env()?;
                    let module_cwd = Rc::new(canonical.clone());
                    let value = self
                        .eval(&ast, &root_env, Some(&module_cwd))
                        .map_err(|e| self.ctx.attach_source(e, &file_name))?;
                    self.module_cache.insert(canonical, value.clone());
                    return Ok(value);
                }
            }
        }

        debug!(module = raw_path, candidates = candidates.len(), "import not found");
        Err(self.record(LazyError::new(
            LazyErrorKind::ModuleNotFound {
                module_name: raw_path.to_string(),
            },
            path_location,
        )))
    }
}

fn synthetic_pattern(name: &str, location: Span) -> Pattern {
    Pattern::new(PatternKind::Identifier(name.to_string()), location)
}

fn synthetic_ident(name: &str, location: Span) -> Expr {
    Expr::new(ExprKind::Identifier(name.to_string()), location)
}

/// Builds the chained `subject.field1.field2...` body for a
/// field-accessor function (§4.2).
fn field_accessor_body(fields: &[String], location: Span) -> Expr {
    let mut expr = synthetic_ident("__accessor_subject", location);
    for field in fields {
        expr = Expr::new(
            ExprKind::FieldAccess {
                object: Box::new(expr),
                field: field.clone(),
                field_location: location,
            },
            location,
        );
    }
    expr
}

/// Builds the curried `a -> b -> a op b` body for an operator section
/// (§4.2, "operator-as-function").
fn operator_function_body(op: BinaryOp, location: Span) -> Expr {
    let inner_body = Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(synthetic_ident("__op_lhs", location)),
            right: Box::new(synthetic_ident("__op_rhs", location)),
        },
        location,
    );
    Expr::new(
        ExprKind::Lambda {
            param: Box::new(synthetic_pattern("__op_rhs", location)),
            body: Box::new(inner_body),
        },
        location,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalErrorContext;

    fn eval_source(src: &str) -> Result<Value, LazyError> {
        let ast = crate::parser::parse(src)?;
        let mut ctx = EvalErrorContext::new();
        let mut evaluator = Evaluator::new(&mut ctx, ModuleSearchPath::default());
        let env = evaluator.stdlib_env()?;
        let v = evaluator.eval(&ast, &env, None)?;
        evaluator.force(v, ast.location)
    }

    #[test]
    fn arithmetic_with_int_float_promotion() {
        assert_eq!(eval_source("1 + 2.5").unwrap(), Value::Float(3.5));
    }

    #[test]
    fn let_binding_is_lazy_but_forced_on_demand() {
        assert_eq!(eval_source("let x = 1 + 2; x * 10").unwrap(), Value::Integer(30));
    }

    #[test]
    fn division_by_zero_errors() {
        assert!(matches!(
            eval_source("1 / 0").unwrap_err().kind,
            LazyErrorKind::DivisionByZero
        ));
    }

    #[test]
    fn pattern_match_failure_on_bad_tuple_arity() {
        let err = eval_source("(a, b) = (1, 2, 3); a").unwrap_err();
        assert!(matches!(err.kind, LazyErrorKind::PatternMatchFailure));
    }

    #[test]
    fn object_merge_overwrites_and_appends() {
        let v = eval_source("{ a: 1, b: 2 } & { b: 20, c: 30 }").unwrap();
        let Value::Object(o) = v else { panic!() };
        assert_eq!(o.fields.len(), 3);
        assert_eq!(o.get("b"), Some(&Value::Integer(20)));
    }

    #[test]
    fn patch_field_deep_merges() {
        let v = eval_source("{ user: { name: \"a\", age: 1 } } & { user { age: 2 } }").unwrap();
        let Value::Object(o) = v else { panic!() };
        let Value::Object(user) = o.get("user").unwrap().clone() else { panic!() };
        assert_eq!(user.get("age"), Some(&Value::Integer(2)));
        assert_eq!(user.get("name"), Some(&Value::string("a")));
    }

    #[test]
    fn array_comprehension_with_filter() {
        // `..` is inclusive (§4.2), so `1..4` covers 1,2,3,4.
        let v = eval_source("[ n * n for n in 1..4 when n != 2 ]").unwrap();
        assert_eq!(
            v,
            Value::Array(Rc::new(vec![Value::Integer(1), Value::Integer(9), Value::Integer(16)]))
        );
    }

    #[test]
    fn lazy_binding_never_forced_does_not_error() {
        // `bad` is never demanded, so the division-by-zero inside it must
        // not surface.
        assert_eq!(eval_source("let bad = 1 / 0; 42").unwrap(), Value::Integer(42));
    }

    #[test]
    fn when_matches_falls_through_to_otherwise() {
        let v = eval_source("when 5 matches 1 then \"one\"; otherwise \"many\"").unwrap();
        assert_eq!(v, Value::string("many"));
    }

    #[test]
    fn pipeline_desugars_to_application() {
        assert_eq!(eval_source("5 \\ (n -> n * n)").unwrap(), Value::Integer(25));
    }

    #[test]
    fn operator_section_applies_curried() {
        assert_eq!(eval_source("(+) 2 3").unwrap(), Value::Integer(5));
    }

    #[test]
    fn field_accessor_as_argument() {
        let v = eval_source("let get = .name; get { name: \"ok\" }").unwrap();
        assert_eq!(v, Value::string("ok"));
    }

    #[test]
    fn recursive_let_bound_function_calls_itself() {
        let v = eval_source(
            "let fact = n -> if n <= 1 then 1 else n * fact (n - 1); fact 5",
        )
        .unwrap();
        assert_eq!(v, Value::Integer(120));
    }

    #[test]
    fn where_binding_sees_earlier_sibling() {
        let v = eval_source("b where a = 1, b = a + 1").unwrap();
        assert_eq!(v, Value::Integer(2));
    }

    #[test]
    fn where_binding_can_reference_itself() {
        // `rec` must be visible inside its own right-hand side, the same
        // way a recursive `let` binding is.
        let v = eval_source("rec.b where rec = { a: 1, b: rec.a + 1 }").unwrap();
        assert_eq!(v, Value::Integer(2));
    }
}
