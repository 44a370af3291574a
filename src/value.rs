//! Runtime values and thunk cells (§3). A [`Value`] is itself allowed to be
//! an unforced [`Thunk`] — array/tuple elements and object field values are
//! stored this way so laziness is uniform everywhere a binding can occur.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::Expr;
use crate::env::Env;
use crate::error::{LazyError, LazyErrorKind};
use crate::token::Span;

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Symbol(Rc<str>),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Object(Rc<ObjectValue>),
    Function(Rc<FunctionValue>),
    NativeFn(Rc<NativeFnValue>),
    Thunk(Thunk),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub key: Rc<str>,
    pub value: Value,
    pub is_patch: bool,
}

// `PartialEq` on `Value` is structural equality (§4.3) except for
// functions, which compare by pointer identity, and thunks, which are
// never compared without forcing first (callers must force before ==).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Tuple(b)) | (Value::Tuple(a), Value::Array(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::NativeFn(a), Value::NativeFn(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Boolean(_) => "Boolean",
            Value::Null => "Null",
            Value::Symbol(_) => "Symbol",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
            Value::Object(_) => "Object",
            Value::Function(_) | Value::NativeFn(_) => "Function",
            Value::Thunk(_) => "Thunk",
        }
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub fields: Vec<ObjectField>,
    pub module_doc: Option<String>,
}

impl ObjectValue {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| &*f.key == key).map(|f| &f.value)
    }
}

#[derive(Debug)]
pub struct FunctionValue {
    pub param: crate::ast::Pattern,
    pub body: Expr,
    pub captured_env: Env,
}

/// Lets a native handler call back into the evaluator without holding
/// one itself: `apply` invokes a user function (for higher-order
/// built-ins like `fold`/`Array.map`), `force` drives a thunk to a value
/// (for built-ins like the JSON/YAML formatters that must walk into
/// unforced array elements and object fields).
pub struct NativeCtx<'a> {
    pub apply: &'a mut dyn FnMut(Value, Value, Span) -> Result<Value, LazyError>,
    pub force: &'a mut dyn FnMut(Value, Span) -> Result<Value, LazyError>,
}

pub type NativeHandler = fn(args: Vec<Value>, span: Span, ctx: &mut NativeCtx) -> Result<Value, LazyError>;

/// A built-in, invoked through the uniform calling convention of §4.3.
/// Since `application` is always unary, a multi-argument built-in is
/// curried: `applied` accumulates forced arguments one at a time until
/// `arity` is reached, at which point `handler` runs.
pub struct NativeFnValue {
    pub name: &'static str,
    pub arity: usize,
    pub applied: Vec<Value>,
    pub handler: NativeHandler,
}

impl NativeFnValue {
    pub fn new(name: &'static str, arity: usize, handler: NativeHandler) -> Self {
        Self {
            name,
            arity,
            applied: Vec::new(),
            handler,
        }
    }
}

impl std::fmt::Debug for NativeFnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

/// The thunk state machine from §3/§4.3: `Unevaluated` holds everything
/// needed to run the computation later; `Evaluating` is the black-hole
/// sentinel; `Value` is the terminal, memoized result.
#[derive(Debug)]
pub enum ThunkState {
    Unevaluated {
        expr: Expr,
        env: Env,
        cwd: Option<Rc<PathBuf>>,
    },
    Evaluating,
    Value(Value),
}

#[derive(Debug, Clone)]
pub struct Thunk(pub Rc<RefCell<ThunkState>>);

impl Thunk {
    pub fn new(expr: Expr, env: Env, cwd: Option<Rc<PathBuf>>) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkState::Unevaluated { expr, env, cwd })))
    }

    pub fn ready(value: Value) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkState::Value(value))))
    }

    /// Rebinds the captured environment in place. Used by recursive
    /// `let`/`where` bindings: the thunk is built against a pre-binding
    /// environment (so its own name exists to clone into), then patched
    /// to the post-binding environment once that exists, so forcing it
    /// later can see the binding itself (§4.2, recursive bindings). A
    /// no-op if the thunk has already been forced.
    pub fn rebind_env(&self, new_env: Env) {
        if let ThunkState::Unevaluated { env, .. } = &mut *self.0.borrow_mut() {
            *env = new_env;
        }
    }
}

impl PartialEq for Thunk {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Force a value to weak-head normal form: if it's a thunk, evaluate (and
/// memoize) it, looping in case the result is itself a thunk (e.g. a
/// binding that simply aliases another thunk). Any other value is
/// returned unchanged (§4.3, "Force protocol").
///
/// `chain` tracks every thunk entered by *this* call whose own expression
/// has already produced an `Unevaluated -> Ok(v)` transition but hasn't
/// been memoized yet: a binding can return a reference to its own thunk
/// as plain (unforced) data — e.g. an object field whose value is that
/// same field's thunk — without ever re-entering `force` on it, so the
/// black-hole check on a single cell isn't enough to catch that case.
/// Seeing a thunk already in `chain` means the chain closed on itself
/// without ever reaching a concrete value, which is the cycle. Once a
/// concrete value is reached, every thunk in `chain` memoizes it directly,
/// collapsing the whole alias chain to one hop.
pub fn force(
    value: Value,
    eval: &mut dyn FnMut(&Expr, &Env, Option<&Rc<PathBuf>>) -> Result<Value, LazyError>,
) -> Result<Value, LazyError> {
    let mut chain: Vec<Thunk> = Vec::new();
    let mut current = value;
    loop {
        match current {
            Value::Thunk(thunk) => {
                if chain.iter().any(|seen| Rc::ptr_eq(&seen.0, &thunk.0)) {
                    return Err(LazyError::new(LazyErrorKind::CycleDetected, Span::default()));
                }
                let state = {
                    let mut cell = thunk.0.borrow_mut();
                    std::mem::replace(&mut *cell, ThunkState::Evaluating)
                };
                match state {
                    ThunkState::Value(v) => {
                        *thunk.0.borrow_mut() = ThunkState::Value(v.clone());
                        current = v;
                    }
                    ThunkState::Evaluating => {
                        // Put the black hole back so a later re-force also
                        // observes the cycle rather than silently resetting.
                        *thunk.0.borrow_mut() = ThunkState::Evaluating;
                        return Err(LazyError::new(LazyErrorKind::CycleDetected, Span::default()));
                    }
                    ThunkState::Unevaluated { expr, env, cwd } => {
                        let result = eval(&expr, &env, cwd.as_ref());
                        match result {
                            Ok(v) => {
                                chain.push(thunk);
                                current = v;
                            }
                            Err(e) => {
                                // An evaluation failure unwinds the whole
                                // top-level call (§4.3, "no retries
                                // anywhere"), so the thunk is never forced
                                // again. Restore `Unevaluated` rather than
                                // leaving a black hole so the state doesn't
                                // misreport an unrelated failure as a
                                // cycle if something does force it again.
                                *thunk.0.borrow_mut() = ThunkState::Unevaluated { expr, env, cwd };
                                return Err(e);
                            }
                        }
                    }
                }
            }
            other => {
                for thunk in &chain {
                    *thunk.0.borrow_mut() = ThunkState::Value(other.clone());
                }
                return Ok(other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    #[test]
    fn ready_thunk_forces_without_eval_callback() {
        let thunk = Thunk::ready(Value::Integer(5));
        let mut never = |_: &Expr, _: &Env, _: Option<&Rc<PathBuf>>| -> Result<Value, LazyError> {
            panic!("should not be called")
        };
        let v = force(Value::Thunk(thunk), &mut never).unwrap();
        assert_eq!(v, Value::Integer(5));
    }

    #[test]
    fn structural_equality_cross_promotes_numbers() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
    }

    #[test]
    fn functions_compare_by_identity_not_structure() {
        let env = Env::empty();
        let body = Expr::new(crate::ast::ExprKind::Integer(1), Span::default());
        let param = crate::ast::Pattern::new(crate::ast::PatternKind::Wildcard, Span::default());
        let f1 = Rc::new(FunctionValue {
            param: param.clone(),
            body: body.clone(),
            captured_env: env.clone(),
        });
        let f2 = Rc::new(FunctionValue {
            param,
            body,
            captured_env: env,
        });
        assert_ne!(Value::Function(f1.clone()), Value::Function(f2));
        assert_eq!(Value::Function(f1.clone()), Value::Function(f1));
    }
}
