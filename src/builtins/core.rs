//! Top-level built-ins that aren't namespaced under a stdlib module:
//! `crash`, `docstring`, `fold` (re-exported at top level per the
//! pipeline idiom `xs \ fold init f`), and the type predicates.

use std::rc::Rc;

use crate::builtins::native;
use crate::error::{LazyError, LazyErrorKind};
use crate::token::Span;
use crate::value::Value;

pub fn crash(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let message = match &args[0] {
        Value::String(s) => s.to_string(),
        other => other.type_name().to_string(),
    };
    Err(LazyError::new(LazyErrorKind::UserCrash { message }, span))
}

pub fn docstring(args: Vec<Value>, _span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let doc = match &args[0] {
        Value::Object(o) => o.module_doc.clone(),
        _ => None,
    };
    Ok(match doc {
        Some(text) => Value::string(text),
        None => Value::Null,
    })
}

pub fn type_of(args: Vec<Value>, _span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    Ok(Value::string(args[0].type_name()))
}

macro_rules! predicate {
    ($name:ident, $pat:pat) => {
        pub fn $name(args: Vec<Value>, _span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
            Ok(Value::Boolean(matches!(&args[0], $pat)))
        }
    };
}

predicate!(is_integer, Value::Integer(_));
predicate!(is_float, Value::Float(_));
predicate!(is_boolean, Value::Boolean(_));
predicate!(is_null, Value::Null);
predicate!(is_string, Value::String(_));
predicate!(is_symbol, Value::Symbol(_));
predicate!(is_array, Value::Array(_));
predicate!(is_object, Value::Object(_));
predicate!(is_function, Value::Function(_) | Value::NativeFn(_));

/// Bindings placed directly in the root environment rather than under a
/// namespace object (§4.3, "stdlib environment").
pub fn top_level_bindings() -> Vec<(Rc<str>, Value)> {
    vec![
        (Rc::from("crash"), native("crash", 1, crash)),
        (Rc::from("docstring"), native("docstring", 1, docstring)),
        (Rc::from("typeOf"), native("typeOf", 1, type_of)),
        (Rc::from("isInteger"), native("isInteger", 1, is_integer)),
        (Rc::from("isFloat"), native("isFloat", 1, is_float)),
        (Rc::from("isBoolean"), native("isBoolean", 1, is_boolean)),
        (Rc::from("isNull"), native("isNull", 1, is_null)),
        (Rc::from("isString"), native("isString", 1, is_string)),
        (Rc::from("isSymbol"), native("isSymbol", 1, is_symbol)),
        (Rc::from("isArray"), native("isArray", 1, is_array)),
        (Rc::from("isObject"), native("isObject", 1, is_object)),
        (Rc::from("isFunction"), native("isFunction", 1, is_function)),
        (Rc::from("fold"), native("fold", 3, crate::builtins::array::fold)),
        (Rc::from("concat"), native("concat", 2, crate::builtins::string::concat)),
    ]
}
