//! Native built-ins (§4.3, "Built-in (native) dispatch"): array, string,
//! math, object, JSON, YAML operations plus type predicates, `crash`, and
//! `docstring`, invoked through the uniform [`NativeHandler`] convention.
//!
//! Every built-in is curried (§3, `NativeFnValue::applied`) since
//! application is always unary; arities here are the built-in's true
//! argument count, not 1.

pub mod array;
pub mod core;
pub mod json;
pub mod math;
pub mod object;
pub mod string;
pub mod yaml;

use std::rc::Rc;

use crate::error::{LazyError, LazyErrorKind};
use crate::token::Span;
use crate::value::{NativeFnValue, Value};

pub(crate) fn native(name: &'static str, arity: usize, handler: crate::value::NativeHandler) -> Value {
    Value::NativeFn(Rc::new(NativeFnValue::new(name, arity, handler)))
}

pub(crate) fn type_error(expected: &str, found: &Value, span: Span) -> LazyError {
    LazyError::new(
        LazyErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: found.type_name().to_string(),
        },
        span,
    )
}

pub(crate) fn invalid_argument(detail: impl Into<String>, span: Span) -> LazyError {
    LazyError::new(LazyErrorKind::InvalidArgument { detail: detail.into() }, span)
}

pub(crate) fn expect_integer(v: &Value, span: Span) -> Result<i64, LazyError> {
    match v {
        Value::Integer(n) => Ok(*n),
        other => Err(type_error("Integer", other, span)),
    }
}

pub(crate) fn expect_number(v: &Value, span: Span) -> Result<f64, LazyError> {
    v.as_number().ok_or_else(|| type_error("Integer or Float", v, span))
}

pub(crate) fn expect_string(v: &Value, span: Span) -> Result<Rc<str>, LazyError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(type_error("String", other, span)),
    }
}

pub(crate) fn expect_array(v: &Value, span: Span) -> Result<Rc<Vec<Value>>, LazyError> {
    match v {
        Value::Array(items) | Value::Tuple(items) => Ok(items.clone()),
        other => Err(type_error("Array", other, span)),
    }
}

pub(crate) fn expect_object(v: &Value, span: Span) -> Result<Rc<crate::value::ObjectValue>, LazyError> {
    match v {
        Value::Object(o) => Ok(o.clone()),
        other => Err(type_error("Object", other, span)),
    }
}
