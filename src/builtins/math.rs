//! `Math` stdlib namespace.

use std::rc::Rc;

use crate::builtins::{expect_number, native};
use crate::error::{LazyError, LazyErrorKind};
use crate::token::Span;
use crate::value::{ObjectField, ObjectValue, Value};

pub fn namespace() -> Value {
    let fields = vec![
        field("abs", native("Math.abs", 1, abs)),
        field("floor", native("Math.floor", 1, floor)),
        field("ceil", native("Math.ceil", 1, ceil)),
        field("round", native("Math.round", 1, round)),
        field("sqrt", native("Math.sqrt", 1, sqrt)),
        field("min", native("Math.min", 2, min)),
        field("max", native("Math.max", 2, max)),
        field("pow", native("Math.pow", 2, pow)),
    ];
    Value::Object(Rc::new(ObjectValue { fields, module_doc: None }))
}

fn field(name: &str, value: Value) -> ObjectField {
    ObjectField {
        key: Rc::from(name),
        value,
        is_patch: false,
    }
}

fn abs(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(n.abs())),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        other => Err(crate::builtins::type_error("Integer or Float", other, span)),
    }
}

fn floor(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    Ok(Value::Integer(expect_number(&args[0], span)?.floor() as i64))
}

fn ceil(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    Ok(Value::Integer(expect_number(&args[0], span)?.ceil() as i64))
}

fn round(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    Ok(Value::Integer(expect_number(&args[0], span)?.round() as i64))
}

fn sqrt(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let n = expect_number(&args[0], span)?;
    if n < 0.0 {
        return Err(LazyError::new(
            LazyErrorKind::InvalidArgument {
                detail: format!("sqrt of negative number {n}"),
            },
            span,
        ));
    }
    Ok(Value::Float(n.sqrt()))
}

fn min(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let a = expect_number(&args[0], span)?;
    let b = expect_number(&args[1], span)?;
    Ok(if a <= b { args[0].clone() } else { args[1].clone() })
}

fn max(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let a = expect_number(&args[0], span)?;
    let b = expect_number(&args[1], span)?;
    Ok(if a >= b { args[0].clone() } else { args[1].clone() })
}

fn pow(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let base = expect_number(&args[0], span)?;
    let exp = expect_number(&args[1], span)?;
    Ok(Value::Float(base.powf(exp)))
}
