//! `Array` stdlib namespace (§4.3, native dispatch).

use std::rc::Rc;

use crate::builtins::{expect_array, invalid_argument, native};
use crate::error::LazyError;
use crate::token::Span;
use crate::value::{ObjectField, ObjectValue, Value};

pub fn namespace() -> Value {
    let fields = vec![
        field("length", native("Array.length", 1, length)),
        field("push", native("Array.push", 2, push)),
        field("reverse", native("Array.reverse", 1, reverse)),
        field("concat", native("Array.concat", 2, concat)),
        field("contains", native("Array.contains", 2, contains)),
        field("map", native("Array.map", 2, map)),
        field("filter", native("Array.filter", 2, filter)),
        field("fold", native("Array.fold", 3, fold)),
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

fn length(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let items = expect_array(&args[0], span)?;
    Ok(Value::Integer(items.len() as i64))
}

fn push(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let items = expect_array(&args[0], span)?;
    let mut out = (*items).clone();
    out.push(args[1].clone());
    Ok(Value::Array(Rc::new(out)))
}

fn reverse(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let items = expect_array(&args[0], span)?;
    let mut out = (*items).clone();
    out.reverse();
    Ok(Value::Array(Rc::new(out)))
}

fn concat(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let a = expect_array(&args[0], span)?;
    let b = expect_array(&args[1], span)?;
    let mut out = (*a).clone();
    out.extend(b.iter().cloned());
    Ok(Value::Array(Rc::new(out)))
}

fn contains(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let items = expect_array(&args[0], span)?;
    let needle = &args[1];
    Ok(Value::Boolean(items.iter().any(|v| v == needle)))
}

fn map(args: Vec<Value>, span: Span, ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let f = args[0].clone();
    let items = expect_array(&args[1], span)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items.iter() {
        out.push((ctx.apply)(f.clone(), item.clone(), span)?);
    }
    Ok(Value::Array(Rc::new(out)))
}

fn filter(args: Vec<Value>, span: Span, ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let f = args[0].clone();
    let items = expect_array(&args[1], span)?;
    let mut out = Vec::new();
    for item in items.iter() {
        let kept = (ctx.apply)(f.clone(), item.clone(), span)?;
        match kept {
            Value::Boolean(true) => out.push(item.clone()),
            Value::Boolean(false) => {}
            other => return Err(invalid_argument(format!("filter predicate returned non-Boolean {}", other.type_name()), span)),
        }
    }
    Ok(Value::Array(Rc::new(out)))
}

pub(crate) fn fold(args: Vec<Value>, span: Span, ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let init = args[0].clone();
    let f = args[1].clone();
    let items = expect_array(&args[2], span)?;
    let mut acc = init;
    for item in items.iter() {
        let stepped = (ctx.apply)(f.clone(), acc, span)?;
        acc = (ctx.apply)(stepped, item.clone(), span)?;
    }
    Ok(acc)
}

