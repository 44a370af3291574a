//! `String` stdlib namespace. Concatenation lives here rather than on `+`
//! (§9, "Open question": `+` on strings is a type error).

use std::rc::Rc;

use crate::builtins::{expect_integer, expect_string, invalid_argument, native};
use crate::error::LazyError;
use crate::token::Span;
use crate::value::{ObjectField, ObjectValue, Value};

pub fn namespace() -> Value {
    let fields = vec![
        field("concat", native("String.concat", 2, concat)),
        field("length", native("String.length", 1, length)),
        field("upper", native("String.upper", 1, upper)),
        field("lower", native("String.lower", 1, lower)),
        field("trim", native("String.trim", 1, trim)),
        field("split", native("String.split", 2, split)),
        field("contains", native("String.contains", 2, contains)),
        field("slice", native("String.slice", 3, slice)),
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

pub(crate) fn concat(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let a = expect_string(&args[0], span)?;
    let b = expect_string(&args[1], span)?;
    Ok(Value::string(format!("{a}{b}")))
}

fn length(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let s = expect_string(&args[0], span)?;
    Ok(Value::Integer(s.chars().count() as i64))
}

fn upper(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let s = expect_string(&args[0], span)?;
    Ok(Value::string(s.to_uppercase()))
}

fn lower(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let s = expect_string(&args[0], span)?;
    Ok(Value::string(s.to_lowercase()))
}

fn trim(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let s = expect_string(&args[0], span)?;
    Ok(Value::string(s.trim().to_string()))
}

fn split(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let s = expect_string(&args[0], span)?;
    let sep = expect_string(&args[1], span)?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(&*sep).map(Value::string).collect()
    };
    Ok(Value::Array(Rc::new(parts)))
}

fn contains(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let s = expect_string(&args[0], span)?;
    let needle = expect_string(&args[1], span)?;
    Ok(Value::Boolean(s.contains(&*needle)))
}

fn slice(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let s = expect_string(&args[0], span)?;
    let start = expect_integer(&args[1], span)?;
    let end = expect_integer(&args[2], span)?;
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let clamp = |i: i64| -> usize { i.clamp(0, len) as usize };
    if start > end {
        return Err(invalid_argument(format!("slice start {start} is after end {end}"), span));
    }
    let slice: String = chars[clamp(start)..clamp(end)].iter().collect();
    Ok(Value::string(slice))
}
