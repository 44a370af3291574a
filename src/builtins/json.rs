//! `JSON` stdlib namespace (§4.4).

use std::rc::Rc;

use crate::builtins::{expect_string, native};
use crate::error::LazyError;
use crate::format;
use crate::token::Span;
use crate::value::{ObjectField, ObjectValue, Value};

pub fn namespace() -> Value {
    let fields = vec![
        field("stringify", native("JSON.stringify", 1, stringify)),
        field("parse", native("JSON.parse", 1, parse)),
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

fn stringify(args: Vec<Value>, span: Span, ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let deep = format::force_deep(args[0].clone(), span, ctx)?;
    let json = format::to_json(&deep, span)?;
    Ok(Value::string(json.to_string()))
}

fn parse(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let text = expect_string(&args[0], span)?;
    format::from_json(&text, span)
}
