//! `Object` stdlib namespace: reflection over object values. Merge and
//! patch semantics live on the `&` operator and `base { .. }` postfix
//! (§4.3), not here.

use std::rc::Rc;

use crate::builtins::{expect_object, expect_string, native};
use crate::error::LazyError;
use crate::token::Span;
use crate::value::{ObjectField, ObjectValue, Value};

pub fn namespace() -> Value {
    let fields = vec![
        field("keys", native("Object.keys", 1, keys)),
        field("values", native("Object.values", 1, values)),
        field("hasField", native("Object.hasField", 2, has_field)),
        field("get", native("Object.get", 2, get)),
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

fn keys(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let obj = expect_object(&args[0], span)?;
    let keys = obj.fields.iter().map(|f| Value::string(f.key.clone())).collect();
    Ok(Value::Array(Rc::new(keys)))
}

fn values(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let obj = expect_object(&args[0], span)?;
    let values = obj.fields.iter().map(|f| f.value.clone()).collect();
    Ok(Value::Array(Rc::new(values)))
}

fn has_field(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let obj = expect_object(&args[0], span)?;
    let name = expect_string(&args[1], span)?;
    Ok(Value::Boolean(obj.get(&name).is_some()))
}

fn get(args: Vec<Value>, span: Span, _ctx: &mut crate::value::NativeCtx) -> Result<Value, LazyError> {
    let obj = expect_object(&args[0], span)?;
    let name = expect_string(&args[1], span)?;
    obj.get(&name).cloned().ok_or_else(|| {
        crate::error::LazyError::new(
            crate::error::LazyErrorKind::UnknownIdentifier { name: name.to_string() },
            span,
        )
    })
}
