//! Value formatter (§4.4): compact/pretty rendering, JSON, and YAML.
//! Every formatter forces thunks as it walks the value tree — none of
//! them assume their input is already fully forced.

use crate::error::{LazyError, LazyErrorKind};
use crate::token::Span;
use crate::value::{NativeCtx, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Compact,
    Pretty,
    Json,
    Yaml,
}

/// Force `v` and every value reachable through it (array elements,
/// object field values), producing a tree with no remaining `Thunk`
/// nodes. Used by every formatter below, which otherwise can't see
/// past a lazily-held field.
pub fn force_deep(v: Value, span: Span, ctx: &mut NativeCtx) -> Result<Value, LazyError> {
    let forced = (ctx.force)(v, span)?;
    match forced {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(force_deep(item.clone(), span, ctx)?);
            }
            Ok(Value::Array(std::rc::Rc::new(out)))
        }
        Value::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(force_deep(item.clone(), span, ctx)?);
            }
            Ok(Value::Tuple(std::rc::Rc::new(out)))
        }
        Value::Object(obj) => {
            let mut fields = Vec::with_capacity(obj.fields.len());
            for f in &obj.fields {
                fields.push(crate::value::ObjectField {
                    key: f.key.clone(),
                    value: force_deep(f.value.clone(), span, ctx)?,
                    is_patch: f.is_patch,
                });
            }
            Ok(Value::Object(std::rc::Rc::new(crate::value::ObjectValue {
                fields,
                module_doc: obj.module_doc.clone(),
            })))
        }
        other => Ok(other),
    }
}

/// §4.3, "string interpolation": a forced-but-not-deep value formatted
/// the way it appears inside a string body. Strings interpolate without
/// surrounding quotes; everything else uses the compact renderer.
pub fn format_interpolated(v: &Value, span: Span, eval: &mut crate::eval::Evaluator) -> Result<String, LazyError> {
    match v {
        Value::String(s) => Ok(s.to_string()),
        other => {
            let deep = eval.force_deep_for_format(other.clone(), span)?;
            Ok(render_compact(&deep))
        }
    }
}

pub fn render_compact(v: &Value) -> String {
    match v {
        Value::Integer(n) => n.to_string(),
        Value::Float(n) => render_float(*n),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Symbol(s) => format!("#{s}"),
        Value::String(s) => format!("\"{}\"", escape_string(s)),
        Value::Array(items) | Value::Tuple(items) => {
            let body: Vec<String> = items.iter().map(render_compact).collect();
            format!("[{}]", body.join(", "))
        }
        Value::Object(obj) => {
            let body: Vec<String> = obj
                .fields
                .iter()
                .map(|f| format!("{}: {}", f.key, render_compact(&f.value)))
                .collect();
            format!("{{ {} }}", body.join(", "))
        }
        Value::Function(_) => "<function>".to_string(),
        Value::NativeFn(_) => "<native function>".to_string(),
        Value::Thunk(_) => "<thunk>".to_string(),
    }
}

/// Pretty variant (§4.4): same as compact for primitives and short
/// collections, two-space-indented block form once a collection grows
/// past a single readable line.
pub fn render_pretty(v: &Value) -> String {
    render_pretty_indented(v, 0)
}

const PRETTY_INLINE_THRESHOLD: usize = 4;

fn render_pretty_indented(v: &Value, indent: usize) -> String {
    match v {
        Value::Array(items) | Value::Tuple(items) if items.len() > PRETTY_INLINE_THRESHOLD => {
            let pad = "  ".repeat(indent + 1);
            let body: Vec<String> = items
                .iter()
                .map(|item| format!("{pad}{}", render_pretty_indented(item, indent + 1)))
                .collect();
            format!("[\n{}\n{}]", body.join(",\n"), "  ".repeat(indent))
        }
        Value::Object(obj) if obj.fields.len() > PRETTY_INLINE_THRESHOLD => {
            let pad = "  ".repeat(indent + 1);
            let body: Vec<String> = obj
                .fields
                .iter()
                .map(|f| format!("{pad}{}: {}", f.key, render_pretty_indented(&f.value, indent + 1)))
                .collect();
            format!("{{\n{}\n{}}}", body.join(",\n"), "  ".repeat(indent))
        }
        other => render_compact(other),
    }
}

fn render_float(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// §4.4, JSON: symbols become strings, tuples become arrays, functions
/// are not representable.
pub fn to_json(v: &Value, span: Span) -> Result<serde_json::Value, LazyError> {
    use serde_json::Value as J;
    Ok(match v {
        Value::Integer(n) => J::Number((*n).into()),
        Value::Float(n) => serde_json::Number::from_f64(*n).map(J::Number).unwrap_or(J::Null),
        Value::Boolean(b) => J::Bool(*b),
        Value::Null => J::Null,
        Value::Symbol(s) => J::String(s.to_string()),
        Value::String(s) => J::String(s.to_string()),
        Value::Array(items) | Value::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(to_json(item, span)?);
            }
            J::Array(out)
        }
        Value::Object(obj) => {
            let mut map = serde_json::Map::new();
            for f in &obj.fields {
                map.insert(f.key.to_string(), to_json(&f.value, span)?);
            }
            J::Object(map)
        }
        Value::Function(_) | Value::NativeFn(_) => {
            return Err(LazyError::new(
                LazyErrorKind::UserCrash {
                    message: "Cannot represent function in JSON output".to_string(),
                },
                span,
            ))
        }
        Value::Thunk(_) => unreachable!("to_json called on an unforced thunk"),
    })
}

pub fn from_json(text: &str, span: Span) -> Result<Value, LazyError> {
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        LazyError::new(
            LazyErrorKind::InvalidArgument {
                detail: format!("invalid JSON: {e}"),
            },
            span,
        )
    })?;
    Ok(json_to_value(parsed))
}

fn json_to_value(v: serde_json::Value) -> Value {
    use serde_json::Value as J;
    match v {
        J::Null => Value::Null,
        J::Bool(b) => Value::Boolean(b),
        J::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        J::String(s) => Value::string(s),
        J::Array(items) => Value::Array(std::rc::Rc::new(items.into_iter().map(json_to_value).collect())),
        J::Object(map) => {
            let fields = map
                .into_iter()
                .map(|(k, v)| crate::value::ObjectField {
                    key: std::rc::Rc::from(k.as_str()),
                    value: json_to_value(v),
                    is_patch: false,
                })
                .collect();
            Value::Object(std::rc::Rc::new(crate::value::ObjectValue { fields, module_doc: None }))
        }
    }
}

pub fn to_yaml(v: &Value, span: Span) -> Result<String, LazyError> {
    let json = to_json(v, span)?;
    serde_yaml::to_string(&json).map_err(|e| {
        LazyError::new(
            LazyErrorKind::InvalidArgument {
                detail: format!("could not render YAML: {e}"),
            },
            span,
        )
    })
}

pub fn from_yaml(text: &str, span: Span) -> Result<Value, LazyError> {
    let parsed: serde_json::Value = serde_yaml::from_str(text).map_err(|e| {
        LazyError::new(
            LazyErrorKind::InvalidArgument {
                detail: format!("invalid YAML: {e}"),
            },
            span,
        )
    })?;
    Ok(json_to_value(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn compact_renders_object_in_declaration_order() {
        let v = Value::Object(Rc::new(crate::value::ObjectValue {
            fields: vec![
                crate::value::ObjectField {
                    key: Rc::from("a"),
                    value: Value::Integer(1),
                    is_patch: false,
                },
                crate::value::ObjectField {
                    key: Rc::from("b"),
                    value: Value::Integer(2),
                    is_patch: false,
                },
            ],
            module_doc: None,
        }));
        assert_eq!(render_compact(&v), "{ a: 1, b: 2 }");
    }

    #[test]
    fn json_round_trips_scalars() {
        let span = Span::default();
        let v = Value::Array(Rc::new(vec![Value::Integer(1), Value::string("x"), Value::Boolean(true)]));
        let json = to_json(&v, span).unwrap();
        let text = serde_json::to_string(&json).unwrap();
        let back = from_json(&text, span).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn function_fails_json_with_user_crash() {
        let body = crate::ast::Expr::new(crate::ast::ExprKind::Null, Span::default());
        let param = crate::ast::Pattern::new(crate::ast::PatternKind::Wildcard, Span::default());
        let f = Value::Function(Rc::new(crate::value::FunctionValue {
            param,
            body,
            captured_env: crate::env::Env::empty(),
        }));
        let err = to_json(&f, Span::default()).unwrap_err();
        assert!(matches!(err.kind, LazyErrorKind::UserCrash { .. }));
    }
}
