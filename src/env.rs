//! Immutable, persistent scope chain (§3, "Environment"). Each node binds
//! exactly one name; introducing `n` bindings produces `n` new nodes
//! sharing the prior tail, so closures can cheaply capture "the
//! environment at this point" without copying it.

use std::rc::Rc;

use crate::value::Value;

struct EnvNode {
    name: Rc<str>,
    value: Value,
    parent: Option<Env>,
}

#[derive(Clone)]
pub struct Env(Option<Rc<EnvNode>>);

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Env(..)")
    }
}

impl Env {
    pub fn empty() -> Self {
        Env(None)
    }

    /// Bind `name` to `value`, returning a new frame whose parent is
    /// `self`. `self` is left untouched — lookups from any environment
    /// that already captured it keep seeing the old bindings.
    pub fn bind(&self, name: impl Into<Rc<str>>, value: Value) -> Env {
        Env(Some(Rc::new(EnvNode {
            name: name.into(),
            value,
            parent: Some(self.clone()),
        })))
    }

    /// Bind every name/value pair in order, threading each new frame into
    /// the next. Used by pattern matching, which can introduce many names
    /// from one match.
    pub fn bind_all(&self, bindings: impl IntoIterator<Item = (Rc<str>, Value)>) -> Env {
        let mut env = self.clone();
        for (name, value) in bindings {
            env = env.bind(name, value);
        }
        env
    }

    /// Walk from the innermost frame outward, returning the first binding
    /// for `name`.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut node = &self.0;
        while let Some(frame) = node {
            if &*frame.name == name {
                return Some(frame.value.clone());
            }
            node = &frame.parent.as_ref().unwrap().0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_binding_shadows_outer() {
        let outer = Env::empty().bind("x", Value::Integer(1));
        let inner = outer.bind("x", Value::Integer(2));
        assert_eq!(inner.lookup("x"), Some(Value::Integer(2)));
        assert_eq!(outer.lookup("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn unbound_name_is_none() {
        assert_eq!(Env::empty().lookup("x"), None);
    }

    #[test]
    fn bind_all_preserves_later_shadowing_earlier() {
        let env = Env::empty().bind_all(vec![
            (Rc::from("x"), Value::Integer(1)),
            (Rc::from("x"), Value::Integer(2)),
        ]);
        assert_eq!(env.lookup("x"), Some(Value::Integer(2)));
    }
}
