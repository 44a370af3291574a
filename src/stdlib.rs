//! Builds the root environment every top-level evaluation and import
//! starts from (§4.3, "stdlib environment"): the native-builtin scope
//! plus the curated namespace objects `Array`, `String`, `Math`,
//! `Object`, `JSON`, `YAML`.

use crate::builtins::{array, core, json, math, object, string, yaml};
use crate::env::Env;

pub fn build_root_env() -> Env {
    let mut env = Env::empty();
    for (name, value) in core::top_level_bindings() {
        env = env.bind(name, value);
    }
    env = env.bind("Array", array::namespace());
    env = env.bind("String", string::namespace());
    env = env.bind("Math", math::namespace());
    env = env.bind("Object", object::namespace());
    env = env.bind("JSON", json::namespace());
    env = env.bind("YAML", yaml::namespace());
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_env_exposes_stdlib_namespaces() {
        let env = build_root_env();
        assert!(env.lookup("Array").is_some());
        assert!(env.lookup("String").is_some());
        assert!(env.lookup("Math").is_some());
        assert!(env.lookup("Object").is_some());
        assert!(env.lookup("JSON").is_some());
        assert!(env.lookup("YAML").is_some());
        assert!(env.lookup("crash").is_some());
        assert!(env.lookup("fold").is_some());
    }
}
