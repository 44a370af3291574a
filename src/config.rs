//! Configuration surface (§2.1, §6): the only externally configurable
//! knob the core owns is the module search path.

use std::path::PathBuf;

/// Directories searched for `import` targets, in order, after the
/// importing file's own directory and the current working directory.
#[derive(Debug, Clone, Default)]
pub struct ModuleSearchPath(pub Vec<PathBuf>);

impl ModuleSearchPath {
    /// Parses `var` as a platform path-list (colon/semicolon-delimited
    /// per `std::env::split_paths`), ignoring empty segments, and
    /// appends the default `stdlib/lib`.
    pub fn from_env(var: &str) -> Self {
        let mut dirs: Vec<PathBuf> = std::env::var_os(var)
            .map(|v| std::env::split_paths(&v).filter(|p| !p.as_os_str().is_empty()).collect())
            .unwrap_or_default();
        dirs.push(PathBuf::from("stdlib/lib"));
        ModuleSearchPath(dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_appends_default_stdlib_dir() {
        std::env::remove_var("LAZYLANG_PATH_TEST_UNSET");
        let path = ModuleSearchPath::from_env("LAZYLANG_PATH_TEST_UNSET");
        assert_eq!(path.0, vec![PathBuf::from("stdlib/lib")]);
    }

    #[test]
    fn from_env_ignores_empty_segments() {
        std::env::set_var("LAZYLANG_PATH_TEST_SET", "/a::/b");
        let path = ModuleSearchPath::from_env("LAZYLANG_PATH_TEST_SET");
        assert_eq!(path.0, vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("stdlib/lib")]);
        std::env::remove_var("LAZYLANG_PATH_TEST_SET");
    }
}
