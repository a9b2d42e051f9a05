//! Scope tracking and consistent renaming for lifted regions.
//!
//! `Variables` records which identifiers are visible in the scope being
//! rewritten, which are module-level (those capture via `global`, never
//! `nonlocal`), the rename chains introduced by data-sharing clauses, and
//! any annotations seen on simple names (used to pick typed reduction
//! templates).
//!
//! Renaming is monotonic: once `x` maps to `_omp_1x`, every reference below
//! the renaming point is rewritten consistently; `final_name` resolves an
//! original spelling to its current binding, and `previous_name` recovers
//! the binding a rename shadowed (reduction combines write back into it).

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use omp_frontend::ast::Expr;

#[derive(Debug, Clone, Default)]
pub struct Variables {
    /// Names bound in this scope or an enclosing function scope.
    names: HashSet<String>,
    /// Module-level names: visible but never captured by `nonlocal`.
    globals: HashSet<String>,
    /// Original spelling → currently visible binding.
    current: HashMap<String, String>,
    /// Renamed binding → the binding it shadowed.
    previous: HashMap<String, String>,
    /// Annotations attached to simple names.
    types: HashMap<String, Expr>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.globals.contains(&name) {
            self.names.insert(name);
        }
    }

    pub fn add_global(&mut self, name: impl Into<String>) {
        self.globals.insert(name.into());
    }

    pub fn add_type(&mut self, name: impl Into<String>, annotation: Expr) {
        self.types.insert(name.into(), annotation);
    }

    pub fn type_of(&self, name: &str) -> Option<&Expr> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    /// The currently visible binding for an original spelling.
    pub fn final_name(&self, name: &str) -> String {
        self.current
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// The binding `renamed` shadowed when it was introduced.
    pub fn previous_name(&self, renamed: &str) -> Option<&str> {
        self.previous.get(renamed).map(|s| s.as_str())
    }

    /// Record that `original` is now spelled `new` below this point.
    pub fn record_rename(&mut self, original: &str, new: &str) {
        let shadowed = self.final_name(original);
        self.previous.insert(new.to_string(), shadowed);
        self.current.insert(original.to_string(), new.to_string());
        self.names.insert(new.to_string());
    }

    /// Snapshot for scope restoration at region exit.
    pub fn snapshot(&self) -> Variables {
        self.clone()
    }

    /// Bindings introduced since `older` — what a region deletes on exit.
    pub fn renames_since(&self, older: &Variables) -> Vec<String> {
        let mut fresh: Vec<String> = self
            .previous
            .keys()
            .filter(|k| !older.previous.contains_key(*k))
            .cloned()
            .collect();
        fresh.sort();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_resolves_to_newest_binding() {
        let mut vars = Variables::new();
        vars.add("x");
        vars.record_rename("x", "_omp_1x");
        assert_eq!(vars.final_name("x"), "_omp_1x");
        assert_eq!(vars.previous_name("_omp_1x"), Some("x"));
        vars.record_rename("x", "_omp_2x");
        assert_eq!(vars.final_name("x"), "_omp_2x");
        assert_eq!(vars.previous_name("_omp_2x"), Some("_omp_1x"));
    }

    #[test]
    fn globals_are_visible_but_not_names() {
        let mut vars = Variables::new();
        vars.add_global("config");
        vars.add("config");
        assert!(!vars.contains("config"));
        assert!(vars.is_global("config"));
    }

    #[test]
    fn renames_since_reports_fresh_bindings() {
        let mut vars = Variables::new();
        vars.add("x");
        vars.add("y");
        let before = vars.snapshot();
        vars.record_rename("x", "_omp_1x");
        vars.record_rename("y", "_omp_1y");
        assert_eq!(vars.renames_since(&before), vec!["_omp_1x", "_omp_1y"]);
        assert!(before.renames_since(&before).is_empty());
    }

    #[test]
    fn unrenamed_name_resolves_to_itself() {
        let vars = Variables::new();
        assert_eq!(vars.final_name("q"), "q");
    }

    #[test]
    fn snapshot_restores_scope() {
        let mut vars = Variables::new();
        vars.add("x");
        let before = vars.snapshot();
        vars.record_rename("x", "_omp_1x");
        let restored = before;
        assert_eq!(restored.final_name("x"), "x");
    }
}
