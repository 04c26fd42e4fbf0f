//! Lexical scope tracking for the analyzer.
//! Grounded on `graphix-compiler::env::Env`'s immutable-update style
//! (`with_local_type`, `restore_lexical_env`): scopes are persistent,
//! cheaply-cloned snapshots rather than a single mutable stack, so a
//! closure captured mid-analysis keeps seeing the bindings visible at its
//! point of definition.

use crate::ir::HostType;
use compact_str::CompactString;
use fxhash::FxHashMap;
use triomphe::Arc;

#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// name -> host type hint, if any. `Arc` so pushing a child scope is
    /// O(1) and does not require deep-copying ancestor bindings.
    locals: Arc<FxHashMap<CompactString, Option<HostType>>>,
}

impl Scope {
    pub fn root() -> Self {
        Scope::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    pub fn local_type(&self, name: &str) -> Option<HostType> {
        self.locals.get(name).cloned().flatten()
    }

    /// Push one binding, returning a new scope — the parent scope is
    /// untouched and keeps sharing the rest of the map via `Arc`.
    pub fn with_local(&self, name: &str, typ: Option<HostType>) -> Scope {
        let mut next = (*self.locals).clone();
        next.insert(CompactString::from(name), typ);
        Scope { locals: Arc::new(next) }
    }

    pub fn with_locals<'a>(&self, names: impl Iterator<Item = (&'a str, Option<HostType>)>) -> Scope {
        let mut next = (*self.locals).clone();
        for (name, typ) in names {
            next.insert(CompactString::from(name), typ);
        }
        Scope { locals: Arc::new(next) }
    }
}

/// Carried context for one `analyze` call.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerContext {
    pub is_async: bool,
    pub return_type: Option<HostType>,
    pub scope: Scope,
    /// arity of the nearest enclosing `Loop`/`Fn` method, for `Recur`
    /// arity validation.
    pub recur_arity: Option<usize>,
}

impl AnalyzerContext {
    pub fn with_local_type(&self, name: &str, typ: Option<HostType>) -> Self {
        AnalyzerContext { scope: self.scope.with_local(name, typ), ..self.clone() }
    }

    pub fn with_recur_arity(&self, arity: usize) -> Self {
        AnalyzerContext { recur_arity: Some(arity), ..self.clone() }
    }

    pub fn with_async(&self, is_async: bool) -> Self {
        AnalyzerContext { is_async, ..self.clone() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn child_scope_does_not_leak_back_to_parent() {
        let root = Scope::root();
        let child = root.with_local("x", Some(HostType::named("long")));
        assert!(!root.contains("x"));
        assert!(child.contains("x"));
    }
}
