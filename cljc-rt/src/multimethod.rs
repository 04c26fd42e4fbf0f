//! Multimethod dispatch: a user-supplied dispatch function
//! picks a dispatch value per call; `invoke` finds the best matching
//! registered method by an ancestor/`isa?`-style relation, breaks ties with
//! explicit `prefer` edges, and caches the winning method per dispatch
//! value so repeat calls skip the ancestor walk — the same shape the
//! source language's `MultiFn` uses, adapted to this runtime's `Value`.
//!
//! `Value` has no `Hash` impl (its `Decimal`/`f64` payloads make one
//! awkward to define soundly), so methods/prefers/hierarchy edges are kept
//! as small `Vec`s searched with `PartialEq`/`Ord` rather than hashmaps —
//! dispatch-value sets are small in practice (a handful of type tags).

use crate::Value;
use parking_lot::RwLock;
use std::fmt;
use triomphe::Arc;

pub type Method = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;
pub type DispatchFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

#[derive(Debug, Clone)]
pub enum DispatchError {
    NoMethod(Value),
    Ambiguous(Value, Value, Value),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoMethod(dv) => write!(f, "no multimethod matches dispatch value {dv:?} and no default is registered"),
            DispatchError::Ambiguous(dv, a, b) => {
                write!(f, "ambiguous multimethod dispatch on {dv:?} between {a:?} and {b:?}; add a `prefer` edge")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// The `isa?` ancestor relation multimethods dispatch through: a flat
/// `derive(child, parent)` edge list, transitively closed at query time.
#[derive(Default)]
pub struct Hierarchy {
    edges: RwLock<Vec<(Value, Value)>>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Hierarchy::default()
    }

    pub fn derive(&self, child: Value, parent: Value) {
        self.edges.write().push((child, parent));
    }

    /// `a` isa `b` if they're equal, or `b` is reachable from `a` by
    /// following `derive` edges. A plain reflexive/transitive walk, not a
    /// full DAG topo-sort — ambiguity between two unrelated parents of the
    /// same child is what `prefer` exists to resolve, not this.
    pub fn isa(&self, a: &Value, b: &Value) -> bool {
        if a == b {
            return true;
        }
        let edges = self.edges.read();
        let mut frontier = vec![a.clone()];
        let mut seen = vec![a.clone()];
        while let Some(cur) = frontier.pop() {
            for (child, parent) in edges.iter() {
                if child == &cur {
                    if parent == b {
                        return true;
                    }
                    if !seen.contains(parent) {
                        seen.push(parent.clone());
                        frontier.push(parent.clone());
                    }
                }
            }
        }
        false
    }
}

/// A multimethod: one dispatch function, a registry of `(dispatch-value,
/// method)` pairs, an optional hierarchy for `isa?`-based fallback, and a
/// cache from dispatch value to resolved method.
pub struct MultiFn {
    dispatch: DispatchFn,
    hierarchy: Arc<Hierarchy>,
    default_value: Value,
    methods: RwLock<Vec<(Value, Method)>>,
    prefers: RwLock<Vec<(Value, Value)>>,
    cache: RwLock<Vec<(Value, Method)>>,
}

impl MultiFn {
    pub fn new(dispatch: DispatchFn, hierarchy: Arc<Hierarchy>, default_value: Value) -> Self {
        MultiFn {
            dispatch,
            hierarchy,
            default_value,
            methods: RwLock::new(Vec::new()),
            prefers: RwLock::new(Vec::new()),
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Registers (or replaces) the method for `dispatch_value`, invalidating
    /// the cache since a new registration can change which method the
    /// ancestor walk picks for an already-cached dispatch value.
    pub fn method(&self, dispatch_value: Value, f: Method) {
        let mut methods = self.methods.write();
        methods.retain(|(k, _)| k != &dispatch_value);
        methods.push((dispatch_value, f));
        self.cache.write().clear();
    }

    pub fn remove_method(&self, dispatch_value: &Value) {
        self.methods.write().retain(|(k, _)| k != dispatch_value);
        self.cache.write().clear();
    }

    pub fn prefer(&self, preferred: Value, over: Value) {
        self.prefers.write().push((preferred, over));
        self.cache.write().clear();
    }

    pub fn invoke(&self, args: &[Value]) -> anyhow::Result<Value> {
        let dv = (self.dispatch)(args);
        if let Some((_, m)) = self.cache.read().iter().find(|(k, _)| k == &dv) {
            return m(args);
        }
        let m = self.resolve(&dv)?;
        self.cache.write().push((dv, m.clone()));
        m(args)
    }

    fn dominates(&self, a: &Value, b: &Value) -> bool {
        self.prefers.read().iter().any(|(p, o)| p == a && o == b) || self.hierarchy.isa(a, b)
    }

    fn resolve(&self, dv: &Value) -> Result<Method, DispatchError> {
        let methods = self.methods.read();
        if let Some((_, m)) = methods.iter().find(|(k, _)| k == dv) {
            return Ok(m.clone());
        }
        let candidates: Vec<&(Value, Method)> = methods.iter().filter(|(k, _)| self.hierarchy.isa(dv, k)).collect();
        if candidates.is_empty() {
            return methods
                .iter()
                .find(|(k, _)| k == &self.default_value)
                .map(|(_, m)| m.clone())
                .ok_or_else(|| DispatchError::NoMethod(dv.clone()));
        }
        let winners: Vec<&&(Value, Method)> = candidates
            .iter()
            .filter(|(k, _)| !candidates.iter().any(|(k2, _)| k2 != k && self.dominates(k2, k)))
            .collect();
        match winners.as_slice() {
            [one] => Ok(one.1.clone()),
            [first, second, ..] => Err(DispatchError::Ambiguous(dv.clone(), first.0.clone(), second.0.clone())),
            [] => Err(DispatchError::Ambiguous(dv.clone(), candidates[0].0.clone(), candidates[1].0.clone())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kw(name: &str) -> Value {
        Value::Keyword(None, name.into())
    }

    fn dispatch_on_first(args: &[Value]) -> Value {
        args[0].clone()
    }

    #[test]
    fn exact_match_skips_the_hierarchy() {
        let hierarchy = Arc::new(Hierarchy::new());
        let mf = MultiFn::new(Arc::new(dispatch_on_first), hierarchy, kw("default"));
        mf.method(kw("square"), Arc::new(|_| Ok(Value::Int(1))));
        mf.method(kw("circle"), Arc::new(|_| Ok(Value::Int(2))));
        assert_eq!(mf.invoke(&[kw("circle")]).unwrap(), Value::Int(2));
    }

    #[test]
    fn falls_back_to_an_ancestor_via_the_hierarchy() {
        let hierarchy = Arc::new(Hierarchy::new());
        hierarchy.derive(kw("square"), kw("shape"));
        let mf = MultiFn::new(Arc::new(dispatch_on_first), hierarchy, kw("default"));
        mf.method(kw("shape"), Arc::new(|_| Ok(Value::Str("generic shape".into()))));
        assert_eq!(mf.invoke(&[kw("square")]).unwrap(), Value::Str("generic shape".into()));
    }

    #[test]
    fn no_match_falls_back_to_the_default_dispatch_value() {
        let hierarchy = Arc::new(Hierarchy::new());
        let mf = MultiFn::new(Arc::new(dispatch_on_first), hierarchy, kw("default"));
        mf.method(kw("default"), Arc::new(|_| Ok(Value::Int(0))));
        assert_eq!(mf.invoke(&[kw("unregistered")]).unwrap(), Value::Int(0));
    }

    #[test]
    fn ambiguous_parents_are_resolved_by_an_explicit_prefer_edge() {
        let hierarchy = Arc::new(Hierarchy::new());
        hierarchy.derive(kw("square"), kw("rect"));
        hierarchy.derive(kw("square"), kw("shape"));
        let mf = MultiFn::new(Arc::new(dispatch_on_first), hierarchy, kw("default"));
        mf.method(kw("rect"), Arc::new(|_| Ok(Value::Int(1))));
        mf.method(kw("shape"), Arc::new(|_| Ok(Value::Int(2))));
        assert!(mf.invoke(&[kw("square")]).is_err());
        mf.prefer(kw("rect"), kw("shape"));
        assert_eq!(mf.invoke(&[kw("square")]).unwrap(), Value::Int(1));
    }
}
