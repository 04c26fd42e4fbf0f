//! The runtime Var registry emitted code indirects through:
//! a process-wide `(namespace, name) -> root value` table, distinct from
//! the compiler's own `ns::VarRegistry` (which tracks `Form`s at analysis
//! time to resolve symbols and detect macros). This one holds live
//! runtime `Value`s and is what `VarRegistry.Intern(ns, name).Deref()` /
//! `.Invoke(args)` / `.BindRoot(v)` in emitted source actually calls.
//! Grounded on the same `parking_lot`-guarded, `FxHashMap`-keyed registry
//! shape as `graphix-compiler::env::Env`'s bind table.

use crate::Value;
use arcstr::ArcStr;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::fmt;
use triomphe::Arc;

/// A globally registered indirection. `bind_root` is a plain atomic-swap
/// store so readers never block; a `deref` after a concurrent
/// `bind_root` either sees the old or the new value, never a torn one,
/// since `RwLock` always hands back a complete `Value`.
pub struct Var {
    pub ns: ArcStr,
    pub name: ArcStr,
    root: RwLock<Option<Value>>,
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#'{}/{}", self.ns, self.name)
    }
}

impl Var {
    pub fn bind_root(&self, value: Value) {
        *self.root.write() = Some(value);
    }

    pub fn deref(&self) -> Value {
        self.root.read().clone().unwrap_or(Value::Nil)
    }

    pub fn is_bound(&self) -> bool {
        self.root.read().is_some()
    }

    /// Dispatches `args` to the bound value: a `Value::Fn`
    /// invokes directly; anything else isn't invokable, and an unbound
    /// var is reported the same way so the error message always names
    /// the offending var.
    pub fn invoke(&self, args: &[Value]) -> anyhow::Result<Value> {
        match &*self.root.read() {
            None => anyhow::bail!("unbound var: #'{}/{}", self.ns, self.name),
            Some(Value::Fn(callable, _)) => (callable.0)(args),
            Some(other) => anyhow::bail!("#'{}/{} ({:?}) is not invokable", self.ns, self.name, other),
        }
    }
}

/// Process-wide registry of interned runtime Vars, shared by every
/// compiled unit running in the same process.
#[derive(Default)]
pub struct VarRegistry {
    vars: RwLock<FxHashMap<(ArcStr, ArcStr), Arc<Var>>>,
}

impl VarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, ns: &str, name: &str) -> Arc<Var> {
        let key = (ArcStr::from(ns), ArcStr::from(name));
        if let Some(v) = self.vars.read().get(&key) {
            return v.clone();
        }
        let mut w = self.vars.write();
        w.entry(key.clone())
            .or_insert_with(|| Arc::new(Var { ns: key.0.clone(), name: key.1.clone(), root: RwLock::new(None) }))
            .clone()
    }

    pub fn find(&self, ns: &str, name: &str) -> Option<Arc<Var>> {
        self.vars.read().get(&(ArcStr::from(ns), ArcStr::from(name))).cloned()
    }
}

/// Process-wide singleton emitted code's static `VarRegistry.Intern(...)`
/// calls resolve to. A real embedding host constructs its own instance;
/// this one exists so compiled-and-linked host code (which only ever
/// sees the static API, not a constructor call) has somewhere to land.
static REGISTRY: RwLock<Option<Arc<VarRegistry>>> = RwLock::new(None);

pub fn global() -> Arc<VarRegistry> {
    if let Some(r) = REGISTRY.read().as_ref() {
        return r.clone();
    }
    let mut w = REGISTRY.write();
    w.get_or_insert_with(|| Arc::new(VarRegistry::new())).clone()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bind_root_is_observed_by_every_interned_handle() {
        let reg = VarRegistry::new();
        let v1 = reg.intern("user", "x");
        let v2 = reg.intern("user", "x");
        v1.bind_root(Value::Int(42));
        assert_eq!(v2.deref(), Value::Int(42));
    }

    #[test]
    fn invoke_calls_a_bound_function_value() {
        let reg = VarRegistry::new();
        let v = reg.intern("user", "inc");
        v.bind_root(Value::callable(|args| match &args[0] {
            Value::Int(n) => Ok(Value::Int(n + 1)),
            _ => unreachable!(),
        }));
        assert_eq!(v.invoke(&[Value::Int(41)]).unwrap(), Value::Int(42));
    }

    #[test]
    fn invoking_an_unbound_var_names_it_in_the_error() {
        let reg = VarRegistry::new();
        let v = reg.intern("user", "frobnicate");
        let err = v.invoke(&[]).unwrap_err();
        assert!(err.to_string().contains("user/frobnicate"), "{err}");
    }
}
