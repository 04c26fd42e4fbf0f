//! Namespace manager and the Var registry emitted code is
//! compiled against. Grounded on `graphix-compiler::env::Env`: a
//! process-wide table of binds plus a load stack, generalized here to
//! Clojure's namespace-of-vars model instead of lexical scope chains (the
//! lexical side lives in `analyzer::Scope`).

use crate::form::Form;
use arcstr::ArcStr;
use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexSet;
use parking_lot::RwLock;
use std::{fmt, sync::atomic::{AtomicI64, Ordering}};
use triomphe::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInfo {
    pub is_public: bool,
    pub is_macro: bool,
    pub type_hint: Option<ArcStr>,
}

impl Default for VarInfo {
    fn default() -> Self {
        VarInfo { is_public: true, is_macro: false, type_hint: None }
    }
}

/// A globally registered indirection `(namespace, name) -> root value`.
/// Interned once in the registry; `bind_root` is a plain atomic-swap store
/// so readers never block.
pub struct Var {
    pub ns: ArcStr,
    pub name: ArcStr,
    root: RwLock<Option<Form>>,
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#'{}/{}", self.ns, self.name)
    }
}

impl Var {
    pub fn bind_root(&self, value: Form) {
        *self.root.write() = Some(value);
    }

    pub fn deref(&self) -> Option<Form> {
        self.root.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.root.read().is_some()
    }
}

/// Process-wide registry of interned Vars, keyed by `(namespace, name)`.
/// Shared across every analyzer/emitter instance running in the same
/// process; individual compilation units do not own a private
/// copy the way they own their own `Scope`.
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
            .or_insert_with(|| {
                Arc::new(Var { ns: key.0.clone(), name: key.1.clone(), root: RwLock::new(None) })
            })
            .clone()
    }

    pub fn find(&self, ns: &str, name: &str) -> Option<Arc<Var>> {
        self.vars.read().get(&(ArcStr::from(ns), ArcStr::from(name))).cloned()
    }

    pub fn clear_namespace(&self, ns: &str) {
        self.vars.write().retain(|(vns, _), _| vns.as_str() != ns);
    }
}

/// One entry in the per-namespace var table: `VarInfo` plus the backing Var.
#[derive(Debug, Clone)]
pub struct NamespaceVar {
    pub info: VarInfo,
    pub var: Arc<Var>,
}

pub struct Namespace {
    pub name: ArcStr,
    pub vars: FxHashMap<ArcStr, NamespaceVar>,
    pub aliases: FxHashMap<ArcStr, ArcStr>,
    pub imports: FxHashSet<ArcStr>,
    pub requires: IndexSet<ArcStr>,
}

impl Namespace {
    fn new(name: ArcStr) -> Self {
        Namespace {
            name,
            vars: FxHashMap::default(),
            aliases: FxHashMap::default(),
            imports: FxHashSet::default(),
            requires: IndexSet::new(),
        }
    }
}

/// One of the three cores of the compiler. Owns the
/// process-wide namespace table, the global Var registry, and the
/// circular-require load stack. An embedder constructs one instance and
/// shares it across every analyzer it runs in the same process.
pub struct NamespaceManager {
    namespaces: RwLock<FxHashMap<ArcStr, Namespace>>,
    current: RwLock<ArcStr>,
    load_stack: RwLock<Vec<ArcStr>>,
    pub vars: VarRegistry,
    gensym_counter: AtomicI64,
}

#[derive(Debug)]
pub struct CircularDependency(pub ArcStr);

impl fmt::Display for CircularDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circular dependency loading namespace {}", self.0)
    }
}
impl std::error::Error for CircularDependency {}

impl NamespaceManager {
    pub fn new() -> Self {
        let mut namespaces = FxHashMap::default();
        let root: ArcStr = "user".into();
        namespaces.insert(root.clone(), Namespace::new(root.clone()));
        NamespaceManager {
            namespaces: RwLock::new(namespaces),
            current: RwLock::new(root),
            load_stack: RwLock::new(Vec::new()),
            vars: VarRegistry::new(),
            gensym_counter: AtomicI64::new(0),
        }
    }

    pub fn current(&self) -> ArcStr {
        self.current.read().clone()
    }

    /// Upsert `name` and make it the current namespace.
    pub fn switch_to(&self, name: &str) {
        let name = ArcStr::from(name);
        self.namespaces
            .write()
            .entry(name.clone())
            .or_insert_with(|| Namespace::new(name.clone()));
        *self.current.write() = name;
    }

    pub fn add_alias(&self, alias: &str, target_ns: &str) -> anyhow::Result<()> {
        let current = self.current();
        let mut nss = self.namespaces.write();
        let ns = nss
            .get_mut(&current)
            .ok_or_else(|| anyhow::anyhow!("no current namespace {current}"))?;
        ns.aliases.insert(ArcStr::from(alias), ArcStr::from(target_ns));
        Ok(())
    }

    pub fn import(&self, type_name: &str) {
        let current = self.current();
        let mut nss = self.namespaces.write();
        if let Some(ns) = nss.get_mut(&current) {
            ns.imports.insert(ArcStr::from(type_name));
        }
    }

    pub fn require(&self, target_ns: &str) {
        let current = self.current();
        let mut nss = self.namespaces.write();
        if let Some(ns) = nss.get_mut(&current) {
            ns.requires.insert(ArcStr::from(target_ns));
        }
    }

    /// Define a var in the current namespace, allocating the backing `Var`
    /// in the registry if this is the first definition under that name.
    pub fn define_var(&self, name: &str, info: VarInfo) -> Arc<Var> {
        let current = self.current();
        let var = self.vars.intern(&current, name);
        let mut nss = self.namespaces.write();
        let ns = nss.entry(current.clone()).or_insert_with(|| Namespace::new(current.clone()));
        ns.vars.insert(ArcStr::from(name), NamespaceVar { info, var: var.clone() });
        var
    }

    /// Resolve `name` to a fully-qualified `(ns, name)` pair visible from
    /// `from_ns`, following alias indirection first.
    pub fn resolve(&self, from_ns: &str, qualifier: Option<&str>, name: &str) -> Option<(ArcStr, ArcStr, VarInfo)> {
        let nss = self.namespaces.read();
        let ns_name = match qualifier {
            None => ArcStr::from(from_ns),
            Some(q) => {
                let from = nss.get(from_ns)?;
                from.aliases.get(q).cloned().unwrap_or_else(|| ArcStr::from(q))
            }
        };
        let ns = nss.get(&ns_name)?;
        let entry = ns.vars.get(name)?;
        Some((ns_name.clone(), ArcStr::from(name), entry.info.clone()))
    }

    pub fn is_macro(&self, from_ns: &str, qualifier: Option<&str>, name: &str) -> bool {
        self.resolve(from_ns, qualifier, name).map(|(_, _, info)| info.is_macro).unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> bool {
        self.namespaces.read().contains_key(name)
    }

    /// Push `name` on the load stack; fails with `CircularDependency` if
    /// `name` is already being loaded somewhere up the stack.
    pub fn begin_load(&self, name: &str) -> anyhow::Result<()> {
        let mut stack = self.load_stack.write();
        if stack.iter().any(|n| n.as_str() == name) {
            anyhow::bail!(CircularDependency(ArcStr::from(name)));
        }
        stack.push(ArcStr::from(name));
        Ok(())
    }

    pub fn end_load(&self, name: &str) {
        let mut stack = self.load_stack.write();
        if let Some(pos) = stack.iter().rposition(|n| n.as_str() == name) {
            stack.remove(pos);
        }
    }

    pub fn gensym(&self, prefix: &str) -> ArcStr {
        let n = self.gensym_counter.fetch_add(1, Ordering::Relaxed);
        ArcStr::from(format!("{prefix}__{n}__auto__"))
    }

    /// Restrict a namespace's visible bindings in place, mirroring
    /// `graphix-compiler::env::Env::apply_sandbox` generalized to vars: a
    /// blacklist removes the named vars/namespaces, a whitelist keeps only
    /// them. Used by an embedding hot-reload host to sandbox a reloaded
    /// namespace's surface.
    pub fn apply_sandbox(&self, ns: &str, sandbox: &Sandbox) -> anyhow::Result<()> {
        let mut nss = self.namespaces.write();
        let entry = nss
            .get_mut(ns)
            .ok_or_else(|| anyhow::anyhow!("unknown namespace {ns}"))?;
        match sandbox {
            Sandbox::Unrestricted => {}
            Sandbox::Blacklist(names) => {
                for n in names {
                    entry.vars.remove(n.as_str());
                }
            }
            Sandbox::Whitelist(names) => {
                entry.vars.retain(|k, _| names.iter().any(|n| n.as_str() == k.as_str()));
            }
        }
        Ok(())
    }

    /// Prefix search over visible var names, for an embedding REPL/IDE
    /// collaborator. Not used by the analyzer or emitter themselves,
    /// mirroring `Env::lookup_matching`'s own "not used by the compiler"
    /// contract.
    pub fn complete_var(&self, ns: &str, prefix: &str) -> Vec<ArcStr> {
        let nss = self.namespaces.read();
        let mut out: Vec<ArcStr> = match nss.get(ns) {
            Some(n) => n.vars.keys().filter(|k| k.starts_with(prefix)).cloned().collect(),
            None => Vec::new(),
        };
        out.sort();
        out
    }

    pub fn complete_namespace(&self, prefix: &str) -> Vec<ArcStr> {
        let nss = self.namespaces.read();
        let mut out: Vec<ArcStr> =
            nss.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        out.sort();
        out
    }
}

#[derive(Debug, Clone)]
pub enum Sandbox {
    Unrestricted,
    Blacklist(Vec<ArcStr>),
    Whitelist(Vec<ArcStr>),
}

/// Clojure-namespace-to-host-identifier mapping: split on
/// `.`, drop hyphens, capitalize each segment; the last segment becomes the
/// synthesized class name, substituting `Program` when it would be `Main`.
pub fn mangle_namespace(ns: &str) -> (String, String) {
    fn capitalize_segment(seg: &str) -> String {
        let mut out = String::new();
        let mut capitalize_next = true;
        for c in seg.chars() {
            if c == '-' {
                capitalize_next = true;
                continue;
            }
            if capitalize_next {
                out.extend(c.to_uppercase());
                capitalize_next = false;
            } else {
                out.push(c);
            }
        }
        out
    }
    let segs: Vec<String> = ns.split('.').map(capitalize_segment).collect();
    let class = match segs.last() {
        Some(last) if last == "Main" => "Program".to_string(),
        Some(last) => last.clone(),
        None => "Program".to_string(),
    };
    let namespace = segs.join(".");
    (namespace, class)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mangles_hyphenated_segments() {
        let (ns, class) = mangle_namespace("foo-bar.baz");
        assert_eq!(ns, "FooBar.Baz");
        assert_eq!(class, "Baz");
    }

    #[test]
    fn main_becomes_program() {
        let (_, class) = mangle_namespace("my-app.main");
        assert_eq!(class, "Program");
    }

    #[test]
    fn begin_load_detects_cycle() {
        let mgr = NamespaceManager::new();
        mgr.begin_load("a.b").unwrap();
        mgr.begin_load("c.d").unwrap();
        assert!(mgr.begin_load("a.b").is_err());
        mgr.end_load("c.d");
        mgr.end_load("a.b");
        assert!(mgr.begin_load("a.b").is_ok());
    }

    #[test]
    fn var_bind_root_is_observed_by_all_readers() {
        let reg = VarRegistry::new();
        let v1 = reg.intern("user", "x");
        let v2 = reg.intern("user", "x");
        v1.bind_root(Form::Int(42));
        assert!(matches!(v2.deref(), Some(Form::Int(42))));
    }

    #[test]
    fn alias_resolution_redirects_qualifier() {
        let mgr = NamespaceManager::new();
        mgr.switch_to("foo.bar");
        mgr.define_var("x", VarInfo::default());
        mgr.switch_to("user");
        mgr.add_alias("fb", "foo.bar").unwrap();
        let resolved = mgr.resolve("user", Some("fb"), "x");
        assert_eq!(resolved.map(|(ns, name, _)| (ns.to_string(), name.to_string())),
            Some(("foo.bar".to_string(), "x".to_string())));
    }
}
