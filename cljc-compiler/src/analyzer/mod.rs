//! The analyzer: lowers `Form` to the typed `Expr` IR.
//! Grounded on `graphix-compiler`'s `node::compiler` (form-to-node lowering
//! driven by a `Scope`-carrying context) and `env::Env` (the namespace/var
//! side table consulted during symbol resolution).

pub mod desugar;
pub mod primitive_op;
pub mod scope;

use crate::{
    errors::AnalyzerError,
    form::{Form, Symbol, TagValue},
    ir::{Expr, ExprKind, Field, Fn_, FnMethod, HostType, Protocol, Test, TryCatch, TypeBody},
    macroexpand::MacroExpander,
    ns::NamespaceManager,
};
use anyhow::{bail, Context, Result};
use compact_str::CompactString;
use indexmap::IndexMap;
use triomphe::Arc;

pub use scope::{AnalyzerContext, Scope};

/// Namespaces whose qualifier is stripped before resolution: `clojure.core`/`cljs.core` from the source dialect, plus this
/// dialect's own core namespace.
const CORE_NAMESPACES: &[&str] = &["clojure.core", "cljs.core", "cljc.core"];

const SPECIAL_FORMS: &[&str] = &[
    "def", "defn", "defn-", "fn", "fn*", "let", "do", "if", "quote", "new", "set!",
    "throw", "try", "loop", "recur", "await", "ns", "in-ns", "require", "when",
    "when-not", "when-let", "if-let", "if-not", "cond", "and", "or", "not", "dotimes",
    "->", "->>", "doto", "comment", "syntax-quote", "defmacro", "macroexpand",
    "macroexpand-1", "defprotocol", "deftype", "defrecord", "deftest", "is", "instance?",
];

pub fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

/// Normalizes host BCL type names so user types cannot collide with
/// primitive aliases: `String -> string`, `Int32 -> int`,
/// `Int64 -> long`, `Boolean -> bool`, etc.
pub fn normalize_host_type_name(name: &str) -> String {
    match name {
        "String" => "string".to_string(),
        "Int32" => "int".to_string(),
        "Int64" => "long".to_string(),
        "Single" => "float".to_string(),
        "Double" => "double".to_string(),
        "Boolean" => "bool".to_string(),
        "Decimal" => "decimal".to_string(),
        "Object" => "object".to_string(),
        "Void" => "void".to_string(),
        other => other.to_string(),
    }
}

fn tag_to_host_type(tag: &TagValue) -> HostType {
    match tag {
        TagValue::Symbol(s) => HostType(normalize_host_type_name(&s.name).into()),
        TagValue::Text(s) => HostType(normalize_host_type_name(s).into()),
    }
}

pub struct Analyzer<'a> {
    pub ns: &'a NamespaceManager,
    pub macros: &'a MacroExpander,
}

impl<'a> Analyzer<'a> {
    pub fn new(ns: &'a NamespaceManager, macros: &'a MacroExpander) -> Self {
        Analyzer { ns, macros }
    }

    fn gensym(&self, prefix: &str) -> String {
        self.ns.gensym(prefix).to_string()
    }

    /// Entry point for a whole compiled file: picks out at most one
    /// leading `ns` form, switches namespace, and analyzes the rest.
    pub fn analyze_file(&self, forms: &[Form]) -> Result<crate::ir::CompilationUnit> {
        let mut unit_ns = None;
        let mut exprs = Vec::new();
        let mut has_tests = false;
        let mut requires = IndexMap::new();
        let ctx = AnalyzerContext::default();
        let mut seen_ns = false;
        for form in forms {
            if let Some(items) = form.as_list() {
                if let Some("ns") = form.list_head_name() {
                    if seen_ns {
                        bail!(AnalyzerError::new("a compilation unit may have at most one ns form", form));
                    }
                    seen_ns = true;
                    let name_sym = items
                        .get(1)
                        .and_then(Form::as_symbol)
                        .ok_or_else(|| AnalyzerError::new("ns requires a name symbol", form))?;
                    self.ns.switch_to(&name_sym.name);
                    unit_ns = Some(arcstr::ArcStr::from(name_sym.name.as_str()));
                    for clause in &items[2..] {
                        if let Some("require" | ":require") = clause.list_head_name() {
                            self.process_requires(clause, &mut requires)?;
                        }
                    }
                    continue;
                }
            }
            if matches!(form.list_head_name(), Some("deftest")) {
                has_tests = true;
            }
            let expr = self.analyze(form, &ctx)?;
            exprs.push(expr);
        }
        Ok(crate::ir::CompilationUnit { ns: unit_ns, exprs, has_tests, requires })
    }

    fn process_requires(&self, clause: &Form, out: &mut IndexMap<arcstr::ArcStr, arcstr::ArcStr>) -> Result<()> {
        let Some(items) = clause.as_list() else { return Ok(()) };
        for spec in &items[1..] {
            match spec {
                Form::Symbol(s) => {
                    self.ns.require(&s.name);
                    out.insert(arcstr::ArcStr::from(s.name.as_str()), arcstr::ArcStr::from(s.name.as_str()));
                }
                Form::Vector(v, _) => {
                    let Some(target) = v.first().and_then(Form::as_symbol) else { continue };
                    self.ns.require(&target.name);
                    let mut alias = target.name.to_string();
                    let mut i = 1;
                    while i + 1 < v.len() {
                        if let Some(kw) = match &v[i] {
                            Form::Keyword(k) => Some(k),
                            _ => None,
                        } {
                            if kw.ns().is_none() && kw.name() == "as" {
                                if let Some(a) = v[i + 1].as_symbol() {
                                    alias = a.name.to_string();
                                    self.ns.add_alias(&alias, &target.name)?;
                                }
                            }
                        }
                        i += 2;
                    }
                    out.insert(arcstr::ArcStr::from(alias.as_str()), arcstr::ArcStr::from(target.name.as_str()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Form -> Expr. Handles type-hint extraction (wrapping
    /// the result in `Cast`) uniformly, ahead of the per-kind dispatch.
    pub fn analyze(&self, form: &Form, ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let expr = self.analyze_inner(form, ctx)?;
        match form.meta().and_then(|m| m.tag()) {
            Some(tag) => {
                let host_type = tag_to_host_type(&tag);
                Ok(Expr::new(ExprKind::Cast { type_name: host_type, inner: expr }))
            }
            None => Ok(expr),
        }
    }

    fn analyze_inner(&self, form: &Form, ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        match form {
            Form::Nil | Form::Bool(_) | Form::Int(_) | Form::Float(_) | Form::Decimal(_)
            | Form::Char(_) | Form::String(_) => Ok(Expr::new(ExprKind::Literal(form.clone()))),
            Form::Keyword(k) => Ok(Expr::new(ExprKind::KeywordRef(k.clone()))),
            Form::Symbol(s) => self.resolve_symbol(s, ctx),
            Form::Vector(items, _) => {
                let analyzed = items.iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
                Ok(Expr::new(ExprKind::VectorLit(analyzed)))
            }
            Form::Set(items, _) => {
                let analyzed = items.iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
                Ok(Expr::new(ExprKind::SetLit(analyzed)))
            }
            Form::Map(pairs, _) => {
                let analyzed = pairs
                    .iter()
                    .map(|(k, v)| Ok((self.analyze(k, ctx)?, self.analyze(v, ctx)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::new(ExprKind::MapLit(analyzed)))
            }
            Form::List(items, _) => self.analyze_list(items, form, ctx),
        }
    }

    fn resolve_symbol(&self, s: &Symbol, ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        // step 1: strip a core-namespace qualifier
        if let Some(ns) = &s.ns {
            if CORE_NAMESPACES.contains(&ns.as_str()) {
                return self.resolve_symbol(&Symbol::new(None, &s.name), ctx);
            }
        }
        // step 2: local lexical binding
        if s.ns.is_none() && ctx.scope.contains(&s.name) {
            let typ = ctx.scope.local_type(&s.name);
            let kind = ExprKind::SymbolRef { name: s.clone(), is_local: true };
            return Ok(match typ {
                Some(t) => Expr::with_type(kind, t),
                None => Expr::new(kind),
            });
        }
        // step 3: uppercase-leading qualifier names a static property access
        if let Some(ns) = &s.ns {
            if ns.chars().next().is_some_and(|c| c.is_uppercase()) {
                return Ok(Expr::new(ExprKind::StaticProperty {
                    type_name: HostType(normalize_host_type_name(ns).into()),
                    name: CompactString::from(s.name.as_str()),
                }));
            }
        }
        // step 4: otherwise a var reference, resolved at emission time
        Ok(Expr::new(ExprKind::SymbolRef { name: s.clone(), is_local: false }))
    }

    fn analyze_list(&self, items: &[Form], form: &Form, ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        if items.is_empty() {
            return Ok(Expr::new(ExprKind::Literal(Form::List(Arc::from(Vec::<Form>::new()), None))));
        }
        if let Some(name) = form.list_head_name() {
            if is_special_form(name) {
                return self.analyze_special(name, items, form, ctx);
            }
            if self.macros.is_macro(&self.ns.current(), name) {
                let expanded = self.macros.macroexpand(&self.ns.current(), form).map_err(|e| {
                    crate::errors::MacroExpansionError {
                        macro_name: name.to_string(),
                        cause: e.to_string(),
                        form: form.to_string(),
                    }
                })?;
                return self.analyze(&expanded, ctx);
            }
        }
        // sugar: interop and constructor forms driven by the head symbol's shape
        if let Form::Symbol(head) = &items[0] {
            if head.ns.is_none() && head.name.starts_with(".-") {
                let target = self.analyze(&items[1], ctx)?;
                return Ok(Expr::new(ExprKind::InstanceProperty {
                    target,
                    name: CompactString::from(&head.name[2..]),
                }));
            }
            if head.ns.is_none() && head.name.starts_with('.') && head.name.len() > 1 {
                let target = self.analyze(&items[1], ctx)?;
                let args = items[2..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
                let (base, type_args) = parse_generic_method_name(&head.name[1..]);
                return Ok(Expr::new(ExprKind::InstanceMethod {
                    target,
                    name: CompactString::from(base.as_str()),
                    args,
                    type_args,
                }));
            }
            if let Some(ns) = &head.ns {
                if ns.chars().next().is_some_and(|c| c.is_uppercase()) {
                    let args = items[1..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
                    let (base, type_args) = parse_generic_method_name(&head.name);
                    return Ok(Expr::new(ExprKind::StaticMethod {
                        type_name: HostType(normalize_host_type_name(ns).into()),
                        name: CompactString::from(base.as_str()),
                        args,
                        type_args,
                    }));
                }
            }
            if head.ns.is_none() && head.name.ends_with('.') && head.name.len() > 1 {
                let type_name = &head.name[..head.name.len() - 1];
                let args = items[1..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
                return Ok(Expr::new(ExprKind::New {
                    type_name: HostType(normalize_host_type_name(type_name).into()),
                    args,
                }));
            }
        }
        // plain invocation, with primitive-op specialization attempted first
        let func = self.analyze(&items[0], ctx)?;
        let args = items[1..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
        if let Some(name) = form.list_head_name() {
            if let Some(specialized) = primitive_op::try_specialize(name, &args) {
                return Ok(specialized);
            }
        }
        Ok(Expr::new(ExprKind::Invoke { func, args }))
    }

    fn analyze_special(&self, name: &str, items: &[Form], form: &Form, ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        match name {
            "def" => self.analyze_def(items, ctx),
            "defn" => self.analyze_defn(items, ctx, true),
            "defn-" => self.analyze_defn(items, ctx, false),
            "fn" | "fn*" => self.analyze_fn(items, ctx),
            "let" => self.analyze_let(items, ctx, false),
            "loop" => self.analyze_let(items, ctx, true),
            "do" => self.analyze_do(items, ctx),
            "if" => self.analyze_if(items, ctx),
            "quote" => Ok(Expr::new(ExprKind::Quote(items.get(1).cloned().unwrap_or(Form::Nil)))),
            "syntax-quote" => {
                let quoted = crate::macroexpand::syntax_quote(items.get(1).unwrap_or(&Form::Nil));
                Ok(Expr::new(ExprKind::Quote(quoted)))
            }
            "new" => self.analyze_new(items, ctx),
            "set!" => self.analyze_set(items, ctx),
            "throw" => Ok(Expr::new(ExprKind::Throw(self.analyze(items.get(1).context("throw requires an expression")?, ctx)?))),
            "try" => self.analyze_try(items, ctx),
            "recur" => self.analyze_recur(items, ctx),
            "await" => Ok(Expr::new(ExprKind::Await(self.analyze(items.get(1).context("await requires an expression")?, ctx)?))),
            "ns" => {
                let n = items.get(1).and_then(Form::as_symbol).context("ns requires a name symbol")?;
                Ok(Expr::new(ExprKind::Ns(arcstr::ArcStr::from(n.name.as_str()))))
            }
            "in-ns" => {
                let n = items.get(1).and_then(Form::as_symbol).context("in-ns requires a name symbol")?;
                self.ns.switch_to(&n.name);
                Ok(Expr::new(ExprKind::InNs(arcstr::ArcStr::from(n.name.as_str()))))
            }
            "require" => {
                for spec in &items[1..] {
                    if let Some(s) = spec.as_symbol() {
                        self.ns.require(&s.name);
                    }
                }
                Ok(Expr::new(ExprKind::Require(arcstr::ArcStr::from(""))))
            }
            "when" => self.analyze(&desugar::when(items)?, ctx),
            "when-not" => self.analyze(&desugar::when_not(items)?, ctx),
            "when-let" => self.analyze(&desugar::when_let(items)?, ctx),
            "if-let" => self.analyze(&desugar::if_let(items)?, ctx),
            "if-not" => self.analyze(&desugar::if_not(items)?, ctx),
            "cond" => self.analyze(&desugar::cond(items)?, ctx),
            "and" => self.analyze(&desugar::and(items, |p| self.gensym(p))?, ctx),
            "or" => self.analyze(&desugar::or(items, |p| self.gensym(p))?, ctx),
            "not" => {
                let inner = self.analyze(items.get(1).context("not requires one argument")?, ctx)?;
                Ok(Expr::new(ExprKind::Invoke {
                    func: Expr::new(ExprKind::SymbolRef { name: Symbol::unqualified("not"), is_local: false }),
                    args: vec![inner],
                }))
            }
            "dotimes" => self.analyze(&desugar::dotimes(items, |p| self.gensym(p))?, ctx),
            "->" => self.analyze(&desugar::thread_first(items)?, ctx),
            "->>" => self.analyze(&desugar::thread_last(items)?, ctx),
            "doto" => self.analyze(&desugar::doto(items, |p| self.gensym(p))?, ctx),
            "comment" => Ok(Expr::new(ExprKind::Literal(Form::Nil))),
            "defmacro" => {
                crate::macroexpand::register_defmacro(self.ns, self.macros, items)?;
                Ok(Expr::new(ExprKind::Literal(Form::Nil)))
            }
            "macroexpand" => {
                let f = items.get(1).context("macroexpand requires a form")?;
                let expanded = self.macros.macroexpand(&self.ns.current(), f)?;
                Ok(Expr::new(ExprKind::Quote(expanded)))
            }
            "macroexpand-1" => {
                let f = items.get(1).context("macroexpand-1 requires a form")?;
                let expanded = self.macros.macroexpand_1(&self.ns.current(), f)?;
                Ok(Expr::new(ExprKind::Quote(expanded)))
            }
            "defprotocol" => self.analyze_defprotocol(items),
            "deftype" => self.analyze_deftype(items, ctx, false),
            "defrecord" => self.analyze_deftype(items, ctx, true),
            "deftest" => self.analyze_deftest(items, ctx),
            "is" => Ok(Expr::new(ExprKind::Is(self.analyze(items.get(1).context("is requires an expression")?, ctx)?))),
            "instance?" => {
                let type_sym = items.get(1).and_then(Form::as_symbol).context("instance? requires a type symbol")?;
                let value = self.analyze(items.get(2).context("instance? requires a value")?, ctx)?;
                Ok(Expr::new(ExprKind::InstanceCheck {
                    typ: HostType(normalize_host_type_name(&type_sym.name).into()),
                    value,
                }))
            }
            _ => bail!(AnalyzerError::new(format!("unimplemented special form {name}"), form)),
        }
    }

    fn analyze_def(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let name_sym = items.get(1).and_then(Form::as_symbol)
            .ok_or_else(|| AnalyzerError::new("def requires a name symbol", Form::List(Arc::from(items.to_vec()), None)))?;
        let is_private = name_sym.meta.as_ref().is_some_and(|m| m.is_private());
        let type_hint = name_sym.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
        let (docstring, init_form) = match items.get(2..) {
            Some([Form::String(doc), init]) => (Some(doc.clone()), Some(init)),
            Some([init]) => (None, Some(init)),
            _ => (None, None),
        };
        let is_async = type_hint.as_ref().is_some_and(|t| t.0.starts_with("Task"));
        let body_ctx = ctx.with_async(is_async);
        let init = init_form.map(|f| self.analyze(f, &body_ctx)).transpose()?;
        self.ns.define_var(&name_sym.name, crate::ns::VarInfo {
            is_public: !is_private,
            is_macro: false,
            type_hint: type_hint.as_ref().map(|t| t.0.clone()),
        });
        Ok(Expr::new(ExprKind::Def {
            name: CompactString::from(name_sym.name.as_str()),
            init,
            docstring,
            type_hint,
            is_private,
        }))
    }

    /// `(defn name [params] body...)` or multi-arity
    /// `(defn name ([p1] b1) ([p1 p2] b2))` desugars to `(def name (fn name [...] ...))`.
    fn analyze_defn(&self, items: &[Form], ctx: &AnalyzerContext, public: bool) -> Result<Arc<Expr>> {
        let name_sym = items.get(1).and_then(Form::as_symbol)
            .ok_or_else(|| AnalyzerError::new("defn requires a name symbol", Form::List(Arc::from(items.to_vec()), None)))?;
        let fn_form_items: Vec<Form> = {
            let mut v = vec![Form::Symbol(Symbol::unqualified("fn")), Form::Symbol(name_sym.clone())];
            v.extend(items[2..].iter().cloned());
            v
        };
        let fn_form = Form::List(Arc::from(fn_form_items), None);
        let is_async = name_sym.meta.as_ref().and_then(|m| m.tag()).is_some_and(|t| tag_to_host_type(&t).0.starts_with("Task"));
        let fn_expr = self.analyze(&fn_form, &ctx.with_async(is_async))?;
        let type_hint = name_sym.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
        self.ns.define_var(&name_sym.name, crate::ns::VarInfo {
            is_public: public,
            is_macro: false,
            type_hint: type_hint.as_ref().map(|t| t.0.clone()),
        });
        Ok(Expr::new(ExprKind::Def {
            name: CompactString::from(name_sym.name.as_str()),
            init: Some(fn_expr),
            docstring: None,
            type_hint,
            is_private: !public,
        }))
    }

    fn analyze_fn(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let mut idx = 1;
        let name = match items.get(idx).and_then(Form::as_symbol) {
            Some(s) => {
                idx += 1;
                Some(CompactString::from(s.name.as_str()))
            }
            None => None,
        };

        let method_bodies: Vec<&[Form]> = match items.get(idx) {
            Some(Form::Vector(_, _)) => vec![&items[idx..]],
            Some(Form::List(_, _)) => items[idx..]
                .iter()
                .map(|f| f.as_list().ok_or_else(|| AnalyzerError::new("fn multi-arity clause must be a list", f).into()))
                .collect::<Result<Vec<_>>>()?,
            _ => bail!(AnalyzerError::new("fn requires a parameter vector or arity clauses", Form::List(Arc::from(items.to_vec()), None))),
        };

        let mut methods = Vec::new();
        let mut variadic_count = 0;
        for clause in &method_bodies {
            let Form::Vector(params, _) = &clause[0] else {
                bail!(AnalyzerError::new("fn arity clause must start with a parameter vector", clause[0].clone()));
            };
            let mut fixed_params = Vec::new();
            let mut rest_param = None;
            let mut param_types = Vec::new();
            let mut in_rest = false;
            let mut scope_names: Vec<(String, Option<HostType>)> = Vec::new();
            for p in params.iter() {
                let sym = p.as_symbol().ok_or_else(|| AnalyzerError::new("fn params must be symbols", p.clone()))?;
                if sym.ns.is_none() && sym.name.as_str() == "&" {
                    in_rest = true;
                    continue;
                }
                let tag = sym.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
                if in_rest {
                    rest_param = Some(CompactString::from(sym.name.as_str()));
                    scope_names.push((sym.name.to_string(), tag.clone()));
                } else {
                    fixed_params.push(CompactString::from(sym.name.as_str()));
                    param_types.push(tag.clone());
                    scope_names.push((sym.name.to_string(), tag));
                }
            }
            if rest_param.is_some() {
                variadic_count += 1;
            }
            let arity = fixed_params.len();
            let inner_scope = ctx.scope.with_locals(scope_names.iter().map(|(n, t)| (n.as_str(), t.clone())));
            let method_ctx = AnalyzerContext { scope: inner_scope, ..ctx.clone() }.with_recur_arity(arity + rest_param.is_some() as usize);
            let body_forms = &clause[1..];
            let body = self.analyze_implicit_do(body_forms, &method_ctx)?;
            methods.push(FnMethod {
                fixed_params,
                rest_param,
                param_types: if param_types.iter().any(Option::is_some) { Some(param_types) } else { None },
                body,
                return_type: None,
            });
        }
        if variadic_count > 1 {
            bail!(AnalyzerError::new("fn may have at most one variadic method", Form::List(Arc::from(items.to_vec()), None)));
        }
        if variadic_count == 1 {
            let variadic_arity = methods.iter().find(|m| m.rest_param.is_some()).unwrap().fixed_params.len();
            if methods.iter().any(|m| m.rest_param.is_none() && m.fixed_params.len() >= variadic_arity) {
                bail!(AnalyzerError::new(
                    "the variadic method's fixed arity must exceed every non-variadic method's arity",
                    Form::List(Arc::from(items.to_vec()), None),
                ));
            }
        }
        Ok(Expr::new(ExprKind::Fn(Fn_ {
            name,
            methods,
            is_variadic: variadic_count == 1,
            is_async: ctx.is_async,
        })))
    }

    fn analyze_implicit_do(&self, forms: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        if forms.len() == 1 {
            self.analyze(&forms[0], ctx)
        } else {
            let analyzed = forms.iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
            Ok(Expr::new(ExprKind::Do(analyzed)))
        }
    }

    fn analyze_let(&self, items: &[Form], ctx: &AnalyzerContext, is_loop: bool) -> Result<Arc<Expr>> {
        let Some(Form::Vector(binding_forms, _)) = items.get(1) else {
            bail!(AnalyzerError::new("let/loop requires a binding vector", Form::List(Arc::from(items.to_vec()), None)));
        };
        if binding_forms.len() % 2 != 0 {
            bail!(AnalyzerError::new("let/loop binding vector must have an even number of forms", Form::List(Arc::from(items.to_vec()), None)));
        }
        let mut bindings = Vec::new();
        let mut cur_ctx = ctx.clone();
        for pair in binding_forms.chunks(2) {
            let name_sym = pair[0].as_symbol().ok_or_else(|| AnalyzerError::new("let/loop binding names must be symbols", pair[0].clone()))?;
            let init = self.analyze(&pair[1], &cur_ctx)?;
            let tag = name_sym.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
            cur_ctx = cur_ctx.with_local_type(&name_sym.name, tag.or_else(|| init.inferred_type.clone()));
            bindings.push((CompactString::from(name_sym.name.as_str()), init));
        }
        if is_loop {
            cur_ctx = cur_ctx.with_recur_arity(bindings.len());
        }
        let body = self.analyze_implicit_do(&items[2..], &cur_ctx)?;
        if is_loop {
            Ok(Expr::new(ExprKind::Loop { bindings, body }))
        } else {
            Ok(Expr::new(ExprKind::Let { bindings, body }))
        }
    }

    fn analyze_do(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let analyzed = items[1..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
        Ok(Expr::new(ExprKind::Do(analyzed)))
    }

    fn analyze_if(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        if items.len() < 3 || items.len() > 4 {
            bail!(AnalyzerError::new("if requires a test and then-branch, with an optional else-branch", Form::List(Arc::from(items.to_vec()), None)));
        }
        let test = self.analyze(&items[1], ctx)?;
        let then = self.analyze(&items[2], ctx)?;
        let els = items.get(3).map(|f| self.analyze(f, ctx)).transpose()?;
        Ok(Expr::new(ExprKind::If { test, then, els }))
    }

    fn analyze_new(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let type_sym = items.get(1).and_then(Form::as_symbol).context("new requires a type symbol")?;
        let args = items[2..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
        Ok(Expr::new(ExprKind::New { type_name: HostType(normalize_host_type_name(&type_sym.name).into()), args }))
    }

    fn analyze_set(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let target = self.analyze(items.get(1).context("set! requires a target")?, ctx)?;
        let value = self.analyze(items.get(2).context("set! requires a value")?, ctx)?;
        Ok(Expr::new(ExprKind::Assign { target, value }))
    }

    fn analyze_try(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let mut body_forms = Vec::new();
        let mut catches = Vec::new();
        let mut finally = None;
        for form in &items[1..] {
            match form.list_head_name() {
                Some("catch") => {
                    let clause = form.as_list().unwrap();
                    let ex_type = clause.get(1).and_then(Form::as_symbol).context("catch requires an exception type")?;
                    let binding = clause.get(2).and_then(Form::as_symbol).context("catch requires a binding symbol")?;
                    let catch_ctx = ctx.with_local_type(&binding.name, Some(HostType(normalize_host_type_name(&ex_type.name).into())));
                    let body = self.analyze_implicit_do(&clause[3..], &catch_ctx)?;
                    catches.push(TryCatch {
                        ex_type: HostType(normalize_host_type_name(&ex_type.name).into()),
                        binding: CompactString::from(binding.name.as_str()),
                        body,
                    });
                }
                Some("finally") => {
                    let clause = form.as_list().unwrap();
                    finally = Some(self.analyze_implicit_do(&clause[1..], ctx)?);
                }
                _ => body_forms.push(form.clone()),
            }
        }
        let body = self.analyze_implicit_do(&body_forms, ctx)?;
        Ok(Expr::new(ExprKind::Try { body, catches, finally }))
    }

    fn analyze_recur(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let args = items[1..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
        if let Some(arity) = ctx.recur_arity {
            if arity != args.len() {
                bail!(AnalyzerError::new(
                    format!("recur arity {} does not match enclosing loop/fn arity {arity}", args.len()),
                    Form::List(Arc::from(items.to_vec()), None),
                ));
            }
        } else {
            bail!(AnalyzerError::new("recur used outside of a loop or fn method", Form::List(Arc::from(items.to_vec()), None)));
        }
        Ok(Expr::new(ExprKind::Recur(args)))
    }

    fn analyze_defprotocol(&self, items: &[Form]) -> Result<Arc<Expr>> {
        let name_sym = items.get(1).and_then(Form::as_symbol).context("defprotocol requires a name symbol")?;
        let mut methods = Vec::new();
        for form in &items[2..] {
            let Some(sig) = form.as_list() else { continue };
            let method_name = sig.get(0).and_then(Form::as_symbol).context("protocol method requires a name")?;
            let Some(Form::Vector(params, _)) = sig.get(1) else {
                bail!(AnalyzerError::new("protocol method requires a parameter vector", form.clone()));
            };
            // first param is the implicit `this`; skip it.
            let param_types = params[1..]
                .iter()
                .map(|p| p.as_symbol().and_then(|s| s.meta.as_ref()).and_then(|m| m.tag()).map(|t| tag_to_host_type(&t)))
                .collect();
            let return_type = method_name.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
            methods.push((CompactString::from(method_name.name.as_str()), param_types, return_type));
        }
        Ok(Expr::new(ExprKind::Defprotocol(Protocol { name: CompactString::from(name_sym.name.as_str()), methods })))
    }

    fn analyze_deftype(&self, items: &[Form], ctx: &AnalyzerContext, as_record: bool) -> Result<Arc<Expr>> {
        let name_sym = items.get(1).and_then(Form::as_symbol).context("deftype/defrecord requires a name symbol")?;
        let Some(Form::Vector(field_forms, _)) = items.get(2) else {
            bail!(AnalyzerError::new("deftype/defrecord requires a field vector", Form::List(Arc::from(items.to_vec()), None)));
        };
        let fields = field_forms
            .iter()
            .map(|f| {
                let sym = f.as_symbol().ok_or_else(|| AnalyzerError::new("deftype/defrecord fields must be symbols", f.clone()))?;
                let host_type = sym.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
                let attrs = sym.meta.as_ref().map(|m| m.attrs()).unwrap_or_default();
                Ok(Field { name: CompactString::from(sym.name.as_str()), host_type, attrs })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut interfaces = Vec::new();
        let mut methods = Vec::new();
        for form in &items[3..] {
            let Some(clause) = form.as_list() else { continue };
            if let Some(sym) = clause.get(0).and_then(Form::as_symbol) {
                if clause.len() == 1 {
                    interfaces.push(HostType(normalize_host_type_name(&sym.name).into()));
                    continue;
                }
            }
            let method_name = clause.get(0).and_then(Form::as_symbol).context("type method requires a name")?;
            let Some(Form::Vector(params, _)) = clause.get(1) else {
                bail!(AnalyzerError::new("type method requires a parameter vector", form.clone()));
            };
            let mut fixed_params = Vec::new();
            let mut param_types = Vec::new();
            let mut scope_names = Vec::new();
            for p in &params[1..] {
                let sym = p.as_symbol().context("type method params must be symbols")?;
                let tag = sym.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
                fixed_params.push(CompactString::from(sym.name.as_str()));
                param_types.push(tag.clone());
                scope_names.push((sym.name.to_string(), tag));
            }
            let inner_scope = ctx.scope.with_locals(scope_names.iter().map(|(n, t)| (n.as_str(), t.clone())));
            let method_ctx = AnalyzerContext { scope: inner_scope, ..ctx.clone() };
            let body = self.analyze_implicit_do(&clause[2..], &method_ctx)?;
            let return_type = method_name.meta.as_ref().and_then(|m| m.tag()).map(|t| tag_to_host_type(&t));
            methods.push((
                CompactString::from(method_name.name.as_str()),
                FnMethod {
                    fixed_params,
                    rest_param: None,
                    param_types: if param_types.iter().any(Option::is_some) { Some(param_types) } else { None },
                    body,
                    return_type,
                },
            ));
        }
        let body = TypeBody { name: CompactString::from(name_sym.name.as_str()), fields, interfaces, methods };
        Ok(Expr::new(if as_record { ExprKind::Defrecord(body) } else { ExprKind::Deftype(body) }))
    }

    fn analyze_deftest(&self, items: &[Form], ctx: &AnalyzerContext) -> Result<Arc<Expr>> {
        let name_sym = items.get(1).and_then(Form::as_symbol).context("deftest requires a name symbol")?;
        let body = items[2..].iter().map(|f| self.analyze(f, ctx)).collect::<Result<Vec<_>>>()?;
        Ok(Expr::new(ExprKind::Deftest(Test { name: CompactString::from(name_sym.name.as_str()), body })))
    }
}

/// Parses `|Name<T1,T2>|` or `Name<T1,T2>` generic method-name syntax
///, balancing nested angle brackets by depth.
pub fn parse_generic_method_name(raw: &str) -> (String, Vec<HostType>) {
    let raw = raw.strip_prefix('|').and_then(|s| s.strip_suffix('|')).unwrap_or(raw);
    let Some(start) = raw.find('<') else { return (raw.to_string(), Vec::new()) };
    let base = raw[..start].to_string();
    let mut depth = 0usize;
    let mut end = raw.len();
    for (i, c) in raw.char_indices().skip(start) {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    end = i;
                    break;
                }
            }
            _ => {}
        }
    }
    let inner = &raw[start + 1..end];
    let args = inner
        .split(',')
        .map(|s| HostType(normalize_host_type_name(s.trim()).into()))
        .collect();
    (base, args)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sym(name: &str) -> Form {
        Form::Symbol(Symbol::unqualified(name))
    }
    fn list(items: Vec<Form>) -> Form {
        Form::List(Arc::from(items), None)
    }

    #[test]
    fn literal_forms_analyze_idempotently() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default();
        for form in [Form::Nil, Form::Bool(true), Form::Int(42), Form::Float(1.5)] {
            let e = az.analyze(&form, &ctx).unwrap();
            assert!(matches!(e.kind, ExprKind::Literal(_)));
        }
    }

    #[test]
    fn unqualified_local_symbol_resolves_to_local_ref() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default().with_local_type("x", None);
        let e = az.analyze(&sym("x"), &ctx).unwrap();
        assert!(matches!(e.kind, ExprKind::SymbolRef { is_local: true, .. }));
    }

    #[test]
    fn uppercase_namespace_symbol_is_static_property() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default();
        let form = Form::Symbol(Symbol::new(Some("Int32"), "MaxValue"));
        let e = az.analyze(&form, &ctx).unwrap();
        assert!(matches!(e.kind, ExprKind::StaticProperty { .. }));
    }

    #[test]
    fn recur_outside_loop_or_fn_is_an_error() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default();
        let form = list(vec![sym("recur"), Form::Int(1)]);
        assert!(az.analyze(&form, &ctx).is_err());
    }

    #[test]
    fn recur_arity_mismatch_is_an_error() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default();
        let form = list(vec![
            sym("loop"),
            Form::Vector(Arc::from(vec![sym("i"), Form::Int(0)]), None),
            list(vec![sym("recur"), Form::Int(1), Form::Int(2)]),
        ]);
        assert!(az.analyze(&form, &ctx).is_err());
    }

    #[test]
    fn primitive_op_specializes_when_operands_are_tagged() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default();
        let form = list(vec![sym("+"), Form::Int(1), Form::Int(2)]);
        let e = az.analyze(&form, &ctx).unwrap();
        assert!(matches!(e.kind, ExprKind::PrimitiveOp { .. }));
    }

    #[test]
    fn multi_arity_fn_with_two_variadic_methods_is_rejected() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default();
        let variadic = |n: &str| list(vec![Form::Vector(Arc::from(vec![sym("a"), sym("&"), sym(n)]), None), Form::Int(1)]);
        let form = list(vec![sym("fn"), variadic("rest1"), variadic("rest2")]);
        assert!(az.analyze(&form, &ctx).is_err());
    }

    #[test]
    fn instance_dot_sugar_produces_instance_method() {
        let ns = NamespaceManager::new();
        let macros = MacroExpander::new();
        let az = Analyzer::new(&ns, &macros);
        let ctx = AnalyzerContext::default();
        let form = list(vec![sym(".ToString"), sym("x")]);
        let e = az.analyze(&form, &ctx.with_local_type("x", None)).unwrap();
        assert!(matches!(e.kind, ExprKind::InstanceMethod { .. }));
    }

    #[test]
    fn generic_method_name_parses_type_args() {
        let (base, args) = parse_generic_method_name("GetValue<Int32>");
        assert_eq!(base, "GetValue");
        assert_eq!(args, vec![HostType::named("int")]);
    }
}
