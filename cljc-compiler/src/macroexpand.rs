//! Macro expander: registers user macros, expands macro calls,
//! and implements syntax-quote. Grounded on `graphix-compiler`'s
//! separation of concerns between `expr::resolver` (an external-reference
//! resolution pass that rewrites the form tree) and `env::Env` (the table
//! the resolved names are looked up in) — the macro table here plays the
//! same "side table the analyzer consults mid-walk" role `ModuleResolver` plays
//! for `Expr::resolve_modules`.

use crate::{
    form::{Form, Symbol},
    ns::NamespaceManager,
};
use anyhow::{bail, Result};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use triomphe::Arc;

/// A user-defined macro transform: `(defmacro name [params] body)` compiles
/// down to this closure-like record rather than a raw `Fn`, so it can be
/// stored, cloned cheaply, and invoked with the macro-call's raw argument
/// forms (unevaluated).
pub struct MacroDef {
    pub name: Arc<str>,
    pub params: Vec<Symbol>,
    pub rest_param: Option<Symbol>,
    pub body: Vec<Form>,
}

/// Registry of user macros, keyed by unqualified name within a namespace.
/// A list headed by a qualified symbol is never treated as a macro call
///: qualified symbols always resolve through the namespace
/// manager as an ordinary var/interop reference.
#[derive(Default)]
pub struct MacroExpander {
    macros: RwLock<FxHashMap<(Arc<str>, Arc<str>), Arc<MacroDef>>>,
}

impl MacroExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, ns: &str, def: MacroDef) {
        self.macros
            .write()
            .insert((Arc::from(ns), def.name.clone()), Arc::new(def));
    }

    pub fn is_macro(&self, ns: &str, name: &str) -> bool {
        self.macros.read().contains_key(&(Arc::from(ns), Arc::from(name)))
    }

    fn lookup(&self, ns: &str, name: &str) -> Option<Arc<MacroDef>> {
        self.macros.read().get(&(Arc::from(ns), Arc::from(name))).cloned()
    }

    /// Apply a macro's transform once. The form must be a list headed by an
    /// unqualified symbol that names a registered macro; otherwise the form
    /// is returned unchanged.
    pub fn macroexpand_1(&self, ns: &str, form: &Form) -> Result<Form> {
        let Some(items) = form.as_list() else { return Ok(form.clone()) };
        let Some(head) = items.first().and_then(Form::as_symbol) else {
            return Ok(form.clone());
        };
        if head.ns.is_some() {
            return Ok(form.clone());
        }
        let Some(mac) = self.lookup(ns, &head.name) else { return Ok(form.clone()) };
        self.apply(&mac, &items[1..])
    }

    /// Fixed-point application of `macroexpand_1`.
    pub fn macroexpand(&self, ns: &str, form: &Form) -> Result<Form> {
        let mut current = form.clone();
        loop {
            let next = self.macroexpand_1(ns, &current)?;
            if same_shape(&current, &next) {
                return Ok(next);
            }
            current = next;
        }
    }

    fn apply(&self, mac: &MacroDef, args: &[Form]) -> Result<Form> {
        let fixed = mac.params.len();
        if mac.rest_param.is_none() && args.len() != fixed {
            bail!(
                "macro {} expects {fixed} argument(s), got {}",
                mac.name,
                args.len()
            );
        }
        if mac.rest_param.is_some() && args.len() < fixed {
            bail!(
                "macro {} expects at least {fixed} argument(s), got {}",
                mac.name,
                args.len()
            );
        }
        let mut bindings: FxHashMap<Arc<str>, Form> = FxHashMap::default();
        for (param, arg) in mac.params.iter().zip(args.iter()) {
            bindings.insert(Arc::from(param.name.as_str()), arg.clone());
        }
        if let Some(rest) = &mac.rest_param {
            let tail: Vec<Form> = args[fixed..].to_vec();
            bindings.insert(
                Arc::from(rest.name.as_str()),
                Form::List(Arc::from(tail), None),
            );
        }
        let mut result = Form::Nil;
        for expr in &mac.body {
            result = substitute(expr, &bindings);
        }
        Ok(result)
    }
}

/// Template substitution used both for macro-body expansion and for
/// syntax-quote's non-hygienic rewrite.
fn substitute(form: &Form, bindings: &FxHashMap<Arc<str>, Form>) -> Form {
    match form {
        Form::Symbol(s) if s.ns.is_none() => {
            if let Some(bound) = bindings.get(s.name.as_str()) {
                bound.clone()
            } else {
                form.clone()
            }
        }
        Form::List(items, meta) => Form::List(
            Arc::from(items.iter().map(|f| substitute(f, bindings)).collect::<Vec<_>>()),
            meta.clone(),
        ),
        Form::Vector(items, meta) => Form::Vector(
            Arc::from(items.iter().map(|f| substitute(f, bindings)).collect::<Vec<_>>()),
            meta.clone(),
        ),
        Form::Map(pairs, meta) => Form::Map(
            Arc::from(
                pairs
                    .iter()
                    .map(|(k, v)| (substitute(k, bindings), substitute(v, bindings)))
                    .collect::<Vec<_>>(),
            ),
            meta.clone(),
        ),
        Form::Set(items, meta) => Form::Set(
            Arc::from(items.iter().map(|f| substitute(f, bindings)).collect::<Vec<_>>()),
            meta.clone(),
        ),
        _ => form.clone(),
    }
}

/// Syntax-quote: every subform is quoted except `~x` (unquote, rewritten to
/// `x` evaluated in place) and `~@x` (unquote-splicing, only legal inside a
/// list/vector, splices `x`'s elements in place). Represented here over
/// the raw form tree directly, ahead of analysis: `expand` produces the
/// literal nested-quote form the analyzer's `Quote` IR node later walks.
pub fn syntax_quote(form: &Form) -> Form {
    fn is_unquote(items: &[Form]) -> bool {
        matches!(items.first().and_then(Form::as_symbol), Some(s) if s.ns.is_none() && s.name.as_str() == "unquote")
    }
    fn is_unquote_splicing(items: &[Form]) -> bool {
        matches!(items.first().and_then(Form::as_symbol), Some(s) if s.ns.is_none() && s.name.as_str() == "unquote-splicing")
    }
    fn expand_seq(items: &[Form]) -> Vec<Form> {
        let mut out = Vec::new();
        for item in items {
            if let Some(inner) = item.as_list() {
                if is_unquote_splicing(inner) {
                    // splice marker preserved literally; the analyzer's
                    // Quote emission flattens it at IR-build time once it
                    // can evaluate the spliced expression.
                    out.push(Form::List(
                        Arc::from(vec![
                            Form::Symbol(Symbol::unqualified("unquote-splicing")),
                            inner[1].clone(),
                        ]),
                        None,
                    ));
                    continue;
                }
            }
            out.push(syntax_quote(item));
        }
        out
    }
    match form {
        Form::List(items, _meta) if is_unquote(items) => items[1].clone(),
        Form::List(items, meta) => {
            Form::List(Arc::from(expand_seq(items)), meta.clone())
        }
        Form::Vector(items, meta) => Form::Vector(Arc::from(expand_seq(items)), meta.clone()),
        Form::Map(pairs, meta) => Form::Map(
            Arc::from(
                pairs
                    .iter()
                    .map(|(k, v)| (syntax_quote(k), syntax_quote(v)))
                    .collect::<Vec<_>>(),
            ),
            meta.clone(),
        ),
        Form::Set(items, meta) => Form::Set(Arc::from(expand_seq(items)), meta.clone()),
        _ => form.clone(),
    }
}

fn same_shape(a: &Form, b: &Form) -> bool {
    format!("{a}") == format!("{b}")
}

/// `(defmacro name [params...] body...)` registration, called from the
/// analyzer's special-form dispatch for `defmacro`.
pub fn register_defmacro(
    mgr: &NamespaceManager,
    expander: &MacroExpander,
    items: &[Form],
) -> Result<()> {
    let Some(name_sym) = items.get(1).and_then(Form::as_symbol) else {
        bail!("defmacro requires a name symbol")
    };
    let Some(param_vec) = items.get(2).and_then(|f| match f {
        Form::Vector(v, _) => Some(v),
        _ => None,
    }) else {
        bail!("defmacro requires a parameter vector")
    };
    let mut params = Vec::new();
    let mut rest_param = None;
    let mut in_rest = false;
    for p in param_vec.iter() {
        let sym = p.as_symbol().ok_or_else(|| anyhow::anyhow!("macro params must be symbols"))?;
        if sym.ns.is_none() && sym.name.as_str() == "&" {
            in_rest = true;
            continue;
        }
        if in_rest {
            rest_param = Some(sym.clone());
        } else {
            params.push(sym.clone());
        }
    }
    let body = items[3..].to_vec();
    expander.register(
        &mgr.current(),
        MacroDef { name: Arc::from(name_sym.name.as_str()), params, rest_param, body },
    );
    mgr.define_var(&name_sym.name, crate::ns::VarInfo { is_public: true, is_macro: true, type_hint: None });
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn sym(name: &str) -> Form {
        Form::Symbol(Symbol::unqualified(name))
    }

    #[test]
    fn simple_macro_substitutes_params() {
        let expander = MacroExpander::new();
        expander.register(
            "user",
            MacroDef {
                name: Arc::from("unless"),
                params: vec![Symbol::unqualified("test"), Symbol::unqualified("then")],
                rest_param: None,
                body: vec![Form::List(
                    Arc::from(vec![sym("if"), sym("test"), Form::Nil, sym("then")]),
                    None,
                )],
            },
        );
        assert!(expander.is_macro("user", "unless"));
        let call = Form::List(
            Arc::from(vec![sym("unless"), Form::Bool(false), Form::Int(1)]),
            None,
        );
        let expanded = expander.macroexpand_1("user", &call).unwrap();
        assert_eq!(format!("{expanded}"), "(if false nil 1)");
    }

    #[test]
    fn qualified_symbol_head_is_never_a_macro_call() {
        let expander = MacroExpander::new();
        expander.register(
            "user",
            MacroDef { name: Arc::from("m"), params: vec![], rest_param: None, body: vec![Form::Nil] },
        );
        let call = Form::List(
            Arc::from(vec![Form::Symbol(Symbol::new(Some("other"), "m"))]),
            None,
        );
        let expanded = expander.macroexpand_1("user", &call).unwrap();
        assert_eq!(format!("{expanded}"), format!("{call}"));
    }

    #[test]
    fn syntax_quote_unwraps_unquote() {
        let form = Form::List(
            Arc::from(vec![
                sym("unquote"),
                sym("x"),
            ]),
            None,
        );
        let q = syntax_quote(&form);
        assert_eq!(format!("{q}"), "x");
    }
}
