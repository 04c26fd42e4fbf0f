//! Host-source emitter: walks the IR and prints host-language
//! text. Grounded on `graphix-compiler`'s own code-generation pass over
//! `node::Node` (an enum dispatch mirroring the emitted context the node
//! sits in), generalized from that crate's single expression-oriented
//! target to the Statement/Expression/Return distinction a target
//! language with exceptions, `return`, and void methods requires.

pub mod interop;
pub mod protocols;
pub mod quote;
pub mod test_harness;

use crate::{
    errors::EmitterError,
    ir::{CompilationUnit, Expr, ExprKind},
    ns::mangle_namespace,
};
use anyhow::Result;
use arcstr::ArcStr;
use fxhash::FxHashSet;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::sync::LazyLock;

/// Where in the surrounding host syntax this node is being printed: as a
/// standalone statement (ignoring its value), as a value-producing
/// subexpression, or in tail/return position of a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitContext {
    Statement,
    Expression,
    Return,
}

/// Direct codegen emits static members the host compiler binds at compile
/// time; Var-indirected codegen routes every top-level reference through
/// the runtime Var registry so a running process can observe a redefinition
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenFlavor {
    Direct,
    VarIndirected,
}

/// Orthogonal to `CodegenFlavor`: file mode compiles a
/// whole unit into a namespace/class; REPL mode emits one expression as a
/// free-standing script fragment, indirecting otherwise-direct invocations
/// of non-core vars through the Var registry and routing `deftest`/`is`
/// through a thread-local result collector instead of the test framework's
/// `[Fact]` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    File,
    Repl,
}

/// Unqualified core-function names the emitter is allowed to print as a
/// direct host call instead of going through generic `Invoke` dispatch
/// machinery (a tunable deny/allow policy, not a fixed IR concept — an
/// embedding host is free to replace this set). Kept small and explicit
/// rather than inferred, the way `graphix-compiler`'s own stdlib
/// registration lists are explicit tables rather than derived from
/// reflection.
static CORE_ALLOWLIST: LazyLock<FxHashSet<&'static str>> = LazyLock::new(|| {
    [
        "not", "inc", "dec", "conj", "assoc", "dissoc", "get", "count", "first", "rest", "next",
        "seq", "cons", "nth", "str", "identity", "swap!", "reset!", "deref", "reduce", "map",
        "filter", "into", "vec", "list", "hash-map", "hash-set",
    ]
    .into_iter()
    .collect()
});

/// Host reserved words the mangled identifier table must never collide
/// with. A generic, language-agnostic C-family keyword set,
/// since the concrete target is deliberately left abstract.
static RESERVED_WORDS: LazyLock<FxHashSet<&'static str>> = LazyLock::new(|| {
    [
        "class", "interface", "namespace", "using", "static", "void", "int", "long", "float",
        "double", "bool", "string", "object", "new", "return", "if", "else", "for", "while", "do",
        "try", "catch", "finally", "throw", "public", "private", "protected", "internal",
        "override", "virtual", "abstract", "sealed", "base", "this", "null", "true", "false",
        "async", "await", "var", "const", "enum", "struct", "record", "is", "as", "in", "out",
        "ref", "params", "default", "switch", "case", "break", "continue", "goto", "lock",
    ]
    .into_iter()
    .collect()
});

/// Whole-symbol operator names map to a single fixed token,
/// rather than being built up character-by-character: `-` alone is
/// `_MINUS_`, but the `-` inside `my-var` is the per-character `_`
/// substitution below. Checked before the per-character pass.
fn mangle_whole_operator(name: &str) -> Option<&'static str> {
    Some(match name {
        "+" => "_PLUS_",
        "-" => "_MINUS_",
        "*" => "_STAR_",
        "/" => "_SLASH_",
        "<" => "_LT_",
        ">" => "_GT_",
        "<=" => "_LT__EQ_",
        ">=" => "_GT__EQ_",
        "=" => "_EQ_",
        "!=" => "_BANG__EQ_",
        _ => return None,
    })
}

/// Per-character substitution table: characters that can't
/// appear in a host identifier are each replaced with a fixed token.
fn mangle_char(c: char) -> Option<&'static str> {
    Some(match c {
        '-' => "_",
        '?' => "_QMARK_",
        '!' => "_BANG_",
        '*' => "_STAR_",
        '+' => "_PLUS_",
        '<' => "_LT_",
        '>' => "_GT_",
        '=' => "_EQ_",
        '\'' => "_QUOTE_",
        '/' => "_SLASH_",
        '%' => "_PERCENT_",
        '&' => "_AMP_",
        '.' => "_DOT_",
        ':' => "_COLON_",
        _ => return None,
    })
}

/// Mangles a dialect identifier into a legal host identifier. A name that
/// is exactly one of the recognized operator symbols maps to its fixed
/// whole-token spelling; otherwise every non-alphanumeric, non-underscore
/// character is replaced one at a time via `mangle_char`. A name that
/// collides with a host reserved word is escaped with a trailing
/// underscore.
pub fn mangle_identifier(name: &str) -> String {
    if let Some(whole) = mangle_whole_operator(name) {
        return whole.to_string();
    }
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if let Some(sub) = mangle_char(c) {
            out.push_str(sub);
        } else {
            let _ = write!(out, "_U{:04X}_", c as u32);
        }
    }
    if out.is_empty() || out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if RESERVED_WORDS.contains(out.as_str()) {
        out.push('_');
    }
    out
}

pub struct Emitter {
    pub flavor: CodegenFlavor,
    pub mode: EmitMode,
    /// Alias -> real-namespace table for the unit currently being emitted
    ///,
    /// populated by `emit_unit` before walking the unit's expressions.
    /// `RefCell` rather than threading it through every recursive
    /// `emit_expr` call, since it's write-once-per-unit, read-many.
    aliases: RefCell<IndexMap<ArcStr, ArcStr>>,
    /// Stack of enclosing `loop`/`fn`-method binding names, innermost last.
    /// A `Recur` writes its captured temporaries back onto
    /// `recur_targets.last()` before `continue`; pushed/popped symmetrically
    /// around body emission in `emit_let`'s loop case and in
    /// `emit_method_body`.
    recur_targets: RefCell<Vec<Vec<String>>>,
}

impl Emitter {
    pub fn new(flavor: CodegenFlavor) -> Self {
        Emitter {
            flavor,
            mode: EmitMode::File,
            aliases: RefCell::new(IndexMap::new()),
            recur_targets: RefCell::new(Vec::new()),
        }
    }

    /// Switches this emitter to REPL mode. Consuming
    /// builder rather than a constructor parameter so the common file-mode
    /// construction stays a one-argument call.
    pub fn repl(mut self) -> Self {
        self.mode = EmitMode::Repl;
        self
    }

    fn is_core_allowed(&self, name: &str) -> bool {
        CORE_ALLOWLIST.contains(name)
    }

    /// Resolves a qualifier that may be an alias to the real Clojure
    /// namespace it was `require`d under. A qualifier that isn't a known alias (a fully-dotted
    /// namespace referenced without `:as`) passes through unchanged.
    fn resolve_ns_alias<'a>(&self, ns: &'a str) -> std::borrow::Cow<'a, str> {
        match self.aliases.borrow().get(ns) {
            Some(real) => std::borrow::Cow::Owned(real.to_string()),
            None => std::borrow::Cow::Borrowed(ns),
        }
    }

    /// Emits a full compilation unit: `using` prelude (runtime namespaces,
    /// the test framework when tests are present, and a `using` per
    /// required namespace/alias), then namespace/class prelude, then every
    /// top-level form as a statement in the synthesized static
    /// initializer/class body.
    pub fn emit_unit(&self, unit: &CompilationUnit) -> Result<String> {
        *self.aliases.borrow_mut() = unit.requires.clone();
        let (namespace, class_name) = mangle_namespace(unit.ns.as_deref().unwrap_or("user"));
        let mut out = String::new();
        writeln!(out, "// generated — do not edit by hand").ok();
        writeln!(out, "using Cljc.Runtime.Collections;").ok();
        writeln!(out, "using Cljc.Runtime.Core;").ok();
        writeln!(out, "using Cljc.Runtime.Vars;").ok();
        if unit.has_tests {
            writeln!(out, "using Xunit;").ok();
        }
        for (alias, target) in &unit.requires {
            if alias.as_str() == target.as_str() {
                let (req_ns, _) = mangle_namespace(target);
                writeln!(out, "using {req_ns};").ok();
            } else {
                let (req_ns, req_class) = mangle_namespace(target);
                writeln!(out, "using {} = {req_ns}.{req_class};", mangle_identifier(alias)).ok();
            }
        }
        writeln!(out).ok();
        writeln!(out, "namespace {namespace};").ok();
        writeln!(out).ok();
        writeln!(out, "public static class {class_name}").ok();
        writeln!(out, "{{").ok();
        for expr in &unit.exprs {
            let text = self.emit_expr(expr, EmitContext::Statement)?;
            for line in text.lines() {
                writeln!(out, "    {line}").ok();
            }
        }
        if unit.has_tests {
            writeln!(out).ok();
            out.push_str(&test_harness::emit_test_class_prelude(&class_name));
        }
        writeln!(out, "}}").ok();
        Ok(out)
    }

    pub fn emit_expr(&self, expr: &Expr, ctx: EmitContext) -> Result<String> {
        match &expr.kind {
            ExprKind::Literal(form) => Ok(self.emit_literal(form, ctx)),
            ExprKind::SymbolRef { name, is_local } => Ok(self.emit_symbol_ref(name, *is_local, ctx)),
            ExprKind::KeywordRef(k) => Ok(self.statement_wrap(quote::emit_keyword(k), ctx)),
            ExprKind::VectorLit(items) => self.emit_collection_lit("PersistentVector.Create", items, ctx),
            ExprKind::SetLit(items) => self.emit_collection_lit("PersistentHashSet.Create", items, ctx),
            ExprKind::MapLit(pairs) => self.emit_map_lit(pairs, ctx),
            ExprKind::Def { name, init, type_hint, .. } => self.emit_def(name, init.as_deref(), type_hint.as_ref(), ctx),
            ExprKind::Fn(f) => self.emit_fn(f, ctx),
            ExprKind::Let { bindings, body } => self.emit_let(bindings, body, ctx, false),
            ExprKind::Loop { bindings, body } => self.emit_let(bindings, body, ctx, true),
            ExprKind::Do(exprs) => self.emit_do(exprs, ctx),
            ExprKind::If { test, then, els } => self.emit_if(test, then, els.as_deref(), ctx),
            ExprKind::Invoke { func, args } => self.emit_invoke(func, args, ctx),
            ExprKind::InstanceMethod { target, name, args, type_args } => {
                interop::emit_instance_method(self, target, name, args, type_args, ctx)
            }
            ExprKind::StaticMethod { type_name, name, args, type_args } => {
                interop::emit_static_method(self, type_name, name, args, type_args, ctx)
            }
            ExprKind::InstanceProperty { target, name } => interop::emit_instance_property(self, target, name, ctx),
            ExprKind::StaticProperty { type_name, name } => {
                Ok(self.statement_wrap(format!("{}.{}", type_name.0, name), ctx))
            }
            ExprKind::New { type_name, args } => interop::emit_new(self, type_name, args, ctx),
            ExprKind::Cast { type_name, inner } => interop::emit_cast(self, type_name, inner, ctx),
            ExprKind::Assign { target, value } => self.emit_assign(target, value, ctx),
            ExprKind::Throw(inner) => self.emit_throw(inner, ctx),
            ExprKind::Try { body, catches, finally } => self.emit_try(body, catches, finally.as_deref(), ctx),
            ExprKind::Recur(args) => self.emit_recur(args, ctx),
            ExprKind::Await(inner) => self.emit_await(inner, ctx),
            ExprKind::Quote(form) => Ok(self.statement_wrap(quote::emit_quote(form), ctx)),
            ExprKind::PrimitiveOp { operator, operands, .. } => self.emit_primitive_op(*operator, operands, ctx),
            ExprKind::Ns(_) | ExprKind::InNs(_) | ExprKind::Require(_) => Ok(String::new()),
            ExprKind::RawHost { template, interpolations } => self.emit_raw_host(template, interpolations, ctx),
            ExprKind::Defprotocol(p) => Ok(protocols::emit_protocol(self, p)),
            ExprKind::Deftype(t) => protocols::emit_type_body(self, t, false),
            ExprKind::Defrecord(t) => protocols::emit_type_body(self, t, true),
            ExprKind::Deftest(t) => test_harness::emit_test(self, t),
            ExprKind::Is(inner) => test_harness::emit_is(self, inner, ctx),
            ExprKind::InstanceCheck { typ, value } => {
                let v = self.emit_expr(value, EmitContext::Expression)?;
                Ok(self.statement_wrap(format!("({v} is {})", typ.0), ctx))
            }
        }
    }

    /// Wraps a bare expression string for statement position (adds `;`) or
    /// return position (prepends `return`); expression position passes
    /// through unchanged.
    pub fn statement_wrap(&self, expr_text: String, ctx: EmitContext) -> String {
        match ctx {
            EmitContext::Expression => expr_text,
            EmitContext::Statement => format!("{expr_text};"),
            EmitContext::Return => format!("return {expr_text};"),
        }
    }

    fn emit_literal(&self, form: &crate::form::Form, ctx: EmitContext) -> String {
        use crate::form::Form;
        let text = match form {
            Form::Nil => "null".to_string(),
            Form::Bool(b) => b.to_string(),
            Form::Int(i) => i.to_string(),
            Form::Float(x) => format!("{x}d"),
            Form::Decimal(d) => format!("{d}m"),
            Form::Char(c) => format!("'{c}'"),
            Form::String(s) => format!("{s:?}"),
            other => quote::emit_quote(other),
        };
        self.statement_wrap(text, ctx)
    }

    fn emit_symbol_ref(&self, name: &crate::form::Symbol, is_local: bool, ctx: EmitContext) -> String {
        let text = if is_local {
            mangle_identifier(&name.name)
        } else {
            match self.flavor {
                CodegenFlavor::Direct => match &name.ns {
                    Some(ns) => {
                        let real_ns = self.resolve_ns_alias(ns);
                        let (namespace, class) = mangle_namespace(&real_ns);
                        format!("{namespace}.{class}.{}", mangle_identifier(&name.name))
                    }
                    None => mangle_identifier(&name.name),
                },
                CodegenFlavor::VarIndirected => {
                    let ns = name.ns.as_ref().map(|ns| self.resolve_ns_alias(ns)).unwrap_or(std::borrow::Cow::Borrowed("user"));
                    format!("VarRegistry.Intern(\"{ns}\", \"{}\").Deref()", name.name)
                }
            }
        };
        self.statement_wrap(text, ctx)
    }

    fn emit_collection_lit(&self, ctor: &str, items: &[triomphe::Arc<Expr>], ctx: EmitContext) -> Result<String> {
        let parts = items
            .iter()
            .map(|e| self.emit_expr(e, EmitContext::Expression))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.statement_wrap(format!("{ctor}({})", parts.join(", ")), ctx))
    }

    fn emit_map_lit(&self, pairs: &[(triomphe::Arc<Expr>, triomphe::Arc<Expr>)], ctx: EmitContext) -> Result<String> {
        let mut parts = Vec::new();
        for (k, v) in pairs {
            parts.push(self.emit_expr(k, EmitContext::Expression)?);
            parts.push(self.emit_expr(v, EmitContext::Expression)?);
        }
        Ok(self.statement_wrap(format!("PersistentHashMap.Create({})", parts.join(", ")), ctx))
    }

    /// `def` always compiles to a class-level member declaration; the
    /// surrounding `ctx` is irrelevant (a `def` is never itself a value an
    /// enclosing expression consumes). A `Fn`-valued init routes to
    /// `emit_def_fn` instead of the scalar-field path: a top-level function
    /// def becomes a method (or a Var-bound dispatch lambda plus typed
    /// wrappers), never a field holding a closure.
    fn emit_def(&self, name: &str, init: Option<&Expr>, type_hint: Option<&crate::ir::HostType>, _ctx: EmitContext) -> Result<String> {
        if let Some(Expr { kind: ExprKind::Fn(f), .. }) = init {
            return self.emit_def_fn(name, f);
        }
        let mangled = mangle_identifier(name);
        let host_type = type_hint.map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string());
        let init_text = match init {
            Some(e) => self.emit_expr(e, EmitContext::Expression)?,
            None => "null".to_string(),
        };
        let text = match self.flavor {
            CodegenFlavor::Direct => format!("public static readonly {host_type} {mangled} = {init_text}"),
            CodegenFlavor::VarIndirected => {
                format!("VarRegistry.Intern(\"user\", \"{name}\").BindRoot({init_text})")
            }
        };
        Ok(self.statement_wrap(text, EmitContext::Statement))
    }

    /// An anonymous/inline `fn` value. Always lowers to a single dispatching
    /// lambda over a packed `object[]` — the shape a value-producing
    /// expression can hand off to `Invoker.Invoke`/a Var's `BindRoot`,
    /// since a host expression position can't hold a set of method
    /// overloads the way a top-level def can.
    fn emit_fn(&self, f: &crate::ir::Fn_, ctx: EmitContext) -> Result<String> {
        let lambda = self.emit_dispatch_lambda(f)?;
        Ok(self.statement_wrap(format!("(Func<object[], object>){lambda}"), ctx))
    }

    /// Top-level named-function def. `Direct` binds arity overloads as
    /// static methods the host compiler resolves at compile time.
    /// `VarIndirected` binds a single dispatching lambda as the Var's root
    /// (so a redefinition is observed immediately) and additionally emits
    /// one typed public wrapper per arity, matching the declared param
    /// types, so direct call sites keep a normal typed call shape instead
    /// of having to pack `object[]` themselves.
    fn emit_def_fn(&self, name: &str, f: &crate::ir::Fn_) -> Result<String> {
        let mangled = mangle_identifier(name);
        match self.flavor {
            CodegenFlavor::Direct => {
                let mut methods = Vec::new();
                for method in &f.methods {
                    methods.push(self.emit_method_static(&mangled, method, f.is_async)?);
                }
                Ok(methods.join("\n\n"))
            }
            CodegenFlavor::VarIndirected => {
                let lambda = self.emit_dispatch_lambda(f)?;
                let mut out = String::new();
                writeln!(
                    out,
                    "VarRegistry.Intern(\"user\", \"{name}\").BindRoot((Func<object[], object>){lambda});"
                )
                .ok();
                for method in &f.methods {
                    let (params, names) = self.fn_method_params(method);
                    let return_type =
                        method.return_type.as_ref().map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string());
                    let call_args = names.join(", ");
                    writeln!(out, "public static {return_type} {mangled}({params})").ok();
                    writeln!(out, "{{").ok();
                    writeln!(
                        out,
                        "    return ({return_type})VarRegistry.Intern(\"user\", \"{name}\").Invoke({call_args});"
                    )
                    .ok();
                    writeln!(out, "}}").ok();
                }
                Ok(out)
            }
        }
    }

    /// Builds a method's parameter list text (`"long a, long b"`, with a
    /// trailing `params object[] rest` for a variadic method) alongside the
    /// mangled parameter names in positional order, so the same name list
    /// can both declare the method and forward-call it elsewhere.
    fn fn_method_params(&self, method: &crate::ir::FnMethod) -> (String, Vec<String>) {
        let mut parts = Vec::new();
        let mut names = Vec::new();
        for (i, p) in method.fixed_params.iter().enumerate() {
            let t = method
                .param_types
                .as_ref()
                .and_then(|ts| ts.get(i).cloned().flatten())
                .map(|t| t.0.to_string())
                .unwrap_or_else(|| "object".to_string());
            let mangled = mangle_identifier(p);
            parts.push(format!("{t} {mangled}"));
            names.push(mangled);
        }
        if let Some(rest) = &method.rest_param {
            let mangled = mangle_identifier(rest);
            parts.push(format!("params object[] {mangled}"));
            names.push(mangled);
        }
        (parts.join(", "), names)
    }

    /// Emits a method/case body in return position, pushing `param_names`
    /// onto `recur_targets` only if the body can actually reach a tail
    /// `Recur` directly (not through a nested `loop`, which manages its own
    /// target), and wrapping the body in `while (true) { ... }` in that
    /// case. The push/pop is symmetric around the fallible emit call so an
    /// early `?` return never leaves a stale frame on the stack.
    fn emit_method_body(&self, param_names: &[String], body: &Expr) -> Result<String> {
        let recurs = body.contains_recur_in_tail();
        if recurs {
            self.recur_targets.borrow_mut().push(param_names.to_vec());
        }
        let body_result = self.emit_expr(body, EmitContext::Return);
        if recurs {
            self.recur_targets.borrow_mut().pop();
        }
        let body_text = body_result?;
        if !recurs {
            return Ok(body_text);
        }
        let mut out = String::new();
        writeln!(out, "while (true)").ok();
        writeln!(out, "{{").ok();
        for line in body_text.lines() {
            writeln!(out, "    {line}").ok();
        }
        writeln!(out, "}}").ok();
        Ok(out)
    }

    /// One `Direct`-flavor arity overload: a plain static method, its body
    /// wrapped for `Recur` the same way `emit_dispatch_lambda`'s cases are.
    fn emit_method_static(&self, mangled_name: &str, method: &crate::ir::FnMethod, is_async: bool) -> Result<String> {
        let (params, names) = self.fn_method_params(method);
        let return_type = method.return_type.as_ref().map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string());
        let body = self.emit_method_body(&names, &method.body)?;
        let async_kw = if is_async { "async " } else { "" };
        let mut out = String::new();
        writeln!(out, "{async_kw}public static {return_type} {mangled_name}({params})").ok();
        writeln!(out, "{{").ok();
        for line in body.lines() {
            writeln!(out, "    {line}").ok();
        }
        writeln!(out, "}}").ok();
        Ok(out.trim_end().to_string())
    }

    /// A single lambda over a packed `object[] args` that switches on
    /// `args.Length` to the matching method, re-casting each positional
    /// argument to its declared type. Backs both an anonymous `fn` value
    /// and a `VarIndirected` top-level def's `BindRoot` target — the shape
    /// the runtime's `Var::invoke`/`Invoker.Invoke` contract expects:
    /// "Multi-arity functions bind a single dispatching lambda that
    /// switches on argument count." A variadic method's case matches any
    /// length at or above its fixed arity via a relational pattern; an
    /// arity nothing matches throws, naming every arity the function
    /// actually supports.
    fn emit_dispatch_lambda(&self, f: &crate::ir::Fn_) -> Result<String> {
        let mut cases = String::new();
        let mut arities = Vec::new();
        for method in &f.methods {
            let arity = method.fixed_params.len();
            let is_variadic = method.rest_param.is_some();
            arities.push(if is_variadic { format!("{arity}+") } else { arity.to_string() });
            let mut locals = String::new();
            for (i, p) in method.fixed_params.iter().enumerate() {
                let t = method
                    .param_types
                    .as_ref()
                    .and_then(|ts| ts.get(i).cloned().flatten())
                    .map(|t| t.0.to_string())
                    .unwrap_or_else(|| "object".to_string());
                writeln!(locals, "{t} {} = ({t})args[{i}];", mangle_identifier(p)).ok();
            }
            let mut names: Vec<String> = method.fixed_params.iter().map(|p| mangle_identifier(p)).collect();
            if let Some(rest) = &method.rest_param {
                let mangled = mangle_identifier(rest);
                writeln!(locals, "object[] {mangled} = args[{arity}..];").ok();
                names.push(mangled);
            }
            let body = self.emit_method_body(&names, &method.body)?;
            let label = if is_variadic { format!("case >= {arity}:") } else { format!("case {arity}:") };
            writeln!(cases, "{label}").ok();
            writeln!(cases, "{{").ok();
            for line in locals.lines() {
                writeln!(cases, "    {line}").ok();
            }
            for line in body.lines() {
                writeln!(cases, "    {line}").ok();
            }
            writeln!(cases, "}}").ok();
        }
        let supported = arities.join(", ");
        writeln!(cases, "default:").ok();
        writeln!(
            cases,
            "    throw new System.ArgumentException($\"no matching arity for {{args.Length}} args; supported arities: {supported}\");"
        )
        .ok();
        let mut out = String::new();
        writeln!(out, "(object[] args) =>").ok();
        writeln!(out, "{{").ok();
        writeln!(out, "    switch (args.Length)").ok();
        writeln!(out, "    {{").ok();
        for line in cases.lines() {
            writeln!(out, "        {line}").ok();
        }
        writeln!(out, "    }}").ok();
        writeln!(out, "}}").ok();
        Ok(out.trim_end().to_string())
    }

    /// True when `expr`'s emitted form might be a void host expression —
    /// an instance/static method call, raw host interop, or an
    /// `is`-assertion, or a `do` whose last expression is one of those
    ///.
    fn maybe_void(expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::InstanceMethod { .. } | ExprKind::StaticMethod { .. } | ExprKind::RawHost { .. } | ExprKind::Is(_) => true,
            ExprKind::Do(exprs) => exprs.last().is_some_and(|e| Self::maybe_void(&**e)),
            _ => false,
        }
    }

    fn emit_let(&self, bindings: &[(compact_str::CompactString, triomphe::Arc<Expr>)], body: &Expr, ctx: EmitContext, is_loop: bool) -> Result<String> {
        let mut stmts = Vec::new();
        let mut binding_names = Vec::new();
        for (name, init) in bindings {
            let init_text = self.emit_expr(init, EmitContext::Expression)?;
            let mangled = mangle_identifier(name);
            if name.as_str() == "_" {
                stmts.push(format!("_ = {init_text};"));
            } else {
                let t = init.inferred_type.as_ref().map(|t| t.0.to_string()).unwrap_or_else(|| "var".to_string());
                stmts.push(format!("{t} {mangled} = {init_text};"));
            }
            binding_names.push(mangled);
        }
        let void_tail = ctx == EmitContext::Expression && Self::maybe_void(body);
        let body_ctx = match ctx {
            EmitContext::Statement => EmitContext::Statement,
            EmitContext::Return => EmitContext::Return,
            EmitContext::Expression if void_tail => EmitContext::Statement,
            EmitContext::Expression => EmitContext::Return,
        };
        // A loop's locals double as its recur targets; pushed/popped
        // around the (fallible) body emission so a `Recur` inside can
        // write its captured temporaries back onto them before `continue`.
        let is_recur_loop = is_loop && body.contains_recur_in_tail();
        if is_recur_loop {
            self.recur_targets.borrow_mut().push(binding_names);
        }
        let body_result = self.emit_expr(body, body_ctx);
        if is_recur_loop {
            self.recur_targets.borrow_mut().pop();
        }
        let body_text = body_result?;
        let mut block = String::new();
        for s in &stmts {
            writeln!(block, "    {s}").ok();
        }
        if is_recur_loop {
            writeln!(block, "    while (true)").ok();
            writeln!(block, "    {{").ok();
            for line in body_text.lines() {
                writeln!(block, "        {line}").ok();
            }
            writeln!(block, "        break;").ok();
            writeln!(block, "    }}").ok();
        } else {
            for line in body_text.lines() {
                writeln!(block, "    {line}").ok();
            }
            if void_tail {
                writeln!(block, "    return null;").ok();
            }
        }
        if ctx == EmitContext::Statement {
            Ok(format!("{{\n{block}}}"))
        } else {
            Ok(format!("(/* let */ () => {{\n{block}}})()"))
        }
    }

    fn emit_do(&self, exprs: &[triomphe::Arc<Expr>], ctx: EmitContext) -> Result<String> {
        if exprs.is_empty() {
            return Ok(self.statement_wrap("null".to_string(), ctx));
        }
        let mut lines = Vec::new();
        for (i, e) in exprs.iter().enumerate() {
            let is_last = i + 1 == exprs.len();
            let sub_ctx = if is_last { ctx } else { EmitContext::Statement };
            lines.push(self.emit_expr(e, sub_ctx)?);
        }
        if ctx == EmitContext::Expression {
            Ok(format!("(/* do */ () => {{\n{}\n}})()", lines.join("\n")))
        } else {
            Ok(lines.join("\n"))
        }
    }

    fn emit_if(&self, test: &Expr, then: &Expr, els: Option<&Expr>, ctx: EmitContext) -> Result<String> {
        let test_text = self.emit_expr(test, EmitContext::Expression)?;
        let truthy = format!("Truthiness.IsTruthy({test_text})");
        match ctx {
            EmitContext::Expression => {
                let then_text = self.emit_expr(then, EmitContext::Expression)?;
                let else_text = match els {
                    Some(e) => self.emit_expr(e, EmitContext::Expression)?,
                    None => "null".to_string(),
                };
                Ok(format!("({truthy} ? {then_text} : {else_text})"))
            }
            _ => {
                let then_text = self.emit_expr(then, ctx)?;
                let else_text = match els {
                    Some(e) => self.emit_expr(e, ctx)?,
                    None => self.statement_wrap("null".to_string(), ctx),
                };
                Ok(format!(
                    "if ({truthy})\n{{\n    {then_text}\n}}\nelse\n{{\n    {else_text}\n}}"
                ))
            }
        }
    }

    fn emit_invoke(&self, func: &Expr, args: &[triomphe::Arc<Expr>], ctx: EmitContext) -> Result<String> {
        let arg_texts = args
            .iter()
            .map(|a| self.emit_expr(a, EmitContext::Expression))
            .collect::<Result<Vec<_>>>()?;
        // REPL mode: an unqualified non-local head
        // that isn't core-allowlisted goes through the Var registry so a
        // REPL session always observes the latest `def`, instead of a
        // direct call baked in at compile time.
        if self.mode == EmitMode::Repl {
            if let ExprKind::SymbolRef { name, is_local: false } = &func.kind {
                if !self.is_core_allowed(&name.name) {
                    let ns = name.ns.as_ref().map(|ns| self.resolve_ns_alias(ns)).unwrap_or(std::borrow::Cow::Borrowed("user"));
                    let call = format!(
                        "VarRegistry.Intern(\"{ns}\", \"{}\").Invoke({})",
                        name.name,
                        arg_texts.join(", ")
                    );
                    return Ok(self.statement_wrap(call, ctx));
                }
            }
        }
        let callee = if let ExprKind::SymbolRef { name, is_local: false } = &func.kind {
            if self.is_core_allowed(&name.name) {
                format!("Core.{}", mangle_identifier(&name.name))
            } else {
                self.emit_expr(func, EmitContext::Expression)?
            }
        } else {
            self.emit_expr(func, EmitContext::Expression)?
        };
        let call = if matches!(&func.kind, ExprKind::SymbolRef { is_local: false, .. }) {
            format!("{callee}({})", arg_texts.join(", "))
        } else {
            format!("Invoker.Invoke({callee}, {})", arg_texts.join(", "))
        };
        Ok(self.statement_wrap(call, ctx))
    }

    fn emit_assign(&self, target: &Expr, value: &Expr, ctx: EmitContext) -> Result<String> {
        let t = self.emit_expr(target, EmitContext::Expression)?;
        let v = self.emit_expr(value, EmitContext::Expression)?;
        Ok(self.statement_wrap(format!("{t} = {v}"), ctx))
    }

    fn emit_throw(&self, inner: &Expr, ctx: EmitContext) -> Result<String> {
        let v = self.emit_expr(inner, EmitContext::Expression)?;
        Ok(match ctx {
            EmitContext::Expression => format!("(/* throw */ () => throw {v})()"),
            _ => format!("throw {v};"),
        })
    }

    fn emit_try(&self, body: &Expr, catches: &[crate::ir::TryCatch], finally: Option<&Expr>, ctx: EmitContext) -> Result<String> {
        let body_text = self.emit_expr(body, if ctx == EmitContext::Expression { EmitContext::Return } else { ctx })?;
        let mut out = format!("try\n{{\n    {body_text}\n}}\n");
        for c in catches {
            let catch_text = self.emit_expr(&c.body, if ctx == EmitContext::Expression { EmitContext::Return } else { ctx })?;
            writeln!(out, "catch ({} {})\n{{\n    {catch_text}\n}}", c.ex_type.0, mangle_identifier(&c.binding)).ok();
        }
        if let Some(f) = finally {
            let finally_text = self.emit_expr(f, EmitContext::Statement)?;
            writeln!(out, "finally\n{{\n    {finally_text}\n}}").ok();
        }
        if ctx == EmitContext::Expression {
            Ok(format!("(/* try */ (Func<object>)(() => {{\n{out}\n}}))()"))
        } else {
            Ok(out)
        }
    }

    /// Captures each recur argument into a fresh `__recur_{i}` temporary
    /// first, then assigns the temporaries back onto the enclosing
    /// `loop`/`fn`-method's locals, then `continue`s — in that order, so a
    /// binding that reads another binding's old value (`(recur i (+ i acc))`)
    /// never observes a partially-updated set of locals.
    fn emit_recur(&self, args: &[triomphe::Arc<Expr>], ctx: EmitContext) -> Result<String> {
        let arg_texts = args.iter().map(|a| self.emit_expr(a, EmitContext::Expression)).collect::<Result<Vec<_>>>()?;
        let targets = self.recur_targets.borrow().last().cloned().unwrap_or_default();
        let mut stmts = Vec::new();
        for (i, a) in arg_texts.iter().enumerate() {
            stmts.push(format!("var __recur_{i} = {a};"));
        }
        for (i, target) in targets.iter().enumerate() {
            if i < arg_texts.len() {
                stmts.push(format!("{target} = __recur_{i};"));
            }
        }
        stmts.push("continue;".to_string());
        Ok(self.statement_wrap(format!("{{ {} }}", stmts.join(" ")), ctx))
    }

    fn emit_await(&self, inner: &Expr, ctx: EmitContext) -> Result<String> {
        let v = self.emit_expr(inner, EmitContext::Expression)?;
        Ok(self.statement_wrap(format!("await {v}"), ctx))
    }

    fn emit_primitive_op(&self, operator: crate::ir::PrimitiveOperator, operands: &[triomphe::Arc<Expr>], ctx: EmitContext) -> Result<String> {
        let texts = operands.iter().map(|o| self.emit_expr(o, EmitContext::Expression)).collect::<Result<Vec<_>>>()?;
        let token = operator.host_token();
        let joined = texts.join(&format!(" {token} "));
        Ok(self.statement_wrap(format!("({joined})"), ctx))
    }

    fn emit_raw_host(&self, template: &str, interpolations: &[(arcstr::ArcStr, triomphe::Arc<Expr>)], ctx: EmitContext) -> Result<String> {
        let mut text = template.to_string();
        for (name, expr) in interpolations {
            let rendered = self.emit_expr(expr, EmitContext::Expression)?;
            text = text.replace(&format!("~{{{name}}}"), &rendered);
        }
        Ok(self.statement_wrap(text, ctx))
    }

    /// Emits `EmitterError`'s parseable fallback instead of bubbling a hard
    /// failure through to the caller, when an IR shape the emitter doesn't
    /// (yet) understand reaches it.
    pub fn emit_unreachable(&self, message: impl Into<String>, ctx: EmitContext) -> String {
        let err = EmitterError::new(message);
        self.statement_wrap(err.fallback_text(), ctx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::form::{Form, Symbol};

    #[test]
    fn mangles_operator_symbols() {
        assert_eq!(mangle_identifier("+"), "_PLUS_");
        assert_eq!(mangle_identifier("list?"), "list_QMARK_");
    }

    #[test]
    fn whole_symbol_minus_differs_from_embedded_hyphen() {
        assert_eq!(mangle_identifier("-"), "_MINUS_");
        assert_eq!(mangle_identifier("my-var"), "my_var");
    }

    #[test]
    fn mangling_is_injective_across_distinct_operators() {
        let mangled: Vec<String> =
            ["+", "-", "*", "/", "<", ">", "<=", ">=", "=", "!="].iter().map(|s| mangle_identifier(s)).collect();
        let unique: std::collections::HashSet<&String> = mangled.iter().collect();
        assert_eq!(unique.len(), mangled.len());
    }

    #[test]
    fn reserved_word_gets_escaped() {
        assert_eq!(mangle_identifier("class"), "class_");
    }

    #[test]
    fn literal_emission_in_statement_position_adds_semicolon() {
        let emitter = Emitter::new(CodegenFlavor::Direct);
        let text = emitter.emit_literal(&Form::Int(42), EmitContext::Statement);
        assert_eq!(text, "42;");
    }

    #[test]
    fn unqualified_local_symbol_emits_mangled_bare_name() {
        let emitter = Emitter::new(CodegenFlavor::Direct);
        let text = emitter.emit_symbol_ref(&Symbol::unqualified("my-var"), true, EmitContext::Expression);
        assert_eq!(text, "my_var");
    }

    #[test]
    fn var_indirected_global_ref_goes_through_registry() {
        let emitter = Emitter::new(CodegenFlavor::VarIndirected);
        let text = emitter.emit_symbol_ref(&Symbol::new(None, "x"), false, EmitContext::Expression);
        assert!(text.contains("VarRegistry"));
    }
}
