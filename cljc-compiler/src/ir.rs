//! The typed IR the analyzer produces and the emitter consumes.
//! Grounded on `graphix-compiler::expr::ExprKind` / `node::Node`: a flat,
//! non-recursive-by-reference tagged enum where every subexpression is
//! `Arc<Expr>`, and every variant carries an optional inferred type the way
//! `graphix-compiler`'s `node` layer attaches a resolved `Type` to each
//! compiled node.

use arcstr::ArcStr;
use compact_str::CompactString;
use indexmap::IndexMap;
use triomphe::Arc;

use crate::form::Form;

/// A host type name as the emitter will print it (after BCL-name
/// normalization). Opaque beyond that: the emitter owns the
/// table that knows how to print/cast it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostType(pub ArcStr);

impl HostType {
    pub fn named(s: &str) -> Self {
        HostType(ArcStr::from(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
}

impl PrimitiveType {
    /// Promotion-lattice rank: higher wins when combining two operand
    /// types.
    pub fn rank(self) -> u8 {
        match self {
            PrimitiveType::Float64 => 4,
            PrimitiveType::Float32 => 3,
            PrimitiveType::Decimal => 2,
            PrimitiveType::Int64 => 1,
            PrimitiveType::Int32 => 0,
        }
    }

    pub fn promote(a: PrimitiveType, b: PrimitiveType) -> PrimitiveType {
        if a.rank() >= b.rank() { a } else { b }
    }

    pub fn host_name(self) -> &'static str {
        match self {
            PrimitiveType::Int32 => "int",
            PrimitiveType::Int64 => "long",
            PrimitiveType::Float32 => "float",
            PrimitiveType::Float64 => "double",
            PrimitiveType::Decimal => "decimal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveOperator {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

impl PrimitiveOperator {
    pub fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "+" => PrimitiveOperator::Add,
            "-" => PrimitiveOperator::Sub,
            "*" => PrimitiveOperator::Mul,
            "/" => PrimitiveOperator::Div,
            "<" => PrimitiveOperator::Lt,
            ">" => PrimitiveOperator::Gt,
            "<=" => PrimitiveOperator::Le,
            ">=" => PrimitiveOperator::Ge,
            "=" => PrimitiveOperator::Eq,
            _ => return None,
        })
    }

    /// Maps the Clojure operator symbol to the host-level token:
    /// `=` becomes `==`.
    pub fn host_token(self) -> &'static str {
        match self {
            PrimitiveOperator::Add => "+",
            PrimitiveOperator::Sub => "-",
            PrimitiveOperator::Mul => "*",
            PrimitiveOperator::Div => "/",
            PrimitiveOperator::Lt => "<",
            PrimitiveOperator::Gt => ">",
            PrimitiveOperator::Le => "<=",
            PrimitiveOperator::Ge => ">=",
            PrimitiveOperator::Eq => "==",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FnMethod {
    pub fixed_params: Vec<CompactString>,
    pub rest_param: Option<CompactString>,
    pub param_types: Option<Vec<Option<HostType>>>,
    pub body: Arc<Expr>,
    pub return_type: Option<HostType>,
}

#[derive(Debug, Clone)]
pub struct Fn_ {
    pub name: Option<CompactString>,
    pub methods: Vec<FnMethod>,
    pub is_variadic: bool,
    pub is_async: bool,
}

#[derive(Debug, Clone)]
pub struct TryCatch {
    pub ex_type: HostType,
    pub binding: CompactString,
    pub body: Arc<Expr>,
}

#[derive(Debug, Clone)]
pub struct Protocol {
    pub name: CompactString,
    pub methods: Vec<(CompactString, Vec<Option<HostType>>, Option<HostType>)>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: CompactString,
    pub host_type: Option<HostType>,
    pub attrs: Vec<Form>,
}

#[derive(Debug, Clone)]
pub struct TypeBody {
    pub name: CompactString,
    pub fields: Vec<Field>,
    pub interfaces: Vec<HostType>,
    pub methods: Vec<(CompactString, FnMethod)>,
}

#[derive(Debug, Clone)]
pub struct Test {
    pub name: CompactString,
    pub body: Vec<Arc<Expr>>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Form),
    SymbolRef { name: crate::form::Symbol, is_local: bool },
    KeywordRef(crate::form::Keyword),
    VectorLit(Vec<Arc<Expr>>),
    MapLit(Vec<(Arc<Expr>, Arc<Expr>)>),
    SetLit(Vec<Arc<Expr>>),
    Def {
        name: CompactString,
        init: Option<Arc<Expr>>,
        docstring: Option<ArcStr>,
        type_hint: Option<HostType>,
        is_private: bool,
    },
    Fn(Fn_),
    Let { bindings: Vec<(CompactString, Arc<Expr>)>, body: Arc<Expr> },
    Loop { bindings: Vec<(CompactString, Arc<Expr>)>, body: Arc<Expr> },
    Do(Vec<Arc<Expr>>),
    If { test: Arc<Expr>, then: Arc<Expr>, els: Option<Arc<Expr>> },
    Invoke { func: Arc<Expr>, args: Vec<Arc<Expr>> },
    InstanceMethod { target: Arc<Expr>, name: CompactString, args: Vec<Arc<Expr>>, type_args: Vec<HostType> },
    StaticMethod { type_name: HostType, name: CompactString, args: Vec<Arc<Expr>>, type_args: Vec<HostType> },
    InstanceProperty { target: Arc<Expr>, name: CompactString },
    StaticProperty { type_name: HostType, name: CompactString },
    New { type_name: HostType, args: Vec<Arc<Expr>> },
    Cast { type_name: HostType, inner: Arc<Expr> },
    Assign { target: Arc<Expr>, value: Arc<Expr> },
    Throw(Arc<Expr>),
    Try { body: Arc<Expr>, catches: Vec<TryCatch>, finally: Option<Arc<Expr>> },
    Recur(Vec<Arc<Expr>>),
    Await(Arc<Expr>),
    Quote(Form),
    PrimitiveOp { operator: PrimitiveOperator, typ: PrimitiveType, operands: Vec<Arc<Expr>> },
    Ns(ArcStr),
    InNs(ArcStr),
    Require(ArcStr),
    RawHost { template: ArcStr, interpolations: Vec<(ArcStr, Arc<Expr>)> },
    Defprotocol(Protocol),
    Deftype(TypeBody),
    Defrecord(TypeBody),
    Deftest(Test),
    Is(Arc<Expr>),
    InstanceCheck { typ: HostType, value: Arc<Expr> },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub inferred_type: Option<HostType>,
    pub is_async: bool,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Arc<Self> {
        Arc::new(Expr { kind, inferred_type: None, is_async: false })
    }

    pub fn with_type(kind: ExprKind, typ: HostType) -> Arc<Self> {
        Arc::new(Expr { kind, inferred_type: Some(typ), is_async: false })
    }

    /// Structural walk used by the `Recur`-validity check: true if a tail-position `Recur` occurs anywhere reachable
    /// without crossing into a nested `Fn`/`Loop` (those own their own
    /// recur target).
    pub fn contains_recur_in_tail(&self) -> bool {
        match &self.kind {
            ExprKind::Recur(_) => true,
            ExprKind::If { then, els, .. } => {
                then.contains_recur_in_tail() || els.as_ref().is_some_and(|e| e.contains_recur_in_tail())
            }
            ExprKind::Do(exprs) => exprs.last().is_some_and(|e| e.contains_recur_in_tail()),
            ExprKind::Let { body, .. } => body.contains_recur_in_tail(),
            ExprKind::Try { body, .. } => body.contains_recur_in_tail(),
            _ => false,
        }
    }
}

/// A single compiled file, after `def`s and an optional single leading
/// `ns`/`in-ns` form have been pulled out.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    pub ns: Option<ArcStr>,
    pub exprs: Vec<Arc<Expr>>,
    pub has_tests: bool,
    pub requires: IndexMap<ArcStr, ArcStr>,
}
