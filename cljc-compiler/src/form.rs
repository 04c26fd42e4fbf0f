//! The parsed form universe. Forms arrive from an external reader;
//! this module only defines the closed sum type and the interning/metadata
//! machinery the rest of the pipeline is built on.

use arcstr::ArcStr;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{fmt, sync::LazyLock};
use triomphe::Arc;

/// A Keyword is interned globally: `(ns, name)` maps to one canonical
/// instance and equality is by that instance's identity, not structural
/// comparison of the strings.
#[derive(Debug, Clone)]
pub struct Keyword(Arc<KeywordData>);

#[derive(Debug)]
struct KeywordData {
    ns: Option<ArcStr>,
    name: ArcStr,
}

struct KeywordPool {
    by_name: FxHashMap<(Option<ArcStr>, ArcStr), Arc<KeywordData>>,
}

static KEYWORDS: LazyLock<Mutex<KeywordPool>> =
    LazyLock::new(|| Mutex::new(KeywordPool { by_name: FxHashMap::default() }));

impl Keyword {
    pub fn intern(ns: Option<&str>, name: &str) -> Self {
        let key = (ns.map(ArcStr::from), ArcStr::from(name));
        let mut pool = KEYWORDS.lock();
        if let Some(existing) = pool.by_name.get(&key) {
            return Keyword(existing.clone());
        }
        let data = Arc::new(KeywordData { ns: key.0.clone(), name: key.1.clone() });
        pool.by_name.insert(key, data.clone());
        Keyword(data)
    }

    pub fn ns(&self) -> Option<&str> {
        self.0.ns.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl PartialEq for Keyword {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Keyword {}

impl std::hash::Hash for Keyword {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // interning guarantees pointer identity, but the pool itself hashes
        // by name; hash by name here too so Keyword can key a HashMap
        // without forcing callers through the intern table.
        self.0.ns.hash(state);
        self.0.name.hash(state);
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.ns {
            Some(ns) => write!(f, ":{ns}/{}", self.0.name),
            None => write!(f, ":{}", self.0.name),
        }
    }
}

/// Symbols are not interned: two symbols with the same `(ns, name)` are
/// `==` but are distinct allocations, and each carries its own optional
/// metadata map.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub ns: Option<ArcStr>,
    pub name: ArcStr,
    pub meta: Option<Arc<Metadata>>,
}

impl Symbol {
    pub fn new(ns: Option<&str>, name: &str) -> Self {
        Symbol { ns: ns.map(ArcStr::from), name: ArcStr::from(name), meta: None }
    }

    pub fn unqualified(name: &str) -> Self {
        Self::new(None, name)
    }

    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = Some(Arc::new(meta));
        self
    }

    pub fn is_qualified(&self) -> bool {
        self.ns.is_some()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.ns == other.ns && self.name == other.name
    }
}
impl Eq for Symbol {}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Recognized metadata keys the core consults. Arbitrary other
/// keys may be present and are preserved but not interpreted.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub entries: indexmap::IndexMap<Keyword, Form>,
}

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&Form> {
        self.entries.iter().find(|(k, _)| k.ns().is_none() && k.name() == key).map(|(_, v)| v)
    }

    /// `:tag` may be a Symbol (a type name) or a String (for host types the
    /// reader cannot name as a symbol, e.g. `"string[]"`).
    pub fn tag(&self) -> Option<TagValue> {
        match self.get("tag")? {
            Form::Symbol(s) => Some(TagValue::Symbol(s.clone())),
            Form::String(s) => Some(TagValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.get("async"), Some(Form::Bool(true)))
    }

    pub fn attrs(&self) -> Vec<Form> {
        match self.get("attr") {
            Some(Form::Vector(v, _)) => v.to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self.get("private"), Some(Form::Bool(true)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Symbol(Symbol),
    Text(ArcStr),
}

/// The closed form universe forms are lowered from. Collections carry
/// optional metadata; scalars do not (the reader attaches metadata only to
/// symbols and collections).
#[derive(Debug, Clone)]
pub enum Form {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Char(char),
    String(ArcStr),
    Keyword(Keyword),
    Symbol(Symbol),
    List(Arc<[Form]>, Option<Arc<Metadata>>),
    Vector(Arc<[Form]>, Option<Arc<Metadata>>),
    Map(Arc<[(Form, Form)]>, Option<Arc<Metadata>>),
    Set(Arc<[Form]>, Option<Arc<Metadata>>),
}

impl Form {
    pub fn meta(&self) -> Option<&Metadata> {
        match self {
            Form::List(_, m) | Form::Vector(_, m) | Form::Map(_, m) | Form::Set(_, m) => {
                m.as_deref()
            }
            Form::Symbol(s) => s.meta.as_deref(),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Form::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Form]> {
        match self {
            Form::List(items, _) => Some(items),
            _ => None,
        }
    }

    /// `(head symbol is this unqualified name)` — used pervasively by
    /// special-form and sugar-form dispatch.
    pub fn list_head_name(&self) -> Option<&str> {
        let items = self.as_list()?;
        let head = items.first()?.as_symbol()?;
        if head.ns.is_none() {
            Some(&head.name)
        } else {
            None
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Form::Nil)
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Form::Nil => write!(f, "nil"),
            Form::Bool(b) => write!(f, "{b}"),
            Form::Int(i) => write!(f, "{i}"),
            Form::Float(x) => write!(f, "{x}"),
            Form::Decimal(d) => write!(f, "{d}M"),
            Form::Char(c) => write!(f, "\\{c}"),
            Form::String(s) => write!(f, "{s:?}"),
            Form::Keyword(k) => write!(f, "{k}"),
            Form::Symbol(s) => write!(f, "{s}"),
            Form::List(items, _) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Form::Vector(items, _) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Form::Map(pairs, _) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} {v}")?;
                }
                write!(f, "}}")
            }
            Form::Set(items, _) => {
                write!(f, "#{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keywords_intern_by_identity() {
        let a = Keyword::intern(Some("foo"), "bar");
        let b = Keyword::intern(Some("foo"), "bar");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_keywords_are_distinct_instances() {
        let a = Keyword::intern(None, "bar");
        let b = Keyword::intern(Some("foo"), "bar");
        assert_ne!(a, b);
    }

    #[test]
    fn symbols_are_not_interned_but_compare_by_ns_name() {
        let a = Symbol::new(Some("foo"), "bar");
        let b = Symbol::new(Some("foo"), "bar");
        assert_eq!(a, b);
    }

    #[test]
    fn tag_metadata_accepts_symbol_or_string() {
        let meta = Metadata {
            entries: indexmap::indexmap! { Keyword::intern(None, "tag") => Form::String(ArcStr::from("string[]")) },
        };
        assert_eq!(meta.tag(), Some(TagValue::Text(ArcStr::from("string[]"))));
    }
}
