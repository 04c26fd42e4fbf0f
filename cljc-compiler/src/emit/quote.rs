//! Quote reconstruction: prints a `Form` back out as host-level
//! constructor calls (`Symbol.Intern`, `Keyword.Intern`,
//! `PersistentList.Create`, ...) rather than as dialect syntax — the
//! output is host source, so a quoted form has to be built at runtime the
//! same way the reader would have built it.

use crate::form::{Form, Keyword, Symbol};

pub fn emit_keyword(k: &Keyword) -> String {
    match k.ns() {
        Some(ns) => format!("Keyword.Intern({ns:?}, {:?})", k.name()),
        None => format!("Keyword.Intern(null, {:?})", k.name()),
    }
}

pub fn emit_symbol(s: &Symbol) -> String {
    match &s.ns {
        Some(ns) => format!("Symbol.Intern({ns:?}, {:?})", s.name.as_str()),
        None => format!("Symbol.Intern(null, {:?})", s.name.as_str()),
    }
}

pub fn emit_quote(form: &Form) -> String {
    match form {
        Form::Nil => "null".to_string(),
        Form::Bool(b) => b.to_string(),
        Form::Int(i) => i.to_string(),
        Form::Float(x) => format!("{x}d"),
        Form::Decimal(d) => format!("{d}m"),
        Form::Char(c) => format!("'{c}'"),
        Form::String(s) => format!("{s:?}"),
        Form::Keyword(k) => emit_keyword(k),
        Form::Symbol(s) => emit_symbol(s),
        Form::List(items, _) => {
            let parts = items.iter().map(emit_quote).collect::<Vec<_>>().join(", ");
            format!("PersistentList.Create({parts})")
        }
        Form::Vector(items, _) => {
            let parts = items.iter().map(emit_quote).collect::<Vec<_>>().join(", ");
            format!("PersistentVector.Create({parts})")
        }
        Form::Set(items, _) => {
            let parts = items.iter().map(emit_quote).collect::<Vec<_>>().join(", ");
            format!("PersistentHashSet.Create({parts})")
        }
        Form::Map(pairs, _) => {
            let mut parts = Vec::new();
            for (k, v) in pairs.iter() {
                parts.push(emit_quote(k));
                parts.push(emit_quote(v));
            }
            format!("PersistentHashMap.Create({})", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use triomphe::Arc;

    #[test]
    fn quoted_list_round_trips_through_constructor_calls() {
        let form = Form::List(
            Arc::from(vec![Form::Symbol(Symbol::unqualified("a")), Form::Int(1)]),
            None,
        );
        let text = emit_quote(&form);
        assert_eq!(text, "PersistentList.Create(Symbol.Intern(null, \"a\"), 1)");
    }

    #[test]
    fn qualified_keyword_carries_its_namespace() {
        let k = Keyword::intern(Some("foo"), "bar");
        assert_eq!(emit_keyword(&k), "Keyword.Intern(\"foo\", \"bar\")");
    }
}
