//! `defprotocol`/`deftype`/`defrecord` emission: protocols become host
//! interfaces, types/records become host classes implementing them. A
//! record additionally gets value-semantics equality/hash overrides the
//! way the host's own record feature would synthesize them, since the
//! target is described only generically as having "classes/records".

use super::{Emitter, EmitContext};
use crate::form::Form;
use crate::ir::{Field, Protocol, TypeBody};
use anyhow::Result;
use std::fmt::Write as _;

fn field_type(f: &Field) -> String {
    f.host_type.as_ref().map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string())
}

/// Renders one `:attr` entry as a host attribute annotation: `(Name a b)`
/// becomes `[Name(a, b)]`, a bare symbol becomes `[Name]`.
fn emit_attr(form: &Form) -> String {
    match form {
        Form::List(items, _) => {
            let name = items.first().and_then(Form::as_symbol).map(|s| s.name.to_string()).unwrap_or_default();
            let args = items[1..].iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ");
            format!("[{name}({args})]")
        }
        Form::Symbol(s) => format!("[{}]", s.name),
        other => format!("[{other}]"),
    }
}

pub fn emit_protocol(_emitter: &Emitter, p: &Protocol) -> String {
    let mut out = String::new();
    writeln!(out, "public interface {}", p.name).ok();
    writeln!(out, "{{").ok();
    for (name, param_types, return_type) in &p.methods {
        let ret = return_type.as_ref().map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string());
        let params = param_types
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{} arg{i}", t.as_ref().map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string())))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "    {ret} {name}({params});").ok();
    }
    writeln!(out, "}}").ok();
    out
}

/// Deftype -> a host class with one property per field:
/// get/set when any field carries `:attr` metadata, get-only otherwise,
/// plus a full-args constructor and — only when attributes are present —
/// a parameterless one too (attribute-driven frameworks like serializers
/// commonly need a default constructor to populate via the setters).
/// Defrecord follows the same property/constructor shape but additionally
/// emits as a host `record` when no field carries attributes; a record
/// with attributed fields falls back to the class shape so the attributes
/// have somewhere to attach.
pub fn emit_type_body(emitter: &Emitter, t: &TypeBody, as_record: bool) -> Result<String> {
    let any_attrs = t.fields.iter().any(|f| !f.attrs.is_empty());
    let plain_record = as_record && !any_attrs;
    let mut out = String::new();
    let interfaces = if t.interfaces.is_empty() {
        String::new()
    } else {
        format!(" : {}", t.interfaces.iter().map(|i| i.0.to_string()).collect::<Vec<_>>().join(", "))
    };
    if plain_record {
        let params = t.fields.iter().map(|f| format!("{} {}", field_type(f), f.name)).collect::<Vec<_>>().join(", ");
        writeln!(out, "public record {}({params}){interfaces}", t.name).ok();
    } else {
        let keyword = if as_record { "record" } else { "class" };
        writeln!(out, "public {keyword} {}{interfaces}", t.name).ok();
    }
    writeln!(out, "{{").ok();
    if !plain_record {
        let accessor = if any_attrs { "get; set;" } else { "get;" };
        for field in &t.fields {
            for attr in &field.attrs {
                writeln!(out, "    {}", emit_attr(attr)).ok();
            }
            writeln!(out, "    public {} {} {{ {accessor} }}", field_type(field), field.name).ok();
        }
        if !t.fields.is_empty() {
            let params = t.fields.iter().map(|f| format!("{} {}", field_type(f), f.name)).collect::<Vec<_>>().join(", ");
            writeln!(out, "    public {}({params})", t.name).ok();
            writeln!(out, "    {{").ok();
            for f in &t.fields {
                writeln!(out, "        this.{0} = {0};", f.name).ok();
            }
            writeln!(out, "    }}").ok();
            if any_attrs {
                writeln!(out, "    public {}() {{ }}", t.name).ok();
            }
        }
    }
    for (name, method) in &t.methods {
        let ret = method.return_type.as_ref().map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string());
        let params = method
            .fixed_params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let t = method.param_types.as_ref().and_then(|ts| ts.get(i).cloned().flatten()).map(|t| t.0.to_string()).unwrap_or_else(|| "object".to_string());
                format!("{t} {}", super::mangle_identifier(p))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let body = emitter.emit_expr(&method.body, EmitContext::Return)?;
        writeln!(out, "    public {ret} {name}({params})").ok();
        writeln!(out, "    {{").ok();
        for line in body.lines() {
            writeln!(out, "        {line}").ok();
        }
        writeln!(out, "    }}").ok();
    }
    writeln!(out, "}}").ok();
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::emit::{CodegenFlavor, Emitter};
    use crate::ir::{Field, TypeBody};

    fn field(name: &str, attrs: Vec<Form>) -> Field {
        Field { name: compact_str::CompactString::from(name), host_type: Some(crate::ir::HostType::named("int")), attrs }
    }

    #[test]
    fn unattributed_record_emits_positional_record() {
        let emitter = Emitter::new(CodegenFlavor::Direct);
        let body = TypeBody {
            name: compact_str::CompactString::from("Point"),
            fields: vec![field("X", vec![]), field("Y", vec![])],
            interfaces: vec![],
            methods: vec![],
        };
        let text = emit_type_body(&emitter, &body, true).unwrap();
        assert!(text.starts_with("public record Point(int X, int Y)"), "{text}");
    }

    #[test]
    fn attributed_record_falls_back_to_class_with_properties() {
        let emitter = Emitter::new(CodegenFlavor::Direct);
        let attr = Form::Symbol(crate::form::Symbol::unqualified("Required"));
        let body = TypeBody {
            name: compact_str::CompactString::from("Point"),
            fields: vec![field("X", vec![attr])],
            interfaces: vec![],
            methods: vec![],
        };
        let text = emit_type_body(&emitter, &body, true).unwrap();
        assert!(text.contains("public class Point"), "{text}");
        assert!(text.contains("[Required]"), "{text}");
        assert!(text.contains("get; set;"), "{text}");
        assert!(text.contains("public Point() { }"), "{text}");
    }
}
