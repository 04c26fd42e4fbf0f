//! Interop emission: instance/static method and property calls, `new`, and
//! `Cast`. Each of these is a thin, direct translation once its operand
//! subexpressions are rendered — the interesting work (deciding *which*
//! sugar form produced the node) already happened in the analyzer.

use super::{Emitter, EmitContext};
use crate::ir::{Expr, HostType};
use anyhow::Result;
use compact_str::CompactString;
use triomphe::Arc;

fn type_args_suffix(type_args: &[HostType]) -> String {
    if type_args.is_empty() {
        String::new()
    } else {
        let names = type_args.iter().map(|t| t.0.to_string()).collect::<Vec<_>>().join(", ");
        format!("<{names}>")
    }
}

/// Instance method/property targets get an explicit host cast when the
/// target carries a known type — either an inline `:tag` (already lowered
/// to an explicit `ExprKind::Cast` by the analyzer, so left alone here to
/// avoid a double cast) or a typed let-binding the analyzer only recorded
/// as `inferred_type`.
fn emit_target(emitter: &Emitter, target: &Expr) -> Result<String> {
    let text = emitter.emit_expr(target, EmitContext::Expression)?;
    match (&target.kind, &target.inferred_type) {
        (crate::ir::ExprKind::Cast { .. }, _) => Ok(text),
        (_, Some(t)) => Ok(format!("(({}){text})", t.0)),
        (_, None) => Ok(text),
    }
}

pub fn emit_instance_method(
    emitter: &Emitter,
    target: &Expr,
    name: &CompactString,
    args: &[Arc<Expr>],
    type_args: &[HostType],
    ctx: EmitContext,
) -> Result<String> {
    let target_text = emit_target(emitter, target)?;
    let arg_texts = args.iter().map(|a| emitter.emit_expr(a, EmitContext::Expression)).collect::<Result<Vec<_>>>()?;
    let text = format!("{target_text}.{name}{}({})", type_args_suffix(type_args), arg_texts.join(", "));
    Ok(emitter.statement_wrap(text, ctx))
}

pub fn emit_static_method(
    emitter: &Emitter,
    type_name: &HostType,
    name: &CompactString,
    args: &[Arc<Expr>],
    type_args: &[HostType],
    ctx: EmitContext,
) -> Result<String> {
    let arg_texts = args.iter().map(|a| emitter.emit_expr(a, EmitContext::Expression)).collect::<Result<Vec<_>>>()?;
    let text = format!("{}.{name}{}({})", type_name.0, type_args_suffix(type_args), arg_texts.join(", "));
    Ok(emitter.statement_wrap(text, ctx))
}

pub fn emit_instance_property(emitter: &Emitter, target: &Expr, name: &CompactString, ctx: EmitContext) -> Result<String> {
    let target_text = emit_target(emitter, target)?;
    Ok(emitter.statement_wrap(format!("{target_text}.{name}"), ctx))
}

pub fn emit_new(emitter: &Emitter, type_name: &HostType, args: &[Arc<Expr>], ctx: EmitContext) -> Result<String> {
    let arg_texts = args.iter().map(|a| emitter.emit_expr(a, EmitContext::Expression)).collect::<Result<Vec<_>>>()?;
    Ok(emitter.statement_wrap(format!("new {}({})", type_name.0, arg_texts.join(", ")), ctx))
}

/// `Cast` prints as a primitive conversion call for the five primitive
/// type names the analyzer's specializer knows about, and as a plain
/// parenthesized reference cast otherwise.
pub fn emit_cast(emitter: &Emitter, type_name: &HostType, inner: &Expr, ctx: EmitContext) -> Result<String> {
    let inner_text = emitter.emit_expr(inner, EmitContext::Expression)?;
    let text = match type_name.0.as_str() {
        "int" => format!("Convert.ToInt32({inner_text})"),
        "long" => format!("Convert.ToInt64({inner_text})"),
        "float" => format!("Convert.ToSingle({inner_text})"),
        "double" => format!("Convert.ToDouble({inner_text})"),
        "decimal" => format!("Convert.ToDecimal({inner_text})"),
        other => format!("(({other}){inner_text})"),
    };
    Ok(emitter.statement_wrap(text, ctx))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::emit::CodegenFlavor;
    use crate::form::Form;
    use crate::ir::ExprKind;

    #[test]
    fn instance_method_on_typed_local_gets_explicit_cast() {
        let emitter = Emitter::new(CodegenFlavor::Direct);
        let target = Expr::with_type(
            ExprKind::SymbolRef { name: crate::form::Symbol::unqualified("x"), is_local: true },
            HostType::named("Widget"),
        );
        let text = emit_instance_method(&emitter, &target, &CompactString::from("Frob"), &[], &[], EmitContext::Expression).unwrap();
        assert_eq!(text, "((Widget)x).Frob()");
    }

    #[test]
    fn primitive_cast_uses_convert_call() {
        let emitter = Emitter::new(CodegenFlavor::Direct);
        let inner = Expr::new(ExprKind::Literal(Form::Int(1)));
        let text = emit_cast(&emitter, &HostType::named("int"), &inner, EmitContext::Expression).unwrap();
        assert_eq!(text, "Convert.ToInt32(1)");
    }

    #[test]
    fn reference_cast_uses_parenthesized_form() {
        let emitter = Emitter::new(CodegenFlavor::Direct);
        let inner = Expr::new(ExprKind::Literal(Form::Nil));
        let text = emit_cast(&emitter, &HostType::named("Widget"), &inner, EmitContext::Expression).unwrap();
        assert_eq!(text, "((Widget)null)");
    }
}
