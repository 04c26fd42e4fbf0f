//! Primitive-arithmetic specializer. Applied to head symbols in
//! `{+, -, *, /, <, >, <=, >=, =}` with at least two analyzed arguments: if
//! every operand's type can be statically inferred as numeric, the op is
//! lowered to `ExprKind::PrimitiveOp` instead of a generic `Invoke`.
//!
//! Grounded on the "fall through to a normal call when
//! specialization doesn't apply" shape seen in
//! `graphix-compiler::node::op` picking a fast numeric path and falling
//! back to the boxed/dynamic path otherwise.

use crate::ir::{Expr, ExprKind, HostType, PrimitiveOperator, PrimitiveType};
use triomphe::Arc;

fn infer_numeric_type(expr: &Expr) -> Option<PrimitiveType> {
    match &expr.kind {
        ExprKind::Literal(crate::form::Form::Int(_)) => Some(PrimitiveType::Int64),
        ExprKind::Literal(crate::form::Form::Float(_)) => Some(PrimitiveType::Float64),
        ExprKind::Literal(crate::form::Form::Decimal(_)) => Some(PrimitiveType::Decimal),
        ExprKind::Cast { type_name, .. } => host_type_to_primitive(type_name),
        ExprKind::PrimitiveOp { typ, .. } => Some(*typ),
        ExprKind::SymbolRef { is_local: true, .. } => {
            expr.inferred_type.as_ref().and_then(host_type_to_primitive)
        }
        _ => None,
    }
}

fn host_type_to_primitive(t: &HostType) -> Option<PrimitiveType> {
    match t.0.as_str() {
        "int" => Some(PrimitiveType::Int32),
        "long" => Some(PrimitiveType::Int64),
        "float" => Some(PrimitiveType::Float32),
        "double" => Some(PrimitiveType::Float64),
        "decimal" => Some(PrimitiveType::Decimal),
        _ => None,
    }
}

/// Attempts specialization; returns `None` (meaning "emit a normal
/// `Invoke`") unless every operand's numeric type is statically known.
pub fn try_specialize(op_symbol: &str, operands: &[Arc<Expr>]) -> Option<Arc<Expr>> {
    if operands.len() < 2 {
        return None;
    }
    let operator = PrimitiveOperator::from_symbol(op_symbol)?;
    let mut promoted: Option<PrimitiveType> = None;
    for operand in operands {
        let t = infer_numeric_type(operand)?;
        promoted = Some(match promoted {
            None => t,
            Some(acc) => PrimitiveType::promote(acc, t),
        });
    }
    let typ = promoted?;
    Some(Expr::with_type(
        ExprKind::PrimitiveOp { operator, typ, operands: operands.to_vec() },
        HostType::named(typ.host_name()),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::form::Form;

    fn int_lit(i: i64) -> Arc<Expr> {
        Expr::new(ExprKind::Literal(Form::Int(i)))
    }

    fn float_lit(x: f64) -> Arc<Expr> {
        Expr::new(ExprKind::Literal(Form::Float(x)))
    }

    #[test]
    fn two_int_literals_specialize_to_int64() {
        let specialized = try_specialize("+", &[int_lit(1), int_lit(2)]).unwrap();
        match &specialized.kind {
            ExprKind::PrimitiveOp { typ, operator, .. } => {
                assert_eq!(*typ, PrimitiveType::Int64);
                assert_eq!(*operator, PrimitiveOperator::Add);
            }
            _ => panic!("expected PrimitiveOp"),
        }
    }

    #[test]
    fn mixed_int_float_promotes_to_float64() {
        let specialized = try_specialize("*", &[int_lit(1), float_lit(2.0)]).unwrap();
        match &specialized.kind {
            ExprKind::PrimitiveOp { typ, .. } => assert_eq!(*typ, PrimitiveType::Float64),
            _ => panic!("expected PrimitiveOp"),
        }
    }

    #[test]
    fn unknown_operand_type_falls_through() {
        let unknown = Expr::new(ExprKind::Invoke {
            func: Expr::new(ExprKind::SymbolRef {
                name: crate::form::Symbol::unqualified("f"),
                is_local: false,
            }),
            args: vec![],
        });
        assert!(try_specialize("+", &[int_lit(1), unknown]).is_none());
    }

    #[test]
    fn single_operand_never_specializes() {
        assert!(try_specialize("+", &[int_lit(1)]).is_none());
    }
}
