//! `deftest`/`is` emission. In file mode a `deftest` becomes a
//! `[Fact]`-annotated test method and `is` an `Assert` call; in REPL mode
//! both route through a thread-local result collector instead, so a REPL
//! session can report a pass/fail count for forms evaluated one at a time
//!.

use super::{Emitter, EmitContext, EmitMode};
use crate::ir::{Expr, ExprKind, PrimitiveOperator, Test};
use anyhow::Result;
use std::fmt::Write as _;

pub fn emit_test_class_prelude(_class_name: &str) -> String {
    "    // test methods below are discovered by the host test runner via [Fact]\n".to_string()
}

pub fn emit_test(emitter: &Emitter, t: &Test) -> Result<String> {
    let mut out = String::new();
    match emitter.mode {
        EmitMode::File => {
            writeln!(out, "[Fact]").ok();
            writeln!(out, "public static void {}()", super::mangle_identifier(&t.name)).ok();
            writeln!(out, "{{").ok();
            for expr in &t.body {
                let line = emitter.emit_expr(expr, EmitContext::Statement)?;
                for l in line.lines() {
                    writeln!(out, "    {l}").ok();
                }
            }
            writeln!(out, "}}").ok();
        }
        EmitMode::Repl => {
            // No method wrapper: a REPL `deftest` runs its body immediately,
            // the way any other top-level form does, and the `is` forms
            // inside it accumulate into `TestResultCollector.Current`.
            for expr in &t.body {
                let line = emitter.emit_expr(expr, EmitContext::Statement)?;
                for l in line.lines() {
                    writeln!(out, "{l}").ok();
                }
            }
        }
    }
    Ok(out)
}

/// Splits `(= expected actual)` (either still a generic `Invoke` or
/// already specialized to `PrimitiveOp::Eq` by the arithmetic
/// specializer) out of an `is` form so it can be asserted as an equality
/// check instead of a bare truthiness check: `is` emits `AssertEqual`
/// when its inner is `(= expected actual)`.
fn as_equality(inner: &Expr) -> Option<(&Expr, &Expr)> {
    match &inner.kind {
        ExprKind::PrimitiveOp { operator: PrimitiveOperator::Eq, operands, .. } if operands.len() == 2 => {
            Some((&*operands[0], &*operands[1]))
        }
        ExprKind::Invoke { func, args } if args.len() == 2 => match &func.kind {
            ExprKind::SymbolRef { name, is_local: false } if name.ns.is_none() && name.name.as_str() == "=" => {
                Some((&*args[0], &*args[1]))
            }
            _ => None,
        },
        _ => None,
    }
}

pub fn emit_is(emitter: &Emitter, inner: &Expr, ctx: EmitContext) -> Result<String> {
    let text = match as_equality(inner) {
        Some((expected, actual)) => {
            let expected_text = emitter.emit_expr(expected, EmitContext::Expression)?;
            let actual_text = emitter.emit_expr(actual, EmitContext::Expression)?;
            match emitter.mode {
                EmitMode::File => format!("Assert.Equal({expected_text}, {actual_text})"),
                EmitMode::Repl => format!(
                    "TestResultCollector.Current.RecordEqual({expected_text}, {actual_text})"
                ),
            }
        }
        None => {
            let inner_text = emitter.emit_expr(inner, EmitContext::Expression)?;
            match emitter.mode {
                EmitMode::File => format!("Assert.True(Truthiness.IsTruthy({inner_text}))"),
                EmitMode::Repl => {
                    format!("TestResultCollector.Current.RecordTruth(Truthiness.IsTruthy({inner_text}))")
                }
            }
        }
    };
    Ok(emitter.statement_wrap(text, ctx))
}
