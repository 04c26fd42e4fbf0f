//! The runtime value representation emitted code and the rest of this
//! crate operate on. Distinct from the compiler's `Form`: a
//! `Form` is what the analyzer saw in source; a `Value` is what a running
//! program actually holds, including things no literal syntax produces
//! (functions, atoms, channels).

use crate::collections::{PersistentList, PersistentMap, PersistentSet, PersistentVector};
use arcstr::ArcStr;
use rust_decimal::Decimal;
use std::{cmp::Ordering, fmt, sync::atomic::{AtomicU64, Ordering as AtomicOrdering}};
use triomphe::Arc;

/// A callable value: closes over its defining environment the way a host
/// lambda would, boxed behind `Arc` so `Value` stays `Clone`.
#[derive(Clone)]
pub struct Callable(pub Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>);

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<fn>")
    }
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(0);

fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, AtomicOrdering::Relaxed)
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Char(char),
    Str(ArcStr),
    Keyword(Option<ArcStr>, ArcStr),
    Symbol(Option<ArcStr>, ArcStr),
    List(PersistentList),
    Vector(PersistentVector),
    Map(PersistentMap),
    Set(PersistentSet),
    Fn(Callable, u64),
}

impl Value {
    pub fn callable(f: impl Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static) -> Value {
        Value::Fn(Callable(Arc::new(f)), next_identity())
    }

    /// Truthiness: only `nil` and `false` are falsy; every
    /// other value, including `0` and empty collections, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Decimal(_) => 4,
            Value::Char(_) => 5,
            Value::Str(_) => 6,
            Value::Keyword(..) => 7,
            Value::Symbol(..) => 8,
            Value::List(_) => 9,
            Value::Vector(_) => 10,
            Value::Map(_) => 11,
            Value::Set(_) => 12,
            Value::Fn(..) => 13,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Keyword(ans, an), Value::Keyword(bns, bn)) => ans == bns && an == bn,
            (Value::Symbol(ans, an), Value::Symbol(bns, bn)) => ans == bns && an == bn,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Fn(_, a), Value::Fn(_, b)) => a == b,
            _ => false,
        }
    }
}

/// A total order over `Value` used only where the runtime needs one
/// (sorted-set/sorted-map backing, comparator-free `sort`): numeric values
/// compare by magnitude via `total_cmp`, everything else falls back to a
/// stable cross-type ordering by variant, then by an arbitrary but
/// consistent per-value identity for incomparable cases like functions.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Value {}

/// `immutable_chunkmap`'s `MapS`/`SetS` key their storage on `Ord`, so this
/// total order has to be defined even though the source language only
/// exposes a partial numeric comparison (`chained_compare` below) to user
/// code. Cross-variant pairs fall back to a stable rank ordering.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Keyword(ans, an), Value::Keyword(bns, bn)) => (ans, an).cmp(&(bns, bn)),
            (Value::Symbol(ans, an), Value::Symbol(bns, bn)) => (ans, an).cmp(&(bns, bn)),
            (Value::Fn(_, a), Value::Fn(_, b)) => a.cmp(b),
            _ if self.rank() != other.rank() => self.rank().cmp(&other.rank()),
            _ => Ordering::Equal,
        }
    }
}

/// Numeric promotion lattice the emitted code's `PrimitiveOp` nodes rely
/// on at runtime for boxed/dynamic fallback: `Float > Decimal
/// > Int`, mirroring the compiler's own static promotion rule so boxed
/// and specialized arithmetic agree on the result type.
pub fn add(a: &Value, b: &Value) -> anyhow::Result<Value> {
    numeric_op(a, b, |x, y| x + y, |x, y| x + y, |x, y| x + y)
}
pub fn sub(a: &Value, b: &Value) -> anyhow::Result<Value> {
    numeric_op(a, b, |x, y| x - y, |x, y| x - y, |x, y| x - y)
}
pub fn mul(a: &Value, b: &Value) -> anyhow::Result<Value> {
    numeric_op(a, b, |x, y| x * y, |x, y| x * y, |x, y| x * y)
}
pub fn div(a: &Value, b: &Value) -> anyhow::Result<Value> {
    numeric_op(a, b, |x, y| x / y, |x, y| x / y, |x, y| x / y)
}

/// `mod`: floor modulus, result takes the sign of the divisor (unlike a
/// host `%`, which takes the sign of the dividend). `((x % y) + y) % y`
/// folds a truncating remainder into a floor one for ints, floats, and
/// decimals alike.
pub fn modulo(a: &Value, b: &Value) -> anyhow::Result<Value> {
    numeric_op(a, b, |x, y| ((x % y) + y) % y, |x, y| ((x % y) + y) % y, |x, y| ((x % y) + y) % y)
}

fn numeric_op(
    a: &Value,
    b: &Value,
    intf: impl Fn(i64, i64) -> i64,
    floatf: impl Fn(f64, f64) -> f64,
    decf: impl Fn(Decimal, Decimal) -> Decimal,
) -> anyhow::Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(intf(*x, *y))),
        (Value::Decimal(x), Value::Decimal(y)) => Ok(Value::Decimal(decf(*x, *y))),
        (Value::Decimal(x), Value::Int(y)) => Ok(Value::Decimal(decf(*x, Decimal::from(*y)))),
        (Value::Int(x), Value::Decimal(y)) => Ok(Value::Decimal(decf(Decimal::from(*x), *y))),
        (a, b) => {
            let x = as_f64(a)?;
            let y = as_f64(b)?;
            Ok(Value::Float(floatf(x, y)))
        }
    }
}

fn as_f64(v: &Value) -> anyhow::Result<f64> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Decimal(d) => Ok(d.to_string().parse()?),
        other => anyhow::bail!("{other:?} is not a number"),
    }
}

/// Chained comparison (`<`, `<=`, `>`, `>=`): true iff every adjacent pair
/// compares true, matching the source language's variadic comparison
/// operators rather than a binary-only host equivalent.
pub fn chained_compare(values: &[Value], op: impl Fn(Ordering) -> bool) -> bool {
    values.windows(2).all(|pair| pair[0].partial_cmp(&pair[1]).is_some_and(&op))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nil_and_false_are_the_only_falsy_values() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Str(ArcStr::from("")).is_truthy());
    }

    #[test]
    fn int_plus_decimal_promotes_to_decimal() {
        let result = add(&Value::Int(1), &Value::Decimal(Decimal::new(25, 1))).unwrap();
        assert_eq!(result, Value::Decimal(Decimal::new(35, 1)));
    }

    #[test]
    fn modulo_takes_the_sign_of_the_divisor() {
        assert_eq!(modulo(&Value::Int(7), &Value::Int(3)).unwrap(), Value::Int(1));
        assert_eq!(modulo(&Value::Int(-7), &Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(modulo(&Value::Int(7), &Value::Int(-3)).unwrap(), Value::Int(-2));
    }

    #[test]
    fn chained_less_than_checks_every_adjacent_pair() {
        let values = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        assert!(chained_compare(&values, |o| o == Ordering::Less));
        let values = vec![Value::Int(1), Value::Int(3), Value::Int(2)];
        assert!(!chained_compare(&values, |o| o == Ordering::Less));
    }
}
