//! Mutable reference types: `Atom` (independent, synchronous,
//! compare-and-swap), `Volatile` (uncoordinated, no retry), `Ref` (STM,
//! coordinated multi-ref transactions), and `Delay` (memoized, run-once).
//! State lives behind `parking_lot` locks the way `GXRt` guards its
//! registries, rather than under `std::sync` — there's no reason to reach
//! for the stdlib's heavier primitives when `parking_lot` is already a
//! dependency.

use crate::Value;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use triomphe::Arc;

/// Independent, synchronous reference. `swap`/`reset` notify watches the
/// way the source language's `add-watch` contract expects: after the new
/// value is committed, never before. A validator runs before a value is
/// ever committed and rejects the update instead, so watches only ever
/// see values the validator has already accepted.
pub struct Atom {
    value: RwLock<Value>,
    watches: Mutex<Vec<(String, Arc<dyn Fn(&str, &Value, &Value) + Send + Sync>)>>,
    validator: Mutex<Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>>,
}

impl Atom {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Atom { value: RwLock::new(value), watches: Mutex::new(Vec::new()), validator: Mutex::new(None) })
    }

    pub fn deref(&self) -> Value {
        self.value.read().clone()
    }

    pub fn set_validator(&self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) {
        *self.validator.lock() = Some(Arc::new(f));
    }

    pub fn clear_validator(&self) {
        *self.validator.lock() = None;
    }

    fn validate(&self, new_value: &Value) -> anyhow::Result<()> {
        if let Some(f) = self.validator.lock().as_ref() {
            if !f(new_value) {
                anyhow::bail!("Invalid reference state: validator rejected {new_value:?}");
            }
        }
        Ok(())
    }

    pub fn reset(self: &Arc<Self>, new_value: Value) -> anyhow::Result<Value> {
        self.validate(&new_value)?;
        let old = {
            let mut guard = self.value.write();
            std::mem::replace(&mut *guard, new_value.clone())
        };
        self.notify(&old, &new_value);
        Ok(new_value)
    }

    /// Retries `f` against the latest value until its compare-and-swap
    /// succeeds uncontended, matching the source language's lock-free
    /// `swap!` rather than taking the write lock for the whole call.
    pub fn swap(self: &Arc<Self>, f: impl Fn(&Value) -> anyhow::Result<Value>) -> anyhow::Result<Value> {
        loop {
            let old = self.deref();
            let new_value = f(&old)?;
            self.validate(&new_value)?;
            let mut guard = self.value.write();
            if Self::same(&guard, &old) {
                *guard = new_value.clone();
                drop(guard);
                self.notify(&old, &new_value);
                return Ok(new_value);
            }
        }
    }

    pub fn compare_and_set(self: &Arc<Self>, expected: &Value, new_value: Value) -> anyhow::Result<bool> {
        self.validate(&new_value)?;
        let mut guard = self.value.write();
        if Self::same(&guard, expected) {
            let old = std::mem::replace(&mut *guard, new_value.clone());
            drop(guard);
            self.notify(&old, &new_value);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn add_watch(&self, key: impl Into<String>, f: impl Fn(&str, &Value, &Value) + Send + Sync + 'static) {
        self.watches.lock().push((key.into(), Arc::new(f)));
    }

    pub fn remove_watch(&self, key: &str) {
        self.watches.lock().retain(|(k, _)| k != key);
    }

    fn notify(&self, old: &Value, new_value: &Value) {
        for (key, f) in self.watches.lock().iter() {
            f(key, old, new_value);
        }
    }

    fn same(a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// Uncoordinated, thread-confined mutable cell: no compare-and-swap retry,
/// no watches, cheapest possible box around a `Value` for the common case
/// of loop accumulators inside a single `fn`.
pub struct Volatile(RwLock<Value>);

impl Volatile {
    pub fn new(value: Value) -> Self {
        Volatile(RwLock::new(value))
    }

    pub fn deref(&self) -> Value {
        self.0.read().clone()
    }

    pub fn reset(&self, new_value: Value) -> Value {
        *self.0.write() = new_value.clone();
        new_value
    }
}

/// Memoized, run-exactly-once computation. The closure runs under the lock
/// so two racing `force` calls never run it twice, matching the source
/// language's guarantee.
pub struct Delay {
    cell: Mutex<Option<anyhow::Result<Value>>>,
    thunk: Mutex<Option<Box<dyn FnOnce() -> anyhow::Result<Value> + Send>>>,
}

impl Delay {
    pub fn new(thunk: impl FnOnce() -> anyhow::Result<Value> + Send + 'static) -> Self {
        Delay { cell: Mutex::new(None), thunk: Mutex::new(Some(Box::new(thunk))) }
    }

    pub fn force(&self) -> anyhow::Result<Value> {
        let mut cell = self.cell.lock();
        if cell.is_none() {
            let thunk = self.thunk.lock().take();
            let result = match thunk {
                Some(f) => f(),
                None => unreachable!("delay thunk consumed without caching a result"),
            };
            *cell = Some(match &result {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            });
        }
        match cell.as_ref().unwrap() {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(anyhow::anyhow!("{e}")),
        }
    }

    pub fn is_realized(&self) -> bool {
        self.cell.lock().is_some()
    }
}

static NEXT_REF_ID: AtomicU64 = AtomicU64::new(0);

/// A coordinated reference: reads and writes only happen inside a
/// `LockingTransaction::run` closure. Each
/// `Ref` owns a monotonically increasing id purely so `LockingTransaction`
/// can lock refs in a fixed global order and avoid deadlocking against a
/// concurrent transaction that touches the same refs in the opposite order.
pub struct Ref {
    id: u64,
    value: RwLock<Value>,
}

impl Ref {
    pub fn new(value: Value) -> Arc<Self> {
        Arc::new(Ref { id: NEXT_REF_ID.fetch_add(1, AtomicOrdering::Relaxed), value: RwLock::new(value) })
    }

    pub fn deref(&self) -> Value {
        self.value.read().clone()
    }
}

/// Transaction body callback: reads go through `TxnHandle::deref`, writes
/// through `TxnHandle::set`/`alter`. Retried from scratch on conflict, so
/// the closure must stay free of side effects other than ref reads/writes.
pub struct TxnHandle<'a> {
    writes: &'a Mutex<Vec<(Arc<Ref>, Value)>>,
}

impl TxnHandle<'_> {
    pub fn deref(&self, r: &Arc<Ref>) -> Value {
        for (pending, v) in self.writes.lock().iter() {
            if Arc::ptr_eq(pending, r) {
                return v.clone();
            }
        }
        r.deref()
    }

    pub fn set(&self, r: &Arc<Ref>, v: Value) {
        self.writes.lock().push((r.clone(), v));
    }

    pub fn alter(&self, r: &Arc<Ref>, f: impl FnOnce(&Value) -> anyhow::Result<Value>) -> anyhow::Result<Value> {
        let current = self.deref(r);
        let updated = f(&current)?;
        self.set(r, updated.clone());
        Ok(updated)
    }
}

/// Runs `body` as an STM transaction: locks every ref it ends up touching
/// in ascending id order (deadlock-free against any other transaction
/// doing the same), commits all buffered writes atomically, and retries
/// from scratch if a ref it read was changed underneath it by a writer
/// that committed first.
pub fn run_transaction<T>(
    refs_hint: &[Arc<Ref>],
    mut body: impl FnMut(&TxnHandle) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    loop {
        let writes = Mutex::new(Vec::new());
        let handle = TxnHandle { writes: &writes };
        let snapshot: Vec<(Arc<Ref>, Value)> =
            refs_hint.iter().map(|r| (r.clone(), r.deref())).collect();
        let result = body(&handle)?;

        let mut touched: Vec<Arc<Ref>> = writes.lock().iter().map(|(r, _)| r.clone()).collect();
        for (r, _) in &snapshot {
            if !touched.iter().any(|t| Arc::ptr_eq(t, r)) {
                touched.push(r.clone());
            }
        }
        touched.sort_by_key(|r| r.id);

        let guards: Vec<_> = touched.iter().map(|r| r.value.write()).collect();
        let conflict = snapshot.iter().any(|(r, seen)| {
            let idx = touched.iter().position(|t| Arc::ptr_eq(t, r)).unwrap();
            *guards[idx] != *seen
        });
        if conflict {
            drop(guards);
            continue;
        }

        let mut guards = guards;
        for (r, v) in writes.lock().drain(..) {
            let idx = touched.iter().position(|t| Arc::ptr_eq(t, &r)).unwrap();
            *guards[idx] = v;
        }
        return Ok(result);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn atom_swap_applies_function_to_current_value() {
        let a = Atom::new(Value::Int(1));
        let result = a.swap(|v| match v {
            Value::Int(n) => Ok(Value::Int(n + 1)),
            _ => unreachable!(),
        });
        assert_eq!(result.unwrap(), Value::Int(2));
        assert_eq!(a.deref(), Value::Int(2));
    }

    #[test]
    fn atom_compare_and_set_fails_on_stale_expectation() {
        let a = Atom::new(Value::Int(1));
        a.reset(Value::Int(2)).unwrap();
        assert!(!a.compare_and_set(&Value::Int(1), Value::Int(99)).unwrap());
        assert!(a.compare_and_set(&Value::Int(2), Value::Int(99)).unwrap());
        assert_eq!(a.deref(), Value::Int(99));
    }

    #[test]
    fn atom_validator_rejects_updates_that_fail_the_predicate() {
        let a = Atom::new(Value::Int(1));
        a.set_validator(|v| matches!(v, Value::Int(n) if *n >= 0));
        assert!(a.reset(Value::Int(5)).is_ok());
        assert!(a.reset(Value::Int(-1)).is_err());
        assert_eq!(a.deref(), Value::Int(5));

        let swapped = a.swap(|v| match v {
            Value::Int(n) => Ok(Value::Int(n - 10)),
            _ => unreachable!(),
        });
        assert!(swapped.is_err());
        assert_eq!(a.deref(), Value::Int(5));

        assert!(a.compare_and_set(&Value::Int(5), Value::Int(-2)).is_err());
        assert_eq!(a.deref(), Value::Int(5));
    }

    #[test]
    fn delay_only_runs_its_thunk_once() {
        let calls = Arc::new(Mutex::new(0));
        let calls2 = calls.clone();
        let d = Delay::new(move || {
            *calls2.lock() += 1;
            Ok(Value::Int(42))
        });
        assert!(!d.is_realized());
        assert_eq!(d.force().unwrap(), Value::Int(42));
        assert_eq!(d.force().unwrap(), Value::Int(42));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn transaction_commits_writes_to_every_touched_ref() {
        let a = Ref::new(Value::Int(1));
        let b = Ref::new(Value::Int(10));
        let result = run_transaction(&[a.clone(), b.clone()], |txn| {
            let av = txn.alter(&a, |v| match v {
                Value::Int(n) => Ok(Value::Int(n + 1)),
                _ => unreachable!(),
            })?;
            txn.set(&b, Value::Int(99));
            Ok(av)
        });
        assert_eq!(result.unwrap(), Value::Int(2));
        assert_eq!(a.deref(), Value::Int(2));
        assert_eq!(b.deref(), Value::Int(99));
    }
}
