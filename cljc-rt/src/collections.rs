//! Persistent, structurally-shared collections backing `Value`'s `List`,
//! `Vector`, `Map`, and `Set` variants. Map and set reuse
//! `immutable_chunkmap`'s HAMT-like `MapS`/`SetS` the way the compiler's own
//! environment and node-graph caches do (`graphix-compiler::env`,
//! `graphix-compiler::node::map`); vectors borrow `im::Vector`'s RRB-tree for
//! indexed structural sharing, since the chunkmap crate has no vector
//! analog. Lists are a plain `Arc`-linked cons chain: the only shape the
//! source language's `cons`/`first`/`rest` need, and already the pattern
//! `triomphe::Arc` is used for everywhere else in this codebase.

use crate::Value;
use immutable_chunkmap::{map::MapS, set::SetS};
use std::fmt;
use triomphe::Arc;

/// A cons cell chain. `nil` is `None`; `(cons x xs)` prepends in O(1) and
/// shares the tail with every other list that already held it.
#[derive(Clone)]
pub struct PersistentList(Option<Arc<Node>>);

struct Node {
    head: Value,
    tail: Option<Arc<Node>>,
    len: usize,
}

impl PersistentList {
    pub fn empty() -> Self {
        PersistentList(None)
    }

    pub fn from_iter(items: impl IntoIterator<Item = Value, IntoIter: DoubleEndedIterator>) -> Self {
        let mut out = Self::empty();
        for v in items.into_iter().rev() {
            out = out.cons(v);
        }
        out
    }

    pub fn cons(&self, v: Value) -> Self {
        let len = self.len() + 1;
        PersistentList(Some(Arc::new(Node { head: v, tail: self.0.clone(), len })))
    }

    pub fn first(&self) -> Option<&Value> {
        self.0.as_ref().map(|n| &n.head)
    }

    pub fn rest(&self) -> PersistentList {
        match &self.0 {
            None => PersistentList(None),
            Some(n) => PersistentList(n.tail.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map(|n| n.len).unwrap_or(0)
    }

    pub fn iter(&self) -> PersistentListIter<'_> {
        PersistentListIter(self.0.as_deref())
    }
}

pub struct PersistentListIter<'a>(Option<&'a Node>);

impl<'a> Iterator for PersistentListIter<'a> {
    type Item = &'a Value;
    fn next(&mut self) -> Option<&'a Value> {
        let n = self.0?;
        self.0 = n.tail.as_deref();
        Some(&n.head)
    }
}

impl fmt::Debug for PersistentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for PersistentList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

/// Indexed, 0-based persistent vector. `conj` grows at the tail, matching
/// the source language's vector semantics (as opposed to list, which grows
/// at the head).
#[derive(Clone, Debug, PartialEq)]
pub struct PersistentVector(im::Vector<Value>);

impl PersistentVector {
    pub fn empty() -> Self {
        PersistentVector(im::Vector::new())
    }

    pub fn from_iter(items: impl IntoIterator<Item = Value>) -> Self {
        PersistentVector(items.into_iter().collect())
    }

    pub fn conj(&self, v: Value) -> Self {
        let mut out = self.0.clone();
        out.push_back(v);
        PersistentVector(out)
    }

    pub fn pop(&self) -> Self {
        let mut out = self.0.clone();
        out.pop_back();
        PersistentVector(out)
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.0.get(idx)
    }

    pub fn assoc(&self, idx: usize, v: Value) -> anyhow::Result<Self> {
        if idx > self.0.len() {
            anyhow::bail!("index {idx} out of bounds for vector of length {}", self.0.len());
        }
        let mut out = self.0.clone();
        if idx == out.len() {
            out.push_back(v);
        } else {
            out.set(idx, v);
        }
        Ok(PersistentVector(out))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> im::vector::Iter<'_, Value> {
        self.0.iter()
    }

    /// Hands off this vector's backing tree to a `TransientVector` for bulk
    /// construction: `im::Vector::push_back` mutates in place rather than
    /// copying-on-write once the `Arc` it's built on is uniquely owned, the
    /// same free lunch `mapv`/`filterv`/`vec` lean on instead of growing a
    /// plain `Vec` and converting at the end.
    pub fn transient(&self) -> TransientVector {
        TransientVector(self.0.clone())
    }
}

/// A vector mid-bulk-construction: `conj` grows it without re-wrapping a
/// fresh `PersistentVector` on every element, then `persistent` seals it
/// back into one. Mirrors the source language's `transient`/`conj!`/
/// `persistent!` triad; there is no separate mutable representation here,
/// since `im::Vector` already mutates in place whenever its `Arc` isn't
/// shared — this type exists to give that fast path a name at the call
/// site instead of making every eager consumer thread a bare `Vec`.
pub struct TransientVector(im::Vector<Value>);

impl TransientVector {
    pub fn conj(&mut self, v: Value) -> &mut Self {
        self.0.push_back(v);
        self
    }

    pub fn persistent(self) -> PersistentVector {
        PersistentVector(self.0)
    }
}

/// Unordered persistent map. Each mutator clones `self`'s chunkmap handle
/// and mutates the clone cheaply via copy-on-write (`insert_cow`/
/// `remove_cow`), the same pattern `Map::compile`'s `Update::update` uses
/// to build a fresh `CMap` per firing.
#[derive(Clone)]
pub struct PersistentMap(MapS<Value, Value>);

impl PersistentMap {
    pub fn empty() -> Self {
        PersistentMap(MapS::new())
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut m = MapS::new();
        for (k, v) in pairs {
            m.insert_cow(k, v);
        }
        PersistentMap(m)
    }

    pub fn assoc(&self, k: Value, v: Value) -> Self {
        let mut m = self.0.clone();
        m.insert_cow(k, v);
        PersistentMap(m)
    }

    pub fn dissoc(&self, k: &Value) -> Self {
        let mut m = self.0.clone();
        m.remove_cow(k);
        PersistentMap(m)
    }

    pub fn get(&self, k: &Value) -> Option<&Value> {
        self.0.get(k)
    }

    pub fn contains_key(&self, k: &Value) -> bool {
        self.0.get(k).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.0.iter()
    }

    pub fn transient(&self) -> TransientMap {
        TransientMap(self.0.clone())
    }
}

/// A map mid-bulk-construction, mirroring `TransientVector`'s contract over
/// `MapS`'s copy-on-write `insert_cow`/`remove_cow`.
pub struct TransientMap(MapS<Value, Value>);

impl TransientMap {
    pub fn assoc(&mut self, k: Value, v: Value) -> &mut Self {
        self.0.insert_cow(k, v);
        self
    }

    pub fn dissoc(&mut self, k: &Value) -> &mut Self {
        self.0.remove_cow(k);
        self
    }

    pub fn persistent(self) -> PersistentMap {
        PersistentMap(self.0)
    }
}

impl fmt::Debug for PersistentMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl PartialEq for PersistentMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

/// Unordered persistent set, mirroring `PersistentMap`'s copy-on-write
/// mutation style over `SetS`.
#[derive(Clone)]
pub struct PersistentSet(SetS<Value>);

impl PersistentSet {
    pub fn empty() -> Self {
        PersistentSet(SetS::new())
    }

    pub fn from_iter(items: impl IntoIterator<Item = Value>) -> Self {
        let mut s = SetS::new();
        for v in items {
            s.insert_cow(v);
        }
        PersistentSet(s)
    }

    pub fn conj(&self, v: Value) -> Self {
        let mut s = self.0.clone();
        s.insert_cow(v);
        PersistentSet(s)
    }

    pub fn disj(&self, v: &Value) -> Self {
        let mut s = self.0.clone();
        s.remove_cow(v);
        PersistentSet(s)
    }

    pub fn contains(&self, v: &Value) -> bool {
        self.0.get(v).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    pub fn transient(&self) -> TransientSet {
        TransientSet(self.0.clone())
    }
}

/// A set mid-bulk-construction, mirroring `TransientVector`'s contract over
/// `SetS`'s copy-on-write `insert_cow`/`remove_cow`.
pub struct TransientSet(SetS<Value>);

impl TransientSet {
    pub fn conj(&mut self, v: Value) -> &mut Self {
        self.0.insert_cow(v);
        self
    }

    pub fn disj(&mut self, v: &Value) -> &mut Self {
        self.0.remove_cow(v);
        self
    }

    pub fn persistent(self) -> PersistentSet {
        PersistentSet(self.0)
    }
}

impl fmt::Debug for PersistentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl PartialEq for PersistentSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| other.contains(v))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn list_cons_shares_the_tail() {
        let base = PersistentList::empty().cons(Value::Int(2)).cons(Value::Int(1));
        let extended = base.rest().cons(Value::Int(9));
        assert_eq!(base.len(), 2);
        assert_eq!(extended.first(), Some(&Value::Int(9)));
        assert_eq!(base.first(), Some(&Value::Int(1)));
    }

    #[test]
    fn vector_assoc_past_the_end_appends() {
        let v = PersistentVector::from_iter([Value::Int(1), Value::Int(2)]);
        let v2 = v.assoc(2, Value::Int(3)).unwrap();
        assert_eq!(v2.len(), 3);
        assert!(v.assoc(5, Value::Int(0)).is_err());
    }

    #[test]
    fn map_assoc_and_dissoc_do_not_mutate_the_original() {
        let m = PersistentMap::empty().assoc(Value::Keyword(None, "a".into()), Value::Int(1));
        let m2 = m.assoc(Value::Keyword(None, "b".into()), Value::Int(2));
        assert_eq!(m.len(), 1);
        assert_eq!(m2.len(), 2);
        let m3 = m2.dissoc(&Value::Keyword(None, "a".into()));
        assert_eq!(m3.len(), 1);
        assert!(m3.get(&Value::Keyword(None, "a".into())).is_none());
    }

    #[test]
    fn set_conj_is_idempotent() {
        let s = PersistentSet::empty().conj(Value::Int(1)).conj(Value::Int(1));
        assert_eq!(s.len(), 1);
        assert!(s.contains(&Value::Int(1)));
    }

    #[test]
    fn transient_vector_builds_then_seals_back_to_persistent() {
        let mut t = PersistentVector::empty().transient();
        for i in 0..5 {
            t.conj(Value::Int(i));
        }
        let v = t.persistent();
        assert_eq!(v.len(), 5);
        assert_eq!(v.get(4), Some(&Value::Int(4)));
    }

    #[test]
    fn transient_vector_does_not_mutate_the_source_it_was_taken_from() {
        let base = PersistentVector::from_iter([Value::Int(1), Value::Int(2)]);
        let mut t = base.transient();
        t.conj(Value::Int(3));
        let grown = t.persistent();
        assert_eq!(base.len(), 2);
        assert_eq!(grown.len(), 3);
    }

    #[test]
    fn transient_map_assoc_dissoc_round_trips_through_persistent() {
        let mut t = PersistentMap::empty().transient();
        t.assoc(Value::Keyword(None, "a".into()), Value::Int(1));
        t.assoc(Value::Keyword(None, "b".into()), Value::Int(2));
        t.dissoc(&Value::Keyword(None, "a".into()));
        let m = t.persistent();
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(&Value::Keyword(None, "b".into())), Some(&Value::Int(2)));
    }

    #[test]
    fn transient_set_conj_disj_round_trips_through_persistent() {
        let mut t = PersistentSet::empty().transient();
        t.conj(Value::Int(1)).conj(Value::Int(2));
        t.disj(&Value::Int(1));
        let s = t.persistent();
        assert_eq!(s.len(), 1);
        assert!(s.contains(&Value::Int(2)));
    }
}
