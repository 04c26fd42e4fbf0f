//! Lazy, possibly chunked sequences: the `Seq` protocol
//! (`first`/`next`/`cons`) every sequenceable value presents, `ChunkedCons`
//! for sequences that realize 32 elements at a time instead of one, and the
//! map-fusion optimization that collapses `(map f (map g xs))` into one
//! traversal instead of two nested wrapper seqs.

use crate::collections::{PersistentList, PersistentVector};
use crate::Value;
use std::any::Any;
use std::fmt;
use triomphe::Arc;

pub const CHUNK_SIZE: usize = 32;

/// `first`/`next`/`cons` — every lazy and eager sequence source implements
/// this. `next` returns `None` once nothing is left, matching the source
/// language's `(next s)` returning `nil` rather than an empty seq.
pub trait Seq: fmt::Debug + Send + Sync {
    fn first(&self) -> Option<Value>;
    fn next(&self) -> Option<Arc<dyn Seq>>;
    fn as_any(&self) -> &dyn Any;
}

/// `more`: like `next`, but never `nil` — callers that want to keep
/// chaining without a `match` get the empty seq sentinel instead.
pub fn more(s: &Arc<dyn Seq>) -> Arc<dyn Seq> {
    s.next().unwrap_or_else(empty)
}

#[derive(Debug)]
struct EmptySeq;

impl Seq for EmptySeq {
    fn first(&self) -> Option<Value> {
        None
    }
    fn next(&self) -> Option<Arc<dyn Seq>> {
        None
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn empty() -> Arc<dyn Seq> {
    Arc::new(EmptySeq)
}

pub fn is_empty(s: &Arc<dyn Seq>) -> bool {
    s.first().is_none()
}

/// One realized head prepended onto an arbitrary tail seq.
#[derive(Debug)]
struct Cons {
    head: Value,
    tail: Arc<dyn Seq>,
}

impl Seq for Cons {
    fn first(&self) -> Option<Value> {
        Some(self.head.clone())
    }
    fn next(&self) -> Option<Arc<dyn Seq>> {
        if is_empty(&self.tail) {
            None
        } else {
            Some(self.tail.clone())
        }
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn cons(head: Value, tail: Arc<dyn Seq>) -> Arc<dyn Seq> {
    Arc::new(Cons { head, tail })
}

/// A sequence that realizes `CHUNK_SIZE` elements at a time. `first`/`next`
/// walk within the current chunk by index before falling through to
/// `rest`, so a `reduce` over a chunked seq touches the backing array once
/// per chunk instead of allocating one cons cell per element.
#[derive(Debug, Clone)]
pub struct ChunkedCons {
    chunk: Arc<[Value]>,
    offset: usize,
    rest: Arc<dyn Seq>,
}

impl Seq for ChunkedCons {
    fn first(&self) -> Option<Value> {
        self.chunk.get(self.offset).cloned()
    }

    fn next(&self) -> Option<Arc<dyn Seq>> {
        if self.offset + 1 < self.chunk.len() {
            Some(Arc::new(ChunkedCons { chunk: self.chunk.clone(), offset: self.offset + 1, rest: self.rest.clone() }))
        } else if is_empty(&self.rest) {
            None
        } else {
            Some(self.rest.clone())
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds a chunked sequence over `items`, `CHUNK_SIZE` elements per node.
pub fn chunked_from_slice(items: &[Value]) -> Arc<dyn Seq> {
    let mut seq = empty();
    for chunk in items.chunks(CHUNK_SIZE).collect::<Vec<_>>().into_iter().rev() {
        seq = Arc::new(ChunkedCons { chunk: Arc::from(chunk), offset: 0, rest: seq });
    }
    seq
}

pub fn seq_of_vector(v: &PersistentVector) -> Arc<dyn Seq> {
    let items: Vec<Value> = v.iter().cloned().collect();
    chunked_from_slice(&items)
}

pub fn seq_of_list(l: &PersistentList) -> Arc<dyn Seq> {
    let items: Vec<Value> = l.iter().cloned().collect();
    let mut seq = empty();
    for v in items.into_iter().rev() {
        seq = cons(v, seq);
    }
    seq
}

pub type MapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// `map`'s lazy wrapper. Fuses with an existing `MapSeq` source instead of
/// nesting: `map(g, map(f, xs))` ends up as one `MapSeq` over `xs` with
/// `fns = [f, g]`, one traversal instead of two.
pub struct MapSeq {
    source: Arc<dyn Seq>,
    fns: Vec<MapFn>,
}

impl fmt::Debug for MapSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<mapseq fns={}>", self.fns.len())
    }
}

impl Seq for MapSeq {
    fn first(&self) -> Option<Value> {
        self.source.first().map(|v| self.fns.iter().fold(v, |acc, f| f(&acc)))
    }

    fn next(&self) -> Option<Arc<dyn Seq>> {
        self.source.next().map(|rest| Arc::new(MapSeq { source: rest, fns: self.fns.clone() }) as Arc<dyn Seq>)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn map(f: MapFn, s: Arc<dyn Seq>) -> Arc<dyn Seq> {
    match s.as_any().downcast_ref::<MapSeq>() {
        Some(existing) => {
            let mut fns = existing.fns.clone();
            fns.push(f);
            Arc::new(MapSeq { source: existing.source.clone(), fns })
        }
        None => Arc::new(MapSeq { source: s, fns: vec![f] }),
    }
}

pub type Pred = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// `filter`'s lazy wrapper: skips non-matching elements at both `first`
/// and `next` so an exhausted filter never returns a seq whose `first` is
/// `None` mid-chain.
pub struct FilterSeq {
    source: Arc<dyn Seq>,
    pred: Pred,
}

impl fmt::Debug for FilterSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<filterseq>")
    }
}

impl FilterSeq {
    fn skip_to_match(mut cur: Arc<dyn Seq>, pred: &Pred) -> Option<Arc<dyn Seq>> {
        loop {
            match cur.first() {
                None => return None,
                Some(v) if pred(&v) => return Some(cur),
                Some(_) => match cur.next() {
                    Some(n) => cur = n,
                    None => return None,
                },
            }
        }
    }
}

impl Seq for FilterSeq {
    fn first(&self) -> Option<Value> {
        Self::skip_to_match(self.source.clone(), &self.pred)?.first()
    }

    fn next(&self) -> Option<Arc<dyn Seq>> {
        let matched = Self::skip_to_match(self.source.clone(), &self.pred)?;
        let rest = matched.next()?;
        Some(Arc::new(FilterSeq { source: rest, pred: self.pred.clone() }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn filter(pred: Pred, s: Arc<dyn Seq>) -> Arc<dyn Seq> {
    Arc::new(FilterSeq { source: s, pred })
}

/// Eagerly drains a seq into a plain `Vec`, the building block every eager
/// consumer (`mapv`, `filterv`, `vec`) shares.
pub fn drain(mut s: Arc<dyn Seq>) -> Vec<Value> {
    let mut out = Vec::new();
    loop {
        match s.first() {
            None => break,
            Some(v) => {
                out.push(v);
                match s.next() {
                    Some(n) => s = n,
                    None => break,
                }
            }
        }
    }
    out
}

pub fn mapv(f: impl Fn(&Value) -> Value, s: Arc<dyn Seq>) -> PersistentVector {
    let mut t = PersistentVector::empty().transient();
    for v in drain(s).iter().map(f) {
        t.conj(v);
    }
    t.persistent()
}

pub fn filterv(p: impl Fn(&Value) -> bool, s: Arc<dyn Seq>) -> PersistentVector {
    let mut t = PersistentVector::empty().transient();
    for v in drain(s).into_iter().filter(|v| p(v)) {
        t.conj(v);
    }
    t.persistent()
}

pub fn vec_of(s: Arc<dyn Seq>) -> PersistentVector {
    let mut t = PersistentVector::empty().transient();
    for v in drain(s) {
        t.conj(v);
    }
    t.persistent()
}

#[cfg(test)]
mod test {
    use super::*;

    fn ints(n: i64) -> Vec<Value> {
        (0..n).map(Value::Int).collect()
    }

    #[test]
    fn chunked_cons_realizes_elements_across_a_chunk_boundary() {
        let items = ints(35);
        let seq = chunked_from_slice(&items);
        assert_eq!(drain(seq), items);
    }

    #[test]
    fn cons_prepends_without_disturbing_the_tail() {
        let tail = chunked_from_slice(&ints(3));
        let seq = cons(Value::Int(-1), tail.clone());
        assert_eq!(seq.first(), Some(Value::Int(-1)));
        assert_eq!(drain(tail), ints(3));
    }

    #[test]
    fn map_fusion_collapses_nested_maps_into_one_wrapper() {
        let seq = chunked_from_slice(&ints(3));
        let once = map(Arc::new(|v: &Value| match v {
            Value::Int(n) => Value::Int(n + 1),
            _ => unreachable!(),
        }), seq);
        let twice = map(Arc::new(|v: &Value| match v {
            Value::Int(n) => Value::Int(n * 10),
            _ => unreachable!(),
        }), once);
        let fused = twice.as_any().downcast_ref::<MapSeq>().expect("fused into one MapSeq");
        assert_eq!(fused.fns.len(), 2);
        assert_eq!(drain(twice), vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn filter_seq_skips_non_matching_elements() {
        let seq = chunked_from_slice(&ints(6));
        let evens = filter(Arc::new(|v: &Value| matches!(v, Value::Int(n) if n % 2 == 0)), seq);
        assert_eq!(drain(evens), vec![Value::Int(0), Value::Int(2), Value::Int(4)]);
    }

    #[test]
    fn mapv_builds_a_vector_eagerly() {
        let seq = chunked_from_slice(&ints(3));
        let v = mapv(|v| match v {
            Value::Int(n) => Value::Int(n + 100),
            _ => unreachable!(),
        }, seq);
        assert_eq!(v.len(), 3);
        assert_eq!(v.get(0), Some(&Value::Int(100)));
    }
}
