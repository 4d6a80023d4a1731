//! Operator Library
//!
//! Typed constructors for the built-in operators. Each one wraps the user's
//! closure so it works on type-erased values, then asks the engine for a node
//! with the matching [`Operator`], initial-value rule and end policy.
//!
//! | Operator | Initial value | Ends when |
//! |---|---|---|
//! | `map` | `f(parent)` if the parent has a value | the parent ends |
//! | `filter` | the parent's value if it passes | the parent ends |
//! | `uniq` | the parent's value | the parent ends |
//! | `reduce` / `fold` | see below | the parent ends |
//! | `combine` | `f(values)` if any parent has a value | any parent ends |
//! | `combine_when_all` | `f(values)` once every parent has a value | any parent ends |
//! | `merge` | value of the most recently updated parent | every parent has ended |
//! | `flat_map` | none | the outer stream and every inner stream have ended |

use std::sync::Arc;

use crate::error::Result;
use crate::graph::{downcast, NodeRef, Value};

use super::engine::{Engine, NodeSpec};
use super::operator::{
    CombineFn, EqFn, FlatMapFn, FlatMapState, MapFn, Operator, ParentEnded, PredicateFn,
    ReduceConfig, ReduceFn, Update,
};
use super::stream::{Data, Stream, StreamRef};

impl<T: Data> Stream<T> {
    fn derive_one<U: Data>(&self, spec: NodeSpec) -> Result<Stream<U>> {
        let node = self
            .shared()
            .create(std::slice::from_ref(self.node()), spec)?;
        Ok(self.engine().wrap(node))
    }

    /// A stream of `f` applied to every value.
    pub fn map<U, F>(&self, f: F) -> Result<Stream<U>>
    where
        U: Data,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let f: MapFn = Arc::new(move |value: &Value| Arc::new(f(downcast::<T>(value))) as Value);
        self.derive_one(NodeSpec::derived(Update::Derived(Operator::Map(f))))
    }

    /// A stream of the values for which `f` returns `true`.
    pub fn filter<F>(&self, f: F) -> Result<Stream<T>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let f: PredicateFn = Arc::new(move |value: &Value| f(downcast::<T>(value)));
        self.derive_one(NodeSpec::derived(Update::Derived(Operator::Filter(f))))
    }

    /// A stream that skips values equal to the one it already holds.
    pub fn uniq(&self) -> Result<Stream<T>>
    where
        T: PartialEq,
    {
        let eq: EqFn = Arc::new(|current: &Value, next: &Value| {
            downcast::<T>(current) == downcast::<T>(next)
        });
        self.derive_one(NodeSpec::derived(Update::Derived(Operator::Uniq(eq))))
    }

    /// Accumulate values with `f`, starting from the first value.
    pub fn reduce<F>(&self, f: F) -> Result<Stream<T>>
    where
        F: Fn(&T, &T) -> T + Send + Sync + 'static,
    {
        let combine: ReduceFn = Arc::new(move |acc: &Value, value: &Value| {
            Arc::new(f(downcast::<T>(acc), downcast::<T>(value))) as Value
        });
        self.reduce_with(ReduceConfig {
            combine,
            initial: None,
        })
    }

    /// Accumulate values with `f`, starting from `initial`.
    ///
    /// The stream holds `initial` until the first value arrives; if the
    /// parent already has a value, it starts at `f(initial, value)`.
    pub fn fold<A, F>(&self, initial: A, f: F) -> Result<Stream<A>>
    where
        A: Data,
        F: Fn(&A, &T) -> A + Send + Sync + 'static,
    {
        let combine: ReduceFn = Arc::new(move |acc: &Value, value: &Value| {
            Arc::new(f(downcast::<A>(acc), downcast::<T>(value))) as Value
        });
        self.reduce_with(ReduceConfig {
            combine,
            initial: Some(Arc::new(initial)),
        })
    }

    fn reduce_with<A: Data>(&self, config: ReduceConfig) -> Result<Stream<A>> {
        let mut spec = NodeSpec::derived(Update::Derived(Operator::Reduce(config.combine)));
        spec.initial = config.initial;
        self.derive_one(spec)
    }

    /// A stream of every value seen so far.
    pub fn collect(&self) -> Result<Stream<Vec<T>>>
    where
        T: Clone,
    {
        self.fold(Vec::new(), |acc: &Vec<T>, value: &T| {
            let mut next = Vec::with_capacity(acc.len() + 1);
            next.extend_from_slice(acc);
            next.push(value.clone());
            next
        })
    }

    /// Follow the stream `f` returns for each value.
    ///
    /// Values of every returned stream flow into the result, except that a
    /// newly returned stream's current value is only taken if it is at least
    /// as recent as the last value taken from an earlier one.
    pub fn flat_map<U, F>(&self, f: F) -> Result<Stream<U>>
    where
        U: Data,
        F: Fn(&T) -> Stream<U> + Send + Sync + 'static,
    {
        self.try_flat_map(move |value| Ok(f(value)))
    }

    /// Like [`Stream::flat_map`], for functions that can fail. An error is
    /// returned from the `set` that triggered it.
    pub fn try_flat_map<U, F>(&self, f: F) -> Result<Stream<U>>
    where
        U: Data,
        F: Fn(&T) -> Result<Stream<U>> + Send + Sync + 'static,
    {
        let f: FlatMapFn =
            Arc::new(move |value: &Value| f(downcast::<T>(value)).map(StreamRef::from));
        self.derive_one(NodeSpec {
            update: Update::Derived(Operator::FlatMap {
                f,
                state: FlatMapState::default(),
            }),
            on_parent_ended: ParentEnded::ReleaseFinishedParent,
            initial: None,
            initial_version: 0,
            evaluate_initially: false,
        })
    }
}

impl Engine {
    fn derive_many<T: Data, U: Data>(
        &self,
        streams: &[&Stream<T>],
        spec: NodeSpec,
    ) -> Result<Stream<U>> {
        let parents: Vec<NodeRef> = streams.iter().map(|s| Arc::clone(s.node())).collect();
        let node = self.shared().create(&parents, spec)?;
        Ok(self.wrap(node))
    }

    /// A stream of `f` applied to the values of `streams`, recomputed when
    /// any of them updates. Streams without a value are passed as `None`.
    pub fn combine<T, U, F>(&self, streams: &[&Stream<T>], f: F) -> Result<Stream<U>>
    where
        T: Data,
        U: Data,
        F: Fn(&[Option<&T>]) -> U + Send + Sync + 'static,
    {
        let f: CombineFn = Arc::new(move |values: &[Option<Value>]| {
            let typed: Vec<Option<&T>> = values
                .iter()
                .map(|value| value.as_ref().map(downcast::<T>))
                .collect();
            Arc::new(f(&typed)) as Value
        });
        self.derive_many(
            streams,
            NodeSpec::derived(Update::Derived(Operator::Combine(f))),
        )
    }

    /// Like [`Engine::combine`], but waits until every stream has a value.
    pub fn combine_when_all<T, U, F>(&self, streams: &[&Stream<T>], f: F) -> Result<Stream<U>>
    where
        T: Data,
        U: Data,
        F: Fn(&[&T]) -> U + Send + Sync + 'static,
    {
        let f: CombineFn = Arc::new(move |values: &[Option<Value>]| {
            let typed: Vec<&T> = values.iter().flatten().map(downcast::<T>).collect();
            Arc::new(f(&typed)) as Value
        });
        self.derive_many(
            streams,
            NodeSpec::derived(Update::Derived(Operator::CombineWhenAll(f))),
        )
    }

    /// A stream of the values of all `streams`.
    ///
    /// When several streams update in the same tick, the one listed last
    /// wins. The merged stream starts with the value of the stream that was
    /// updated most recently, again preferring later streams on a tie.
    pub fn merge<T: Data>(&self, streams: &[&Stream<T>]) -> Result<Stream<T>> {
        let mut newest: Option<(Value, u64)> = None;
        for stream in streams {
            let (value, version) = {
                let inner = stream.node().lock();
                (inner.value.clone(), inner.version)
            };
            if let Some(value) = value {
                if newest.as_ref().map_or(true, |(_, v)| version >= *v) {
                    newest = Some((value, version));
                }
            }
        }

        let (initial, initial_version) = match newest {
            Some((value, version)) => (Some(value), version),
            None => (None, 0),
        };
        self.derive_many(
            streams,
            NodeSpec {
                update: Update::Derived(Operator::Merge),
                on_parent_ended: ParentEnded::EndWhenAllParentsEnded,
                initial,
                initial_version,
                evaluate_initially: false,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn record<T: Data + Clone>(stream: &Stream<T>) -> Arc<Mutex<Vec<T>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        stream.for_each(move |value: &T| sink.lock().push(value.clone()));
        seen
    }

    #[test]
    fn map_takes_initial_value_from_parent() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        s.set(2).unwrap();

        let squared = s.map(|n| n * n).unwrap();
        assert_eq!(squared.value(), Some(4));

        s.set(3).unwrap();
        assert_eq!(squared.value(), Some(9));
    }

    #[test]
    fn map_of_empty_parent_has_no_value() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let mapped = s.map(|n| n + 1).unwrap();
        assert!(!mapped.has_value());
    }

    #[test]
    fn filter_initial_value_respects_predicate() {
        let engine = Engine::new();
        let odd = engine.source::<i32>();
        odd.set(3).unwrap();
        let even = engine.source::<i32>();
        even.set(4).unwrap();

        assert_eq!(odd.filter(|n| n % 2 == 1).unwrap().value(), Some(3));
        assert!(!even.filter(|n| n % 2 == 1).unwrap().has_value());
    }

    #[test]
    fn filter_keeps_last_passing_value() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let evens = s.filter(|n| n % 2 == 0).unwrap();
        let seen = record(&evens);

        for n in 1..=6 {
            s.set(n).unwrap();
        }
        assert_eq!(*seen.lock(), vec![2, 4, 6]);
        s.set(7).unwrap();
        assert_eq!(evens.value(), Some(6));
    }

    #[test]
    fn uniq_drops_repeats() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let unique = s.uniq().unwrap();
        let seen = record(&unique);

        for n in [1, 1, 2, 2, 5, 6, 6] {
            s.set(n).unwrap();
        }
        assert_eq!(*seen.lock(), vec![1, 2, 5, 6]);
    }

    #[test]
    fn reduce_starts_from_first_value() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let sum = s.reduce(|a, b| a + b).unwrap();
        assert!(!sum.has_value());

        s.set(1).unwrap();
        assert_eq!(sum.value(), Some(1));
        s.set(2).unwrap();
        s.set(3).unwrap();
        assert_eq!(sum.value(), Some(6));
    }

    #[test]
    fn fold_initial_value_rules() {
        let engine = Engine::new();
        let empty = engine.source::<i32>();
        assert_eq!(empty.fold(10, |a, b| a + b).unwrap().value(), Some(10));

        let full = engine.source::<i32>();
        full.set(5).unwrap();
        assert_eq!(full.fold(10, |a, b| a + b).unwrap().value(), Some(15));
    }

    #[test]
    fn collect_gathers_values() {
        let engine = Engine::new();
        let s = engine.source::<char>();
        let all = s.collect().unwrap();
        assert_eq!(all.value(), Some(vec![]));

        s.set('a').unwrap();
        s.set('b').unwrap();
        assert_eq!(all.value(), Some(vec!['a', 'b']));
    }

    #[test]
    fn combine_passes_missing_values() {
        let engine = Engine::new();
        let a = engine.source::<i32>();
        let b = engine.source::<i32>();
        let pairs = engine
            .combine(&[&a, &b], |values| (values[0].copied(), values[1].copied()))
            .unwrap();
        assert!(!pairs.has_value());

        a.set(1).unwrap();
        assert_eq!(pairs.value(), Some((Some(1), None)));
        b.set(2).unwrap();
        assert_eq!(pairs.value(), Some((Some(1), Some(2))));
    }

    #[test]
    fn combine_when_all_waits_for_every_parent() {
        let engine = Engine::new();
        let a = engine.source::<i32>();
        let b = engine.source::<i32>();
        let sum = engine
            .combine_when_all(&[&a, &b], |values| values.iter().copied().sum::<i32>())
            .unwrap();

        a.set(1).unwrap();
        assert!(!sum.has_value());
        b.set(2).unwrap();
        assert_eq!(sum.value(), Some(3));
    }

    #[test]
    fn merge_starts_with_most_recent_parent() {
        let engine = Engine::new();
        let a = engine.source::<&'static str>();
        let b = engine.source::<&'static str>();
        b.set("b").unwrap();
        a.set("a").unwrap();

        let merged = engine.merge(&[&a, &b]).unwrap();
        assert_eq!(merged.value(), Some("a"));
        assert_eq!(merged.version(), a.version());
    }

    #[test]
    fn merge_starts_with_later_parent_on_equal_versions() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        s.set(1).unwrap();
        let low = s.map(|n| n * 10).unwrap();
        let high = s.map(|n| n * 100).unwrap();
        assert_eq!(low.version(), high.version());

        let merged = engine.merge(&[&low, &high]).unwrap();
        assert_eq!(merged.value(), Some(100));
        let reversed = engine.merge(&[&high, &low]).unwrap();
        assert_eq!(reversed.value(), Some(10));
    }

    #[test]
    fn merge_prefers_later_argument_in_same_tick() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let low = s.map(|n| n * 10).unwrap();
        let high = s.map(|n| n * 100).unwrap();
        let merged = engine.merge(&[&low, &high]).unwrap();
        let seen = record(&merged);

        s.set(1).unwrap();
        assert_eq!(*seen.lock(), vec![100]);
    }

    #[test]
    fn flat_map_follows_inner_streams() {
        let engine = Engine::new();
        let outer = engine.source::<i32>();
        let inners: Vec<Stream<String>> = (0..2).map(|_| engine.source()).collect();
        let lookup = inners.clone();
        let flat = outer.flat_map(move |i| lookup[*i as usize].clone()).unwrap();

        outer.set(0).unwrap();
        inners[0].set("x".to_string()).unwrap();
        assert_eq!(flat.value(), Some("x".to_string()));

        outer.set(1).unwrap();
        inners[1].set("y".to_string()).unwrap();
        inners[0].set("z".to_string()).unwrap();
        assert_eq!(flat.value(), Some("z".to_string()));
    }

    #[test]
    fn flat_map_ignores_stale_inner_value() {
        let engine = Engine::new();
        let old = engine.source::<i32>();
        old.set(1).unwrap();
        let fresh = engine.source::<i32>();
        fresh.set(2).unwrap();

        let outer = engine.source::<bool>();
        let (first, second) = (fresh.clone(), old.clone());
        let flat = outer
            .flat_map(move |pick_fresh| if *pick_fresh { first.clone() } else { second.clone() })
            .unwrap();

        outer.set(true).unwrap();
        assert_eq!(flat.value(), Some(2));
        outer.set(false).unwrap();
        assert_eq!(flat.value(), Some(2));
    }

    #[test]
    fn flat_map_rejects_foreign_streams() {
        let engine = Engine::new();
        let other = Engine::new();
        let foreign = other.source::<i32>();
        let outer = engine.source::<i32>();
        let flat = outer.flat_map(move |_| foreign.clone()).unwrap();

        let err = outer.set(1).err();
        assert!(matches!(err, Some(crate::StreamError::NotAStream(_))));
        assert!(!flat.has_value());
    }
}
