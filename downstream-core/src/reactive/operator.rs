//! Evaluation behaviour of nodes.
//!
//! Every node carries an [`Update`]: either `Source`, which cannot be
//! evaluated, or `Derived` with one of the built-in operators and the state
//! it needs. Dispatch is a plain `match`, so adding an operator means adding
//! a variant and its arm here.
//!
//! User closures are stored type-erased. The typed wrappers that build them
//! live in `operators.rs`; by the time a closure lands here it works on
//! [`Value`]s that are known to hold the right type.

use std::sync::Arc;

use crate::error::Result;
use crate::graph::{Value, Version};

use super::evaluation::Evaluation;
use super::stream::StreamRef;

pub(crate) type MapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub(crate) type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub(crate) type EqFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
pub(crate) type ReduceFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;
pub(crate) type CombineFn = Arc<dyn Fn(&[Option<Value>]) -> Value + Send + Sync>;
pub(crate) type FlatMapFn = Arc<dyn Fn(&Value) -> Result<StreamRef> + Send + Sync>;
pub(crate) type UpdateFn = Arc<dyn Fn(&mut Evaluation<'_>) -> Result<()> + Send + Sync>;

/// Callback run when one of a stream's parents ends.
///
/// Receives the child first and the parent that ended second.
pub type ParentEndedFn = Arc<dyn Fn(&StreamRef, &StreamRef) -> Result<()> + Send + Sync>;

/// How a node computes its value.
#[derive(Clone)]
pub(crate) enum Update {
    /// Written from outside with `set`; never evaluated.
    Source,

    /// Computed from parents.
    Derived(Operator),
}

impl Update {
    pub fn is_source(&self) -> bool {
        matches!(self, Update::Source)
    }
}

/// Per-node state of a flatMapped stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FlatMapState {
    /// Highest version of any real parent this stream has taken a value
    /// from, including parents that have since ended and been released.
    pub most_recent_parent_version: Version,
}

#[derive(Clone)]
pub(crate) enum Operator {
    Map(MapFn),
    Filter(PredicateFn),
    Uniq(EqFn),
    Reduce(ReduceFn),
    Combine(CombineFn),
    CombineWhenAll(CombineFn),
    Merge,
    FlatMap { f: FlatMapFn, state: FlatMapState },
    Custom(UpdateFn),
}

/// Initial value and accumulator of a reduce node.
pub(crate) struct ReduceConfig {
    pub combine: ReduceFn,
    pub initial: Option<Value>,
}

impl Operator {
    /// Run the operator once. It calls `new_value` on `eval` only when the
    /// node gets a new value.
    pub fn evaluate(&self, eval: &mut Evaluation<'_>) -> Result<()> {
        match self {
            Operator::Map(f) => {
                if let Some(value) = eval.parent_raw(0) {
                    eval.new_raw(f(&value));
                }
            }
            Operator::Filter(f) => {
                if let Some(value) = eval.parent_raw(0) {
                    if f(&value) {
                        eval.new_raw(value);
                    }
                }
            }
            Operator::Uniq(eq) => {
                if let Some(value) = eval.parent_raw(0) {
                    let unchanged = eval.own_raw().is_some_and(|current| eq(&current, &value));
                    if !unchanged {
                        eval.new_raw(value);
                    }
                }
            }
            Operator::Reduce(f) => {
                if let Some(value) = eval.parent_raw(0) {
                    let next = match eval.own_raw() {
                        Some(accumulator) => f(&accumulator, &value),
                        None => value,
                    };
                    eval.new_raw(next);
                }
            }
            Operator::Combine(f) => {
                let values = eval.parent_values();
                eval.new_raw(f(&values));
            }
            Operator::CombineWhenAll(f) => {
                let values = eval.parent_values();
                if values.iter().all(Option::is_some) {
                    eval.new_raw(f(&values));
                }
            }
            Operator::Merge => {
                // Later parents overwrite earlier ones within a tick.
                for index in 0..eval.parent_count() {
                    if eval.parent_was_updated(index) {
                        if let Some(value) = eval.parent_raw(index) {
                            eval.new_raw(value);
                        }
                    }
                }
            }
            Operator::FlatMap { f, state } => flat_map(eval, f, *state)?,
            Operator::Custom(f) => f(eval)?,
        }
        Ok(())
    }
}

/// Slot 0 is the meta-parent whose values are fed to `f`; every other slot
/// is a stream `f` returned earlier.
fn flat_map(eval: &mut Evaluation<'_>, f: &FlatMapFn, mut state: FlatMapState) -> Result<()> {
    // Real parents go first: the meta-parent may add a parent below whose
    // value has to be weighed against theirs.
    for index in 1..eval.parent_count() {
        if eval.parent_was_updated(index) {
            if let Some(value) = eval.parent_raw(index) {
                eval.new_raw(value);
                state.most_recent_parent_version = eval.parent_version(index);
            }
        }
    }

    if eval.parent_was_updated(0) {
        if let Some(meta) = eval.parent_raw(0) {
            let inner = f(&meta)?;
            let (value, version) = {
                let node = inner.node().lock();
                (node.value.clone(), node.version)
            };
            eval.attach_parent(&inner)?;

            if let Some(value) = value {
                if version >= state.most_recent_parent_version {
                    eval.new_raw(value);
                    state.most_recent_parent_version = version;
                }
            }
        }
    }

    eval.store_flat_map_state(state);
    Ok(())
}

/// What a node does when one of its parents ends.
#[derive(Clone)]
pub(crate) enum ParentEnded {
    /// End as well.
    EndSelf,

    /// End once every parent has ended.
    EndWhenAllParentsEnded,

    /// Drop the finished parent unless it is slot 0, then end once every
    /// remaining parent has ended. Used by flatMap, which would otherwise
    /// accumulate one parent per meta-parent value.
    ReleaseFinishedParent,

    Custom(ParentEndedFn),
}

/// Parent-ended policy for streams built with
/// [`Engine::derive`](crate::Engine::derive).
#[derive(Clone, Default)]
pub enum EndPolicy {
    /// End as soon as any parent ends.
    #[default]
    EndSelf,

    /// Stay active until every parent has ended.
    EndWhenAllParentsEnded,

    /// Decide in a callback. It receives the child and the parent that ended.
    Custom(ParentEndedFn),
}

impl From<EndPolicy> for ParentEnded {
    fn from(policy: EndPolicy) -> Self {
        match policy {
            EndPolicy::EndSelf => ParentEnded::EndSelf,
            EndPolicy::EndWhenAllParentsEnded => ParentEnded::EndWhenAllParentsEnded,
            EndPolicy::Custom(f) => ParentEnded::Custom(f),
        }
    }
}

impl std::fmt::Debug for EndPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndPolicy::EndSelf => f.write_str("EndSelf"),
            EndPolicy::EndWhenAllParentsEnded => f.write_str("EndWhenAllParentsEnded"),
            EndPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
