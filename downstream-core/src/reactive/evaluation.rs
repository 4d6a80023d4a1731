//! Evaluation context.
//!
//! An [`Evaluation`] is what an update function sees while it runs: read
//! access to the node's parents and to its own value, and `new_value` to
//! give the node a new value for the current tick. Not calling `new_value`
//! leaves the node untouched, and its listeners are not notified.

use std::any::type_name;
use std::sync::Arc;

use crate::error::{Result, StreamError};
use crate::graph::{link, NodeRef, StreamState, Value, Version};

use super::engine::EngineShared;
use super::operator::{FlatMapState, Operator, Update};
use super::stream::{Data, StreamRef};

/// Access to a node and its parents during one evaluation.
///
/// Parent indices follow the order the parents were given in. Methods taking
/// an index panic when it is out of range, like slice indexing.
pub struct Evaluation<'a> {
    engine: &'a Arc<EngineShared>,
    node: &'a NodeRef,
    parents: &'a [NodeRef],
    updated: bool,

    /// Type of the handle that reads this node, checked by `new_value`.
    output: Option<(fn(&Value) -> bool, &'static str)>,
}

impl<'a> Evaluation<'a> {
    pub(crate) fn new(
        engine: &'a Arc<EngineShared>,
        node: &'a NodeRef,
        parents: &'a [NodeRef],
    ) -> Self {
        Self {
            engine,
            node,
            parents,
            updated: false,
            output: None,
        }
    }

    pub(crate) fn expect_output<U: Data>(&mut self) {
        self.output = Some((holds::<U> as fn(&Value) -> bool, type_name::<U>()));
    }

    fn check_output(&self, value: &Value) -> Result<()> {
        match self.output {
            Some((holds, name)) if !holds(value) => {
                Err(StreamError::TypeMismatch {
                    id: self.node.id(),
                    expected: name,
                })
            }
            _ => Ok(()),
        }
    }

    /// Did this evaluation give the node a new value?
    pub(crate) fn updated(&self) -> bool {
        self.updated
    }

    /// Number of parents.
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    /// Does parent `index` hold a value?
    pub fn parent_has_value(&self, index: usize) -> bool {
        self.parents[index].has_value()
    }

    /// Has parent `index` ended?
    pub fn parent_has_ended(&self, index: usize) -> bool {
        self.parents[index].has_ended()
    }

    /// Did parent `index` receive a new value during the current tick?
    pub fn parent_was_updated(&self, index: usize) -> bool {
        self.engine.clock().is_current(self.parents[index].version())
    }

    /// Version of parent `index`.
    pub fn parent_version(&self, index: usize) -> Version {
        self.parents[index].version()
    }

    /// Value of parent `index`, read as `T`.
    pub fn parent_value<T: Data + Clone>(&self, index: usize) -> Result<Option<T>> {
        let parent = &self.parents[index];
        read_as(parent, parent.value())
    }

    /// Does the node itself hold a value?
    pub fn has_value(&self) -> bool {
        self.node.has_value()
    }

    /// The node's current value, read as `T`.
    pub fn value<T: Data + Clone>(&self) -> Result<Option<T>> {
        read_as(self.node, self.node.value())
    }

    /// Give the node a new value and mark it as updated in this tick.
    ///
    /// Fails with `TypeMismatch` if `T` is not the stream's value type.
    pub fn new_value<T: Data>(&mut self, value: T) -> Result<()> {
        let value: Value = Arc::new(value);
        self.check_output(&value)?;
        self.new_raw(value);
        Ok(())
    }

    /// Shorthand for `new_value(parent value)`. Does nothing when the parent
    /// has no value.
    pub fn new_value_from(&mut self, index: usize) -> Result<()> {
        if let Some(value) = self.parent_raw(index) {
            self.check_output(&value)?;
            self.new_raw(value);
        }
        Ok(())
    }

    pub(crate) fn parent_raw(&self, index: usize) -> Option<Value> {
        self.parents[index].value()
    }

    pub(crate) fn parent_values(&self) -> Vec<Option<Value>> {
        self.parents.iter().map(|parent| parent.value()).collect()
    }

    pub(crate) fn own_raw(&self) -> Option<Value> {
        self.node.value()
    }

    pub(crate) fn new_raw(&mut self, value: Value) {
        let version = self.engine.clock().stamp();
        let mut inner = self.node.lock();
        inner.value = Some(value);
        inner.version = version;
        self.updated = true;
    }

    /// Add `parent` after the existing parents. An ended parent is only read,
    /// never linked: it cannot update or end again.
    pub(crate) fn attach_parent(&mut self, parent: &StreamRef) -> Result<()> {
        let parent = parent.node();
        if parent.engine() != self.engine.id() {
            return Err(StreamError::NotAStream(parent.id()));
        }
        if parent.lock().state == StreamState::Active {
            link(parent, self.node);
        }
        Ok(())
    }

    pub(crate) fn store_flat_map_state(&mut self, state: FlatMapState) {
        if let Update::Derived(Operator::FlatMap { state: stored, .. }) = &mut self.node.lock().update {
            *stored = state;
        }
    }
}

fn holds<U: Data>(value: &Value) -> bool {
    value.is::<U>()
}

fn read_as<T: Data + Clone>(node: &NodeRef, value: Option<Value>) -> Result<Option<T>> {
    value
        .map(|value| {
            value
                .downcast_ref::<T>()
                .cloned()
                .ok_or(StreamError::TypeMismatch {
                    id: node.id(),
                    expected: type_name::<T>(),
                })
        })
        .transpose()
}
