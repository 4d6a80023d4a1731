//! Stream Handles
//!
//! A stream is a node in an engine's graph. Callers hold it through a typed
//! [`Stream<T>`] handle, which stores and reads values of type `T` only.
//! [`StreamRef`] is the same handle without the type, used where streams of
//! different types meet (custom parent-ended policies, diagnostics).
//!
//! Handles are cheap to clone. A stream stays alive as long as a handle to it
//! or to one of its descendants exists.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::graph::{downcast, update_order, NodeId, NodeRef, StreamState, Version};

use super::engine::{Engine, EngineShared};
use super::listener::{EndListener, Listener};

/// Types that can flow through a stream.
pub trait Data: Any + Send + Sync {}

impl<T: Any + Send + Sync> Data for T {}

/// Untyped handle to a stream.
#[derive(Clone)]
pub struct StreamRef {
    node: NodeRef,
    engine: Arc<EngineShared>,
}

impl StreamRef {
    pub(crate) fn new(node: NodeRef, engine: Arc<EngineShared>) -> Self {
        Self { node, engine }
    }

    pub(crate) fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// The engine this stream belongs to.
    pub fn engine(&self) -> Engine {
        Engine::from_shared(Arc::clone(&self.engine))
    }

    pub fn has_value(&self) -> bool {
        self.node.has_value()
    }

    pub fn has_ended(&self) -> bool {
        self.node.has_ended()
    }

    pub fn state(&self) -> StreamState {
        self.node.lock().state
    }

    pub fn version(&self) -> Version {
        self.node.version()
    }

    /// Did the stream receive a new value in the tick in progress, or in the
    /// most recent tick if none is in progress?
    pub fn was_updated_this_tick(&self) -> bool {
        self.engine.clock().is_current(self.node.version())
    }

    /// End the stream. Ending an ended stream does nothing.
    pub fn end(&self) -> Result<()> {
        self.engine.end(&self.node, None)
    }

    /// The streams a write to this stream would visit, in visiting order.
    pub fn update_order(&self) -> Vec<NodeId> {
        update_order(&self.node).iter().map(|node| node.id()).collect()
    }

    /// Number of registered value listeners.
    pub fn listener_count(&self) -> usize {
        self.node.lock().value_listeners.len()
    }

    /// Number of registered end listeners.
    pub fn end_listener_count(&self) -> usize {
        self.node.lock().end_listeners.len()
    }
}

impl PartialEq for StreamRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for StreamRef {}

impl fmt::Debug for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.node, f)
    }
}

/// A stream of values of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::new();
/// let names = engine.source::<String>();
///
/// let listener = names.for_each(|name| println!("hello, {name}"));
/// names.set("world".to_string())?;
/// names.remove_listener(&listener);
/// ```
pub struct Stream<T> {
    inner: StreamRef,
    marker: PhantomData<fn() -> T>,
}

impl<T: Data> Stream<T> {
    pub(crate) fn from_ref(inner: StreamRef) -> Self {
        Self {
            inner,
            marker: PhantomData,
        }
    }

    pub(crate) fn node(&self) -> &NodeRef {
        &self.inner.node
    }

    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.inner.engine
    }

    /// The untyped handle.
    pub fn untyped(&self) -> &StreamRef {
        &self.inner
    }

    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    pub fn engine(&self) -> Engine {
        self.inner.engine()
    }

    pub fn has_value(&self) -> bool {
        self.inner.has_value()
    }

    pub fn has_ended(&self) -> bool {
        self.inner.has_ended()
    }

    pub fn state(&self) -> StreamState {
        self.inner.state()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn was_updated_this_tick(&self) -> bool {
        self.inner.was_updated_this_tick()
    }

    pub fn update_order(&self) -> Vec<NodeId> {
        self.inner.update_order()
    }

    /// A copy of the current value.
    pub fn value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.with_value(T::clone)
    }

    /// Call `f` with the current value, if there is one.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.node.value().map(|value| f(downcast::<T>(&value)))
    }

    /// Write a new value and propagate it through the graph.
    ///
    /// Fails with `InactiveStream` on an ended stream and with `NotASource`
    /// on a derived one.
    pub fn set(&self, value: T) -> Result<&Self> {
        self.inner.engine.set(&self.inner.node, Arc::new(value))?;
        Ok(self)
    }

    /// End the stream. Ending an ended stream does nothing.
    pub fn end(&self) -> Result<&Self> {
        self.inner.end()?;
        Ok(self)
    }

    /// Write a final value, then end the stream.
    pub fn end_with(&self, value: T) -> Result<&Self> {
        self.inner.engine.end(&self.inner.node, Some(Arc::new(value)))?;
        Ok(self)
    }

    /// Call `f` with the current value, if any, and with every later value.
    ///
    /// Returns the registered listener so it can be removed again.
    pub fn for_each<F>(&self, f: F) -> Listener<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener = Listener::new(f);
        self.inner
            .engine
            .add_value_listener(&self.inner.node, listener.callback(), true);
        listener
    }

    /// Register `listener` for later values. Ended streams ignore it.
    pub fn add_listener(&self, listener: &Listener<T>) {
        self.inner
            .engine
            .add_value_listener(&self.inner.node, listener.callback(), false);
    }

    /// Remove the first registration of `listener`, if any.
    pub fn remove_listener(&self, listener: &Listener<T>) {
        self.inner
            .engine
            .remove_value_listener(&self.inner.node, listener.key());
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }

    /// Register `listener` to be called when the stream ends. Ended streams
    /// ignore it.
    pub fn add_end_listener(&self, listener: &EndListener<T>) {
        self.inner
            .engine
            .add_end_listener(&self.inner.node, listener.callback());
    }

    /// Remove the first registration of `listener`, if any.
    pub fn remove_end_listener(&self, listener: &EndListener<T>) {
        self.inner
            .engine
            .remove_end_listener(&self.inner.node, listener.key());
    }

    pub fn end_listener_count(&self) -> usize {
        self.inner.end_listener_count()
    }

    /// Call `f` with the last value once the stream has ended. If it has
    /// ended already, `f` runs right away.
    pub fn done<F>(&self, f: F) -> EndListener<T>
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        let listener = EndListener::new(f);
        if !self
            .inner
            .engine
            .add_end_listener(&self.inner.node, listener.callback())
        {
            match self.inner.node.value() {
                Some(value) => listener.call(Some(downcast::<T>(&value))),
                None => listener.call(None),
            }
        }
        listener
    }

    /// Log every value at `info` level, tagged with `prefix`.
    pub fn log(&self, prefix: impl Into<String>) -> Listener<T>
    where
        T: fmt::Debug,
    {
        let prefix = prefix.into();
        let id = self.id();
        self.for_each(move |value| {
            info!(stream = %id, prefix = %prefix, value = ?value, "stream value");
        })
    }
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Stream<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for Stream<T> {}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl<T> From<&Stream<T>> for StreamRef {
    fn from(stream: &Stream<T>) -> Self {
        stream.inner.clone()
    }
}

impl<T> From<Stream<T>> for StreamRef {
    fn from(stream: Stream<T>) -> Self {
        stream.inner
    }
}
