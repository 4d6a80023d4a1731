//! Stream Engine
//!
//! The engine is the central coordinator. It owns the version clock, builds
//! nodes, runs writes through the graph and tears down ended streams.
//!
//! # How a Write Works
//!
//! 1. `set` checks that the target is an active source stream.
//!
//! 2. The clock advances and the source is stamped with the new version.
//!
//! 3. The scheduler orders every stream reachable from the source.
//!
//! 4. Each stream in that order is evaluated if one of its parents was
//!    updated in this tick, then its listeners are called if it was updated
//!    itself.
//!
//! # Thread Safety
//!
//! Everything that mutates the graph takes the engine's re-entrant lock
//! first. Listeners and update functions may call back into the engine on
//! the same thread (a write from a listener runs as a nested tick), while
//! other threads wait until the operation in progress has finished. Node
//! locks are held only for bookkeeping, never while user code runs.

use std::cell::Cell;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{Result, StreamError};
use crate::graph::{
    link, remove_first, update_order, EndCallback, Node, NodeRef, StreamState, Value,
    ValueCallback, Version, VersionClock,
};

use super::evaluation::Evaluation;
use super::operator::{EndPolicy, Operator, ParentEnded, Update, UpdateFn};
use super::stream::{Data, Stream, StreamRef};

/// Generate a new unique engine ID.
fn next_engine_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Everything needed to build a node.
pub(crate) struct NodeSpec {
    pub update: Update,
    pub on_parent_ended: ParentEnded,
    pub initial: Option<Value>,
    pub initial_version: Version,

    /// Run the update function during construction when a parent already
    /// has a value.
    pub evaluate_initially: bool,
}

impl NodeSpec {
    pub fn derived(update: Update) -> Self {
        Self {
            update,
            on_parent_ended: ParentEnded::EndSelf,
            initial: None,
            initial_version: 0,
            evaluate_initially: true,
        }
    }
}

/// State shared by an engine and every stream it created.
pub(crate) struct EngineShared {
    id: u64,
    config: EngineConfig,
    clock: VersionClock,

    /// Serializes graph mutation. Holds the current tick depth.
    serial: ReentrantMutex<Cell<usize>>,
}

/// Guard for one tick. Dropping it resumes the enclosing tick.
struct TickScope<'a> {
    clock: &'a VersionClock,
    depth: ReentrantMutexGuard<'a, Cell<usize>>,
    version: Version,
    nested: bool,
}

impl Drop for TickScope<'_> {
    fn drop(&mut self) {
        self.clock.finish_tick();
        self.depth.set(self.depth.get() - 1);
    }
}

impl EngineShared {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &VersionClock {
        &self.clock
    }

    fn serialize(&self) -> ReentrantMutexGuard<'_, Cell<usize>> {
        self.serial.lock()
    }

    fn begin_tick(&self) -> Result<TickScope<'_>> {
        let depth = self.serialize();
        let current = depth.get();
        if current >= self.config.max_tick_depth {
            return Err(StreamError::TickDepthExceeded {
                limit: self.config.max_tick_depth,
            });
        }
        depth.set(current + 1);

        let version = self.clock.begin_tick();
        Ok(TickScope {
            clock: &self.clock,
            depth,
            version,
            nested: current > 0,
        })
    }

    /// Create a source node. Sources have no parents, so this cannot fail.
    pub fn new_source(&self, initial: Option<Value>) -> NodeRef {
        Arc::new(Node::new(
            self.id,
            Update::Source,
            ParentEnded::EndSelf,
            initial,
            0,
        ))
    }

    /// Create a derived node, link it to `parents` and establish its initial
    /// value.
    pub fn create(self: &Arc<Self>, parents: &[NodeRef], spec: NodeSpec) -> Result<NodeRef> {
        let _serial = self.serialize();

        if let Some(foreign) = parents.iter().find(|parent| parent.engine() != self.id) {
            return Err(StreamError::NotAStream(foreign.id()));
        }

        let node = Arc::new(Node::new(
            self.id,
            spec.update,
            spec.on_parent_ended,
            spec.initial,
            spec.initial_version,
        ));
        for parent in parents {
            link(parent, &node);
        }

        if spec.evaluate_initially && parents.iter().any(|parent| parent.has_value()) {
            if self.evaluate(&node, parents)? {
                // Pretend the node was around when its newest parent last
                // updated, so recency comparisons between siblings built at
                // different times stay correct.
                let newest = parents.iter().map(|parent| parent.version()).max();
                node.lock().version = newest.unwrap_or(0);
            }
        }

        debug!(
            engine = %self.config.name,
            stream = %node.id(),
            parents = parents.len(),
            "created stream"
        );

        for parent in parents.iter().filter(|parent| parent.has_ended()) {
            self.parent_ended(&node, parent)?;
        }

        Ok(node)
    }

    /// Write `value` into the source `node` and propagate it.
    pub fn set(self: &Arc<Self>, node: &NodeRef, value: Value) -> Result<()> {
        let _serial = self.serialize();
        {
            let inner = node.lock();
            if inner.state != StreamState::Active {
                return Err(StreamError::InactiveStream {
                    id: node.id(),
                    state: inner.state,
                });
            }
            if !inner.update.is_source() {
                return Err(StreamError::NotASource(node.id()));
            }
        }

        let tick = self.begin_tick()?;
        {
            let mut inner = node.lock();
            inner.value = Some(value);
            inner.version = tick.version;
        }

        let order = update_order(node);
        trace!(
            engine = %self.config.name,
            stream = %node.id(),
            version = tick.version,
            nested = tick.nested,
            scheduled = order.len(),
            "propagating tick"
        );

        for stream in &order {
            self.propagate_to(stream)?;
        }
        Ok(())
    }

    /// Evaluate `node` if a parent changed this tick, then notify its
    /// listeners if it changed itself.
    fn propagate_to(self: &Arc<Self>, node: &NodeRef) -> Result<()> {
        let parents = {
            let inner = node.lock();
            if inner.state == StreamState::Ended {
                return Ok(());
            }
            inner.parents.to_vec()
        };

        if parents
            .iter()
            .any(|parent| self.clock.is_current(parent.version()))
        {
            self.evaluate(node, &parents)?;
        }

        let (value, listeners) = {
            let inner = node.lock();
            if inner.state == StreamState::Ended || !self.clock.is_current(inner.version) {
                return Ok(());
            }
            match &inner.value {
                Some(value) => (Arc::clone(value), inner.value_listeners.clone()),
                None => return Ok(()),
            }
        };

        for listener in &listeners {
            (listener.call)(&value);
        }
        Ok(())
    }

    /// Run the node's update function. Returns whether it produced a value.
    pub fn evaluate(self: &Arc<Self>, node: &NodeRef, parents: &[NodeRef]) -> Result<bool> {
        let update = node.lock().update.clone();
        let operator = match update {
            Update::Source => return Err(StreamError::MissingUpdate(node.id())),
            Update::Derived(operator) => operator,
        };

        trace!(stream = %node.id(), "evaluating");
        let mut evaluation = Evaluation::new(self, node, parents);
        operator.evaluate(&mut evaluation)?;
        Ok(evaluation.updated())
    }

    /// End `node`, optionally writing `final_value` first.
    pub fn end(self: &Arc<Self>, node: &NodeRef, final_value: Option<Value>) -> Result<()> {
        let _serial = self.serialize();

        if let Some(value) = final_value {
            self.set(node, value)?;
        }

        let (value, end_listeners) = {
            let mut inner = node.lock();
            if inner.state == StreamState::Ended {
                return Ok(());
            }
            inner.state = StreamState::Ended;
            (inner.value.clone(), mem::take(&mut inner.end_listeners))
        };

        debug!(engine = %self.config.name, stream = %node.id(), "ending stream");

        for listener in &end_listeners {
            (listener.call)(value.as_ref());
        }

        let children = {
            let mut inner = node.lock();
            inner.value_listeners.clear();
            inner.end_listeners.clear();
            mem::take(&mut inner.children)
        };
        for child in children.iter().filter_map(|child| child.upgrade()) {
            self.parent_ended(&child, node)?;
        }

        let parents = mem::take(&mut node.lock().parents);
        for parent in &parents {
            parent.lock().remove_child(node.id());
        }
        Ok(())
    }

    /// Apply `child`'s parent-ended policy for `parent`.
    fn parent_ended(self: &Arc<Self>, child: &NodeRef, parent: &NodeRef) -> Result<()> {
        let policy = {
            let inner = child.lock();
            if inner.state == StreamState::Ended {
                return Ok(());
            }
            inner.on_parent_ended.clone()
        };

        match policy {
            ParentEnded::EndSelf => self.end(child, None),
            ParentEnded::EndWhenAllParentsEnded => self.end_if_all_parents_ended(child),
            ParentEnded::ReleaseFinishedParent => {
                {
                    let mut inner = child.lock();
                    let is_meta = inner.parents.first().map(|p| p.id()) == Some(parent.id());
                    if !is_meta {
                        inner.remove_parent(parent.id());
                    }
                }
                self.end_if_all_parents_ended(child)
            }
            ParentEnded::Custom(f) => f(
                &StreamRef::new(Arc::clone(child), Arc::clone(self)),
                &StreamRef::new(Arc::clone(parent), Arc::clone(self)),
            ),
        }
    }

    pub fn end_if_all_parents_ended(self: &Arc<Self>, node: &NodeRef) -> Result<()> {
        if node.parents().iter().all(|parent| parent.has_ended()) {
            self.end(node, None)
        } else {
            Ok(())
        }
    }

    /// Register a value listener, calling it first with the current value
    /// when `replay` is set. Ended streams accept no listeners.
    pub fn add_value_listener(&self, node: &NodeRef, listener: ValueCallback, replay: bool) {
        let _serial = self.serialize();
        if replay {
            if let Some(value) = node.value() {
                (listener.call)(&value);
            }
        }

        let mut inner = node.lock();
        if inner.state == StreamState::Active {
            inner.value_listeners.push(listener);
        }
    }

    pub fn remove_value_listener(&self, node: &NodeRef, key: usize) {
        let _serial = self.serialize();
        remove_first(&mut node.lock().value_listeners, |l| l.key == key);
    }

    /// Register an end listener. Returns `false` when the stream has already
    /// ended and the listener was not stored.
    pub fn add_end_listener(&self, node: &NodeRef, listener: EndCallback) -> bool {
        let _serial = self.serialize();
        let mut inner = node.lock();
        if inner.state == StreamState::Active {
            inner.end_listeners.push(listener);
            true
        } else {
            false
        }
    }

    pub fn remove_end_listener(&self, node: &NodeRef, key: usize) {
        let _serial = self.serialize();
        remove_first(&mut node.lock().end_listeners, |l| l.key == key);
    }
}

/// A stream graph with its own version clock.
///
/// Cloning an `Engine` yields another handle to the same graph. Streams keep
/// their engine alive, so dropping every `Engine` handle is fine while
/// streams are still in use.
///
/// # Example
///
/// ```rust,ignore
/// let engine = Engine::new();
/// let count = engine.source::<i32>();
/// let doubled = count.map(|n| n * 2)?;
///
/// count.set(5)?;
/// assert_eq!(doubled.value(), Some(10));
/// ```
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                id: next_engine_id(),
                config,
                clock: VersionClock::new(),
                serial: ReentrantMutex::new(Cell::new(0)),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }

    pub fn config(&self) -> &EngineConfig {
        self.shared.config()
    }

    /// The latest version handed out by the clock.
    pub fn version(&self) -> Version {
        self.shared.clock().current()
    }

    pub(crate) fn wrap<T: Data>(&self, node: NodeRef) -> Stream<T> {
        Stream::from_ref(StreamRef::new(node, Arc::clone(&self.shared)))
    }

    /// Create a source stream without a value.
    pub fn source<T: Data>(&self) -> Stream<T> {
        self.wrap(self.shared.new_source(None))
    }

    /// Create a stream computed by `update` from `parents`.
    ///
    /// `update` runs whenever a parent received a new value in the current
    /// tick, and once during construction if a parent already has a value.
    /// It gives the stream a value by calling
    /// [`Evaluation::new_value`]; values of any type other than `U` are
    /// rejected.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let sum = engine.derive(
    ///     &[a.untyped(), b.untyped()],
    ///     DeriveConfig::default(),
    ///     |eval| {
    ///         let a = eval.parent_value::<i32>(0)?.unwrap_or(0);
    ///         let b = eval.parent_value::<i32>(1)?.unwrap_or(0);
    ///         eval.new_value(a + b)
    ///     },
    /// )?;
    /// ```
    pub fn derive<U, F>(
        &self,
        parents: &[&StreamRef],
        config: DeriveConfig<U>,
        update: F,
    ) -> Result<Stream<U>>
    where
        U: Data,
        F: Fn(&mut Evaluation<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let update: UpdateFn = Arc::new(move |eval: &mut Evaluation<'_>| {
            eval.expect_output::<U>();
            update(eval)
        });
        let parents: Vec<NodeRef> = parents
            .iter()
            .map(|parent| Arc::clone(parent.node()))
            .collect();

        let node = self.shared.create(
            &parents,
            NodeSpec {
                update: Update::Derived(Operator::Custom(update)),
                on_parent_ended: config.end_policy.into(),
                initial: config.initial.map(|value| Arc::new(value) as Value),
                initial_version: 0,
                evaluate_initially: true,
            },
        )?;
        Ok(self.wrap(node))
    }
}

/// Options for [`Engine::derive`].
pub struct DeriveConfig<U> {
    /// Value the stream starts with, before any evaluation.
    pub initial: Option<U>,

    /// What to do when a parent ends.
    pub end_policy: EndPolicy,
}

impl<U> Default for DeriveConfig<U> {
    fn default() -> Self {
        Self {
            initial: None,
            end_policy: EndPolicy::default(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.shared.config.name)
            .field("version", &self.version())
            .finish()
    }
}
