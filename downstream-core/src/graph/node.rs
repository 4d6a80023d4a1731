//! Graph Nodes
//!
//! This module defines the node type that lives in the stream graph, along
//! with the edge bookkeeping that keeps parents and children symmetric.
//!
//! Nodes own their parents (`Arc`) and point back at their children weakly
//! (`Weak`), so a chain of derived streams stays alive as long as its leaf is
//! held, and a dropped leaf never leaks through its parents.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;

use crate::reactive::operator::{ParentEnded, Update};

/// The tick number at which a node last received a value.
pub type Version = u64;

/// Type-erased payload stored in a node.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// Shared, owning reference to a node.
pub(crate) type NodeRef = Arc<Node>;

/// Borrow the payload as the type of the handle that owns it.
///
/// Typed handles only ever store their own type, so a mismatch here is a bug
/// in this crate rather than in the caller.
pub(crate) fn downcast<T: Any>(value: &Value) -> &T {
    value
        .downcast_ref::<T>()
        .expect("stream value has the type of its handle")
}

/// Unique identifier for a node in the stream graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a stream. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// The stream accepts and propagates new values.
    Active,

    /// The stream has finished. It keeps its last value but has no edges or
    /// value listeners left.
    Ended,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Active => f.write_str("active"),
            StreamState::Ended => f.write_str("ended"),
        }
    }
}

/// A registered value listener. `key` identifies the callback allocation so
/// that the same listener can be added and removed several times.
#[derive(Clone)]
pub(crate) struct ValueCallback {
    pub key: usize,
    pub call: Arc<dyn Fn(&Value) + Send + Sync>,
}

/// A registered end listener.
#[derive(Clone)]
pub(crate) struct EndCallback {
    pub key: usize,
    pub call: Arc<dyn Fn(Option<&Value>) + Send + Sync>,
}

/// Remove the first entry matching `matches`, if any.
pub(crate) fn remove_first<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> bool {
    match items.iter().position(matches) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

/// A node in the stream graph.
pub(crate) struct Node {
    id: NodeId,

    /// Identifier of the engine the node was created by.
    engine: u64,

    inner: Mutex<NodeInner>,
}

/// Mutable part of a node.
///
/// The lock around it is only ever held for short bookkeeping sections and
/// never while user callbacks run, and never while another node is locked.
pub(crate) struct NodeInner {
    pub value: Option<Value>,
    pub version: Version,
    pub state: StreamState,

    /// Parents in argument order. Order decides tie-breaks.
    pub parents: SmallVec<[NodeRef; 2]>,

    /// Non-owning back-references, in the order the children were linked.
    pub children: SmallVec<[Weak<Node>; 4]>,

    pub update: Update,
    pub on_parent_ended: ParentEnded,
    pub value_listeners: Vec<ValueCallback>,
    pub end_listeners: Vec<EndCallback>,
}

impl Node {
    /// Create a detached node. Edges are linked by the engine afterwards.
    pub fn new(
        engine: u64,
        update: Update,
        on_parent_ended: ParentEnded,
        value: Option<Value>,
        version: Version,
    ) -> Self {
        Self {
            id: NodeId::new(),
            engine,
            inner: Mutex::new(NodeInner {
                value,
                version,
                state: StreamState::Active,
                parents: SmallVec::new(),
                children: SmallVec::new(),
                update,
                on_parent_ended,
                value_listeners: Vec::new(),
                end_listeners: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn engine(&self) -> u64 {
        self.engine
    }

    pub fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.inner.lock()
    }

    pub fn value(&self) -> Option<Value> {
        self.lock().value.clone()
    }

    pub fn version(&self) -> Version {
        self.lock().version
    }

    pub fn has_value(&self) -> bool {
        self.lock().value.is_some()
    }

    pub fn has_ended(&self) -> bool {
        self.lock().state == StreamState::Ended
    }

    /// Snapshot of the parent list.
    pub fn parents(&self) -> Vec<NodeRef> {
        self.lock().parents.to_vec()
    }

    /// Children that are still alive, in link order. Dead back-references
    /// are pruned on the way.
    pub fn live_children(&self) -> Vec<NodeRef> {
        let mut inner = self.lock();
        let mut live = Vec::with_capacity(inner.children.len());
        inner.children.retain(|child| match child.upgrade() {
            Some(child) => {
                live.push(child);
                true
            }
            None => false,
        });
        live
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("version", &inner.version)
            .field("has_value", &inner.value.is_some())
            .field("parents", &inner.parents.len())
            .field("children", &inner.children.len())
            .finish()
    }
}

impl NodeInner {
    /// Remove the first back-reference to `child`. Dead entries met on the
    /// way are dropped too.
    pub fn remove_child(&mut self, child: NodeId) {
        let mut removed = false;
        self.children.retain(|entry| match entry.upgrade() {
            Some(node) if !removed && node.id() == child => {
                removed = true;
                false
            }
            Some(_) => true,
            None => false,
        });
    }

    /// Remove the first occurrence of `parent` from the parent list.
    pub fn remove_parent(&mut self, parent: NodeId) -> bool {
        match self.parents.iter().position(|p| p.id() == parent) {
            Some(index) => {
                self.parents.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Make `parent` a parent of `child`.
///
/// The child always records the parent, so it can read the parent's last
/// value. An ended parent does not record the child: it will never update or
/// end again, so there is nothing to tell it.
pub(crate) fn link(parent: &NodeRef, child: &NodeRef) {
    child.lock().parents.push(Arc::clone(parent));

    let mut parent_inner = parent.lock();
    if parent_inner.state == StreamState::Active {
        parent_inner.children.push(Arc::downgrade(child));
    }
}
