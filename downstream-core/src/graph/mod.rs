//! Stream Graph
//!
//! This module implements the graph that connects streams, the clock that
//! tells which streams changed during the current write, and the scheduler
//! that orders propagation.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes hold a stream's value, version, state and listeners
//! - Edges point from parent to child: if B is computed from A, there is an
//!   edge from A to B
//!
//! When a source is written, the scheduler walks the edges to find every
//! reachable node and orders them so that parents come before children.
//!
//! # Design Decisions
//!
//! 1. Parents are owned and children are weak back-references. No cycle of
//!    strong references exists, so nothing depends on cycle collection.
//!
//! 2. Edge lists are ordered. Parent order is argument order, which
//!    operators use to break ties between simultaneous updates.
//!
//! 3. Ending a stream cuts its edges in both directions, so finished parts of
//!    a long-running graph are released as soon as callers drop them.

mod clock;
mod node;
mod scheduler;

pub use clock::VersionClock;
pub use node::{NodeId, StreamState, Version};

pub(crate) use node::{
    downcast, link, remove_first, EndCallback, Node, NodeRef, Value, ValueCallback,
};
pub(crate) use scheduler::update_order;
