//! Downstream Core
//!
//! This crate provides a synchronous reactive-dataflow engine. Streams hold
//! values; derived streams are recomputed from their parents whenever a
//! source is written.
//!
//! It guarantees:
//!
//! - Every derived stream is recomputed at most once per write
//! - Parents are always recomputed before their children
//! - Listeners never see a mix of old and new values
//! - Ended streams are detached from the graph and released
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Nodes, edges, the version clock and the update scheduler
//! - `reactive`: The engine, stream handles, listeners and operators
//! - `generators`: Sources fed from in-memory data
//! - `config`: Engine settings
//! - `error`: The error type shared by every fallible operation
//!
//! # Example
//!
//! ```rust,ignore
//! use downstream_core::Engine;
//!
//! let engine = Engine::new();
//! let numbers = engine.source::<u32>();
//! let evens = numbers.filter(|n| n % 2 == 0)?;
//! let total = evens.fold(0, |sum, n| sum + n)?;
//!
//! for n in 1..=4 {
//!     numbers.set(n)?;
//! }
//! assert_eq!(total.value(), Some(6));
//! ```

pub mod config;
pub mod error;
pub mod generators;
pub mod graph;
pub mod reactive;

pub use config::EngineConfig;
pub use error::{Result, StreamError};
pub use generators::Generator;
pub use graph::{NodeId, StreamState, Version};
pub use reactive::{
    Continuation, Data, DeriveConfig, EndListener, EndPolicy, Engine, Evaluation, Listener,
    ParentEndedFn, Stream, StreamRef,
};
