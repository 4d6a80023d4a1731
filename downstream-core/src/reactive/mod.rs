//! Streams and Propagation
//!
//! This module implements streams: the handles callers hold, the engine that
//! runs writes through the graph, and the operators that build derived
//! streams.
//!
//! # Concepts
//!
//! ## Sources
//!
//! A source stream is written from outside with `set`. Every write is one
//! tick: the engine visits every stream that depends on the source, parents
//! before children, and recomputes each one at most once.
//!
//! ## Derived Streams
//!
//! A derived stream is computed from its parents by an update function. The
//! built-in operators (`map`, `filter`, `merge`, `flat_map`, ...) are derived
//! streams with a fixed update function; `Engine::derive` takes any function.
//!
//! ## Ending
//!
//! A stream ends at most once. Ending calls its end listeners, tells its
//! children (which usually end as well) and detaches it from the graph. An
//! ended stream keeps its last value.
//!
//! # Implementation Notes
//!
//! Values are stored type-erased in the graph and read back through typed
//! handles, so operators on different value types share one engine and one
//! propagation pass.

mod continuation;
mod engine;
mod evaluation;
mod listener;
pub(crate) mod operator;
mod operators;
mod stream;

pub use continuation::Continuation;
pub use engine::{DeriveConfig, Engine};
pub use evaluation::Evaluation;
pub use listener::{EndListener, Listener};
pub use operator::{EndPolicy, ParentEndedFn};
pub use stream::{Data, Stream, StreamRef};
