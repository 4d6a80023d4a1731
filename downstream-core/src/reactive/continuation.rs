//! Continuations.
//!
//! `then` runs a function when a stream ends and turns its result into a new
//! stream: a plain value gives a stream that ends right away holding it, and
//! a stream gives a stream that follows it until it ends.

use parking_lot::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::graph::downcast;

use super::engine::Engine;
use super::listener::EndListener;
use super::stream::{Data, Stream};

/// What a `then` callback continues with.
pub enum Continuation<U> {
    /// End with this value.
    Value(U),

    /// Follow this stream until it ends.
    Stream(Stream<U>),
}

impl<U: Data> Continuation<U> {
    fn into_stream(self, engine: &Engine) -> Result<Stream<U>> {
        match self {
            Continuation::Value(value) => {
                let stream = engine.source();
                stream.end_with(value)?;
                Ok(stream)
            }
            Continuation::Stream(stream) => Ok(stream),
        }
    }
}

impl<U: Data> From<Stream<U>> for Continuation<U> {
    fn from(stream: Stream<U>) -> Self {
        Continuation::Stream(stream)
    }
}

impl<T: Data> Stream<T> {
    /// Continue with whatever `f` returns once this stream ends.
    ///
    /// `f` receives the last value. If the stream has ended already, `f`
    /// runs immediately.
    ///
    /// ```rust,ignore
    /// let request = engine.source::<u16>();
    /// let message = request.then(|status| match status {
    ///     Some(200) => Continuation::Value("ok"),
    ///     _ => Continuation::Stream(retries.clone()),
    /// })?;
    /// ```
    pub fn then<U, F>(&self, f: F) -> Result<Stream<U>>
    where
        U: Data,
        F: FnOnce(Option<&T>) -> Continuation<U> + Send + 'static,
    {
        let engine = self.engine();
        if self.has_ended() {
            let value = self.node().value();
            return f(value.as_ref().map(downcast::<T>)).into_stream(&engine);
        }

        // `continuations` carries exactly one stream, written when this
        // stream ends; `result` follows it through flat_map.
        let continuations = engine.source::<Stream<U>>();
        let result = continuations.flat_map(Stream::clone)?;

        let f = Mutex::new(Some(f));
        let id = self.id();
        self.add_end_listener(&EndListener::new(move |value: Option<&T>| {
            let Some(f) = f.lock().take() else {
                return;
            };
            let next = f(value)
                .into_stream(&engine)
                .and_then(|next| continuations.end_with(next).map(|_| ()));
            if let Err(err) = next {
                warn!(stream = %id, error = %err, "continuation failed");
            }
        }));

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_continuation_ends_with_value() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let next = s.then(|v| Continuation::Value(v.copied().unwrap_or(0) + 1)).unwrap();
        assert!(!next.has_ended());

        s.end_with(41).unwrap();
        assert!(next.has_ended());
        assert_eq!(next.value(), Some(42));
    }

    #[test]
    fn stream_continuation_follows_returned_stream() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let follow = engine.source::<String>();
        let returned = follow.clone();
        let next = s.then(move |_| Continuation::Stream(returned)).unwrap();

        s.end().unwrap();
        assert!(!next.has_ended());

        follow.set("a".to_string()).unwrap();
        assert_eq!(next.value(), Some("a".to_string()));

        follow.end_with("b".to_string()).unwrap();
        assert!(next.has_ended());
        assert_eq!(next.value(), Some("b".to_string()));
    }

    #[test]
    fn then_on_ended_stream_runs_immediately() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        s.end_with(1).unwrap();

        let next = s.then(|v| Continuation::Value(v.copied())).unwrap();
        assert!(next.has_ended());
        assert_eq!(next.value(), Some(Some(1)));
    }

    #[test]
    fn continuation_sees_missing_value() {
        let engine = Engine::new();
        let s = engine.source::<i32>();
        let next = s.then(|v| Continuation::Value(v.is_none())).unwrap();

        s.end().unwrap();
        assert_eq!(next.value(), Some(true));
    }

    #[test]
    fn foreign_continuation_is_logged_not_raised() {
        let engine = Engine::new();
        let other = Engine::new();
        let s = engine.source::<i32>();
        let foreign = other.source::<i32>();
        let next = s.then(move |_| Continuation::Stream(foreign)).unwrap();

        s.end().unwrap();
        assert!(s.has_ended());
        assert!(!next.has_value());
    }
}
