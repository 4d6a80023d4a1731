//! Listener handles.
//!
//! A listener is identified by its callback allocation, not by what the
//! callback does. Cloning a handle keeps the identity, so the same handle can
//! be registered several times and has to be removed as many times.

use std::fmt;
use std::sync::Arc;

use crate::graph::{downcast, EndCallback, Value, ValueCallback};

use super::stream::Data;

/// Called with every new value of a stream.
pub struct Listener<T> {
    call: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T: Data> Listener<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self { call: Arc::new(f) }
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.call) as *const () as usize
    }

    pub(crate) fn callback(&self) -> ValueCallback {
        let call = Arc::clone(&self.call);
        ValueCallback {
            key: self.key(),
            call: Arc::new(move |value: &Value| call(downcast::<T>(value))),
        }
    }
}

/// Called once when a stream ends, with its last value if it has one.
pub struct EndListener<T> {
    call: Arc<dyn Fn(Option<&T>) + Send + Sync>,
}

impl<T: Data> EndListener<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        Self { call: Arc::new(f) }
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.call) as *const () as usize
    }

    pub(crate) fn call(&self, value: Option<&T>) {
        (self.call)(value)
    }

    pub(crate) fn callback(&self) -> EndCallback {
        let call = Arc::clone(&self.call);
        EndCallback {
            key: self.key(),
            call: Arc::new(move |value: Option<&Value>| call(value.map(downcast::<T>))),
        }
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
        }
    }
}

impl<T> Clone for EndListener<T> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
        }
    }
}

impl<T> PartialEq for Listener<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

impl<T> Eq for Listener<T> {}

impl<T> PartialEq for EndListener<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.call, &other.call)
    }
}

impl<T> Eq for EndListener<T> {}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("key", &(Arc::as_ptr(&self.call) as *const () as usize))
            .finish()
    }
}

impl<T> fmt::Debug for EndListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndListener")
            .field("key", &(Arc::as_ptr(&self.call) as *const () as usize))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let listener = Listener::new(|_: &i32| {});
        let clone = listener.clone();
        let other = Listener::new(|_: &i32| {});

        assert_eq!(listener, clone);
        assert_ne!(listener, other);
        assert_eq!(listener.key(), clone.callback().key);
        assert_ne!(listener.key(), other.callback().key);
    }

    #[test]
    fn callback_downcasts_to_handle_type() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = Listener::new(move |value: &i32| sink.lock().push(*value));

        let value: Value = Arc::new(7);
        (listener.callback().call)(&value);

        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn end_callback_passes_missing_value_through() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = EndListener::new(move |value: Option<&i32>| sink.lock().push(value.copied()));

        (listener.callback().call)(None);
        let value: Value = Arc::new(3);
        (listener.callback().call)(Some(&value));

        assert_eq!(*seen.lock(), vec![None, Some(3)]);
    }
}
