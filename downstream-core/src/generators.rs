//! Generators
//!
//! Sources that produce values from data held in memory. They are driven
//! explicitly with [`Generator::tick`] or [`Generator::run`]; nothing is
//! scheduled in the background.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::reactive::{Data, Engine, Stream};

type Items<T> = Box<dyn Iterator<Item = T> + Send>;

/// A source stream fed from an iterator.
///
/// Dereferences to the underlying [`Stream`], so it can be read, listened to
/// and used as a parent directly.
pub struct Generator<T> {
    stream: Stream<T>,

    /// Dropped as soon as the stream ends.
    items: Mutex<Option<Items<T>>>,
}

impl<T: Data> Generator<T> {
    /// The generated stream.
    pub fn stream(&self) -> &Stream<T> {
        &self.stream
    }

    /// Write the next item, or end the stream when there is none left.
    /// Does nothing once the stream has ended.
    pub fn tick(&self) -> Result<()> {
        let next = {
            let mut items = self.items.lock();
            if self.stream.has_ended() {
                *items = None;
                return Ok(());
            }
            match items.as_mut().map(|items| items.next()) {
                None => return Ok(()),
                Some(Some(item)) => Some(item),
                Some(None) => {
                    *items = None;
                    None
                }
            }
        };

        match next {
            Some(item) => self.stream.set(item).map(|_| ()),
            None => self.stream.end().map(|_| ()),
        }
    }

    /// Tick until the stream has ended.
    pub fn run(&self) -> Result<()> {
        while !self.stream.has_ended() {
            self.tick()?;
        }
        Ok(())
    }
}

impl<T> Deref for Generator<T> {
    type Target = Stream<T>;

    fn deref(&self) -> &Stream<T> {
        &self.stream
    }
}

impl<T> fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("stream", &self.stream)
            .field("exhausted", &self.items.lock().is_none())
            .finish()
    }
}

impl Engine {
    /// A generator producing `items` one per tick, then ending.
    pub fn from_iter<I>(&self, items: I) -> Generator<I::Item>
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Data,
    {
        Generator {
            stream: self.source(),
            items: Mutex::new(Some(Box::new(items.into_iter()))),
        }
    }

    /// A generator producing the characters of `text`.
    pub fn from_chars(&self, text: &str) -> Generator<char> {
        let chars: Vec<char> = text.chars().collect();
        self.from_iter(chars)
    }

    /// A source that already holds `value`.
    pub fn once<T: Data>(&self, value: T) -> Stream<T> {
        self.wrap(self.shared().new_source(Some(Arc::new(value))))
    }

    /// A source that never gets a value unless written to.
    pub fn never<T: Data>(&self) -> Stream<T> {
        self.source()
    }
}
