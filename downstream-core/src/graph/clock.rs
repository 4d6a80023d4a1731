//! Version Clock
//!
//! Every `set` starts a tick, which takes a fresh version from the clock and
//! stamps the written stream with it. Streams evaluated during the tick are
//! stamped with the same version. A stream counts as "updated this tick" when
//! its version belongs to the tick in progress, or to the most recent tick if
//! none is in progress.
//!
//! Ticks nest: a listener that writes to another source while a tick is in
//! progress starts a nested tick immediately, with its own version. When the
//! nested tick finishes, the enclosing tick resumes under another fresh
//! version. Its own earlier stamps still count as current, the nested tick's
//! stamps do not, and later stamps stay higher than anything the nested tick
//! wrote, so node versions never go backwards.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::node::Version;

/// Versions stamped by one tick. More than one only when nested ticks ran
/// inside it.
type TickVersions = SmallVec<[Version; 2]>;

#[derive(Debug, Default)]
struct Ticks {
    /// Ticks in progress, innermost last.
    open: Vec<TickVersions>,

    /// The most recently finished top-level tick.
    last: TickVersions,
}

/// Per-engine monotonic tick counter.
#[derive(Debug)]
pub struct VersionClock {
    /// Latest version handed out.
    current: AtomicU64,
    ticks: Mutex<Ticks>,
}

impl VersionClock {
    /// Create a clock that has not ticked yet.
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            ticks: Mutex::new(Ticks::default()),
        }
    }

    /// The latest version handed out.
    pub fn current(&self) -> Version {
        self.current.load(Ordering::SeqCst)
    }

    fn advance(&self) -> Version {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Start a tick, nested in the one in progress if there is one. Returns
    /// the tick's version.
    pub fn begin_tick(&self) -> Version {
        let version = self.advance();
        self.ticks.lock().open.push(SmallVec::from_elem(version, 1));
        version
    }

    /// Finish the innermost tick. If it was nested, the enclosing tick
    /// resumes under a new version.
    pub fn finish_tick(&self) {
        let mut ticks = self.ticks.lock();
        let Some(finished) = ticks.open.pop() else {
            return;
        };
        if ticks.open.is_empty() {
            ticks.last = finished;
        } else {
            let resumed = self.advance();
            if let Some(enclosing) = ticks.open.last_mut() {
                enclosing.push(resumed);
            }
        }
    }

    /// Version to stamp a stream with right now: the innermost tick's latest
    /// version, or the latest version handed out when no tick is running.
    pub fn stamp(&self) -> Version {
        let ticks = self.ticks.lock();
        match ticks.open.last().and_then(|versions| versions.last()) {
            Some(version) => *version,
            None => self.current(),
        }
    }

    /// Was something stamped with `version` during the current tick?
    pub fn is_current(&self, version: Version) -> bool {
        let ticks = self.ticks.lock();
        ticks
            .open
            .last()
            .unwrap_or(&ticks.last)
            .contains(&version)
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::new()
    }
}
